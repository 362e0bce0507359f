//! AST node contract consumed by the L code generator.
//!
//! The lexer, parser, import resolver and optimizer pre-pass are external
//! collaborators (see `spec.md` §1): they produce the tree this crate
//! describes, and `lc-codegen` walks it. Nothing here does any parsing; it
//! is the shape of an already-parsed program.

use std::rc::Rc;

/// Source location of a node, or a sentinel when the producing collaborator
/// did not attach one (`spec.md` §7: reported as "compilation", line 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub file: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const UNKNOWN: Span = Span {
        file: 0,
        line: 0,
        column: 0,
    };

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }
}

/// A loop or block's label number, as referenced by `break`/`continue`
/// (`@N` in `spec.md` §4.4). Label `0` from a `ret` statement means
/// "return from the enclosing function" rather than targeting a loop.
pub type LoopLabel = u32;

/// Inferred or annotated semantic type of a binding (`spec.md` §3.4
/// `varTypes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemaType {
    #[default]
    Unknown,
    Number,
    StringT,
    ListT,
    MapT,
    CString,
    CPointer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A whole-number literal; compiles to an integer immediate converted
    /// to float (`spec.md` §4.2).
    IntWhole(i64),
    /// A fractional literal; compiles to an 8-byte rodata constant.
    Fractional(f64),
    StringLit(Rc<str>),
    Bool(bool),
}

/// `+`, `-`, `*`, `/`, `%`, comparisons, logical and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    /// `or!`: evaluate left; evaluate right only if left is NaN or 0.0.
    OrBang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    /// `#x`: length of a list/map/string, or `1.0` for a scalar.
    Len,
}

/// Context a string literal is compiled for: the unified L key/value table
/// layout, or a null-terminated C byte buffer for an FFI call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringContext {
    LValue,
    CString,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(Rc<str>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    /// `None` is the wildcard `_`: matches anything, binds nothing
    /// (`spec.md` §9 open question — must not consume a parameter slot).
    pub pattern: Option<Pattern>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Literal(Literal),
    /// Binds the scrutinee to a fresh name in the clause body.
    Binding(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParam {
    pub name: Rc<str>,
    pub is_variadic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<LambdaParam>,
    /// Names captured from an enclosing scope; empty for non-capturing
    /// lambdas, which live in a static global closure slot.
    pub captures: Vec<Rc<str>>,
    pub body: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternLambda {
    pub params: Vec<LambdaParam>,
    pub captures: Vec<Rc<str>>,
    pub clauses: Vec<MatchClause>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal, Span),
    /// `??`: uniform random float in `[0.0, 1.0)`.
    Random(Span),
    FString(Vec<FStringPart>, Span),
    Ident(Rc<str>, Span),
    /// `!x`: move out of `x`; subsequent reads of `x` are a compile error.
    Move(Rc<str>, Span),
    Unary(UnOp, Box<Expr>, Span),
    Binary(BinOp, Box<Expr>, Box<Expr>, Span),
    ListLiteral(Vec<Expr>, Span),
    MapLiteral(Vec<(Expr, Expr)>, Span),
    Index(Box<Expr>, Box<Expr>, Span),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        span: Span,
    },
    Cast {
        target: Box<Expr>,
        to: SemaType,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    /// `call("libfoo.fn", args...)`: FFI call site with per-argument cast
    /// annotations resolved by the marshaller against a signature table
    /// supplied by the (external) C header scraper.
    FfiCall {
        library_alias: Rc<str>,
        function: Rc<str>,
        args: Vec<Expr>,
        span: Span,
    },
    Lambda(Lambda),
    PatternLambda(PatternLambda),
    Match {
        scrutinee: Box<Expr>,
        clauses: Vec<MatchClause>,
        span: Span,
    },
    StringContextCast(Box<Expr>, StringContext, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, s)
            | Expr::Random(s)
            | Expr::FString(_, s)
            | Expr::Ident(_, s)
            | Expr::Move(_, s)
            | Expr::Unary(_, _, s)
            | Expr::Binary(_, _, _, s)
            | Expr::ListLiteral(_, s)
            | Expr::MapLiteral(_, s)
            | Expr::Index(_, _, s)
            | Expr::Slice { span: s, .. }
            | Expr::Cast { span: s, .. }
            | Expr::Call { span: s, .. }
            | Expr::FfiCall { span: s, .. }
            | Expr::Match { span: s, .. }
            | Expr::StringContextCast(_, _, s) => *s,
            Expr::Lambda(l) => l.span,
            Expr::PatternLambda(l) => l.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
    /// `:=`: introduce a new immutable binding; redefinition is an error.
    Define,
    /// `<-`: update an existing mutable binding.
    Update,
    /// `=`: reuse the slot of an existing mutable binding, or define at
    /// module scope.
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Exclusive,
    Inclusive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        kind: AssignKind,
        name: Rc<str>,
        value: Expr,
        span: Span,
    },
    MultiAssign {
        names: Vec<Rc<str>>,
        value: Expr,
        span: Span,
    },
    IndexUpdate {
        target: Expr,
        index: Expr,
        value: Expr,
        span: Span,
    },
    /// `x++` / `x--`; statement-only, never an expression.
    Postfix {
        name: Rc<str>,
        increment: bool,
        span: Span,
    },
    ExprStmt(Expr),
    Defer(Expr, Span),
    /// A scoped arena block: bumps the compile-time arena depth counter
    /// for its body and emits a reset at block exit (`spec.md` §4.3).
    ArenaBlock { body: Vec<Stmt>, span: Span },
    /// `c67 { ... }`: fork a child process that runs `body` and exits; the
    /// parent continues after the statement.
    Spawn { body: Vec<Stmt>, span: Span },
    Loop(Loop),
    Break { label: LoopLabel, span: Span },
    Continue { label: LoopLabel, span: Span },
    Return { value: Option<Expr>, span: Span },
    /// `ret @N`: return from loop `N` as if it were the function body.
    ReturnFromLoop { label: LoopLabel, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loop {
    /// `@ i in a..<b` / `a..=b`, optionally `max N` to abort on overflow.
    Range {
        label: LoopLabel,
        var: Rc<str>,
        start: Expr,
        end: Expr,
        bound: RangeBound,
        max_check: Option<Expr>,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `@ e in list`
    List {
        label: LoopLabel,
        var: Rc<str>,
        list: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `@ cond max N`
    While {
        label: LoopLabel,
        cond: Expr,
        max_iterations: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `@ msg, from in ":port"` / `":p1-p2"`
    Receive {
        label: LoopLabel,
        msg_var: Rc<str>,
        from_var: Rc<str>,
        port_spec: Rc<str>,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `@@ i in a..<b` (parallel, N = CPU count) or `N @ i in a..<b`
    /// (parallel, explicit thread count).
    ParallelRange {
        label: LoopLabel,
        var: Rc<str>,
        start: Expr,
        end: Expr,
        bound: RangeBound,
        thread_count: Option<Expr>,
        /// Set by the (external) optimizer pre-pass when the body has the
        /// shape `result[i] <- a[i] OP b[i]`.
        vectorizable: Option<VectorHint>,
        body: Vec<Stmt>,
        span: Span,
    },
}

/// Annotation the optimizer pre-pass may attach to a loop node
/// (`spec.md` §1 external collaborators, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorHint {
    pub width: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<LambdaParam>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub functions: Vec<Function>,
    pub top_level: Vec<Stmt>,
}
