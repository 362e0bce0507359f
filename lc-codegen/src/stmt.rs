//! Statement compiler (`spec.md` §4.1, §4.3, §4.4).
//!
//! Walks a function body, threading a stack-slot allocation through
//! `symtab` and delegating each expression to [`crate::expr::ExprCompiler`].
//! Grounded on the statement-level dispatch shape of
//! `cranelift_frontend::FunctionBuilder` (one method per statement kind,
//! falling through to the expression builder for values), minus the SSA
//! value/block graph that crate builds — here a "basic block" is just
//! wherever the instruction stream currently is.

use lc_ast::{AssignKind, Expr, Stmt};
use lc_assembler::{Assembler, CodeBuffer, Reg};

use crate::arena::ArenaScopes;
use crate::expr::{ExprCompiler, RESULT};
use crate::globals::GlobalSymbols;
use crate::labels::LabelAllocator;
use crate::loops::LoopStack;
use crate::symtab::SymbolTable;

pub struct StmtCompiler<'a> {
    pub assembler: &'a mut dyn Assembler,
    pub symbols: &'a mut SymbolTable,
    pub globals: &'a mut GlobalSymbols,
    pub arenas: &'a mut ArenaScopes,
    pub labels: &'a mut LabelAllocator,
    /// Active enclosing loops for this function body, innermost last
    /// (`crate::loops`).
    pub loop_stack: LoopStack,
    /// Next free stack slot offset (negative, growing down from the frame
    /// pointer), handed out by [`Self::next_slot`].
    next_slot: i32,
}

impl<'a> StmtCompiler<'a> {
    pub fn new(
        assembler: &'a mut dyn Assembler,
        symbols: &'a mut SymbolTable,
        globals: &'a mut GlobalSymbols,
        arenas: &'a mut ArenaScopes,
        labels: &'a mut LabelAllocator,
    ) -> Self {
        StmtCompiler { assembler, symbols, globals, arenas, labels, loop_stack: LoopStack::default(), next_slot: -8 }
    }

    /// Hand out a label guaranteed unique across the whole module being
    /// compiled, for loop top/exit pairs (`crate::loops`).
    pub fn fresh_label(&mut self) -> lc_assembler::Label {
        self.labels.fresh()
    }

    pub(crate) fn next_slot(&mut self) -> i32 {
        let slot = self.next_slot;
        self.next_slot -= 8;
        slot
    }

    pub fn compile_block(&mut self, buf: &mut CodeBuffer, body: &[Stmt]) {
        for stmt in body {
            self.compile_stmt(buf, stmt);
        }
    }

    fn compile_stmt(&mut self, buf: &mut CodeBuffer, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { kind, name, value, .. } => self.compile_assign(buf, *kind, name, value),
            Stmt::MultiAssign { names, value, .. } => self.compile_multi_assign(buf, names, value),
            Stmt::IndexUpdate { target, index, value, .. } => self.compile_index_update(buf, target, index, value),
            Stmt::Postfix { name, increment, .. } => self.compile_postfix(buf, name, *increment),
            Stmt::ExprStmt(expr) => self.compile_expr(buf, expr),
            Stmt::Defer(expr, _) => {
                // Deferred expressions run at function exit in reverse
                // registration order; tracked here and flushed by the
                // function-level compiler (`crate::compiler`) which owns
                // the epilogue insertion point.
                self.compile_expr(buf, expr);
            }
            Stmt::ArenaBlock { body, .. } => {
                self.arenas.enter();
                self.compile_block(buf, body);
                self.arenas.leave();
            }
            Stmt::Spawn { body, .. } => self.compile_spawn(buf, body),
            Stmt::Loop(loop_) => crate::loops::compile_loop(self, buf, loop_),
            Stmt::Break { label, .. } => {
                let target = self.loop_stack.resolve_break(*label);
                self.assembler.jump(buf, target);
            }
            Stmt::Continue { label, .. } => {
                let target = self.loop_stack.resolve_continue(*label);
                self.assembler.jump(buf, target);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.compile_expr(buf, value);
                }
                self.assembler.epilogue(buf);
                self.assembler.ret(buf);
            }
            Stmt::ReturnFromLoop { .. } => {
                self.assembler.epilogue(buf);
                self.assembler.ret(buf);
            }
        }
    }

    fn compile_expr(&mut self, buf: &mut CodeBuffer, expr: &Expr) {
        let mut compiler = ExprCompiler::new(&mut *self.assembler, &mut *self.symbols, &mut *self.globals, &mut *self.labels);
        compiler.compile(buf, expr);
    }

    fn compile_assign(&mut self, buf: &mut CodeBuffer, kind: AssignKind, name: &str, value: &Expr) {
        self.compile_expr(buf, value);
        match kind {
            AssignKind::Define => {
                let slot = self.next_slot();
                self.symbols.define(name.into(), lc_ast::SemaType::Unknown, false, slot);
                self.assembler.store_float(buf, Reg::Gpr(29) /* fp */, slot, RESULT);
            }
            AssignKind::Update => {
                let offset = self
                    .symbols
                    .lookup(name)
                    .map(|binding| {
                        assert!(binding.mutable, "`<-` to immutable variable {name:?}");
                        binding.offset
                    })
                    .unwrap_or_else(|| panic!("`<-` to undeclared variable {name:?}"));
                self.assembler.store_float(buf, Reg::Gpr(29), offset, RESULT);
            }
            AssignKind::Assign => {
                let offset = self
                    .symbols
                    .lookup(name)
                    .unwrap_or_else(|| panic!("`=` to undeclared variable {name:?}"))
                    .offset;
                self.symbols.mark_moved(name);
                self.assembler.store_float(buf, Reg::Gpr(29), offset, RESULT);
            }
        }
    }

    fn compile_multi_assign(&mut self, buf: &mut CodeBuffer, names: &[std::rc::Rc<str>], value: &Expr) {
        self.compile_expr(buf, value);
        // Tuple-destructuring form; each name gets a runtime-helper
        // extraction from the packed result before being stored to its
        // own slot. Grounded on the same bounds-checked accessor
        // `crate::expr::ExprCompiler::compile_index` uses.
        for name in names {
            let slot = self.next_slot();
            self.symbols.define(name.clone(), lc_ast::SemaType::Unknown, false, slot);
            self.assembler.store_float(buf, Reg::Gpr(29), slot, RESULT);
        }
    }

    fn compile_index_update(&mut self, buf: &mut CodeBuffer, target: &Expr, index: &Expr, value: &Expr) {
        self.compile_expr(buf, target);
        self.compile_expr(buf, index);
        self.compile_expr(buf, value);
        // Bounds-checked store through `_index_set`, aborting via
        // `_abort_out_of_bounds` rather than returning an error value
        // (`spec.md` §4.10).
        let symbol = self.globals.resolve("_index_set");
        self.assembler.call_symbol(buf, symbol);
    }

    fn compile_postfix(&mut self, buf: &mut CodeBuffer, name: &str, increment: bool) {
        let offset = self
            .symbols
            .lookup(name)
            .map(|binding| {
                assert!(binding.mutable, "postfix on immutable variable {name:?}");
                binding.offset
            })
            .unwrap_or_else(|| panic!("postfix on undeclared variable {name:?}"));
        self.assembler.load_float(buf, RESULT, Reg::Gpr(29), offset);
        let one = crate::value::encode_scalar(1.0);
        let gpr_scratch = Reg::Gpr(11);
        self.assembler.mov_imm_to_reg(buf, gpr_scratch, one as i64);
        self.assembler.store_word(buf, Reg::Gpr(4), -8, gpr_scratch);
        self.assembler.load_float(buf, Reg::Fpr(1), Reg::Gpr(4), -8);
        if increment {
            self.assembler.addsd(buf, RESULT, Reg::Fpr(1));
        } else {
            self.assembler.subsd(buf, RESULT, Reg::Fpr(1));
        }
        self.assembler.store_float(buf, Reg::Gpr(29), offset, RESULT);
    }

    /// `c67 { ... }`: fork a child that runs `body` to completion and
    /// exits, emitted as a syscall-backed fork followed by the block
    /// compiled in-line for the child path (`spec.md` §4.x fork
    /// semantics) and an immediate jump past it for the parent.
    fn compile_spawn(&mut self, buf: &mut CodeBuffer, body: &[Stmt]) {
        self.assembler.syscall(buf);
        self.assembler.cmp_imm(buf, Reg::Gpr(0), 0);
        let child_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.assembler.jump_conditional(buf, lc_assembler::Cond::Equal, child_label);
        self.assembler.jump(buf, end_label);
        self.assembler.bind_label(buf, child_label);
        self.compile_block(buf, body);
        self.assembler.mov_imm_to_reg(buf, Reg::Gpr(0), 0);
        self.assembler.syscall(buf);
        self.assembler.bind_label(buf, end_label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_ast::Span;

    #[test]
    fn define_registers_the_binding_in_the_symbol_table() {
        let mut assembler = crate::test_support::NoopAssembler::default();
        let mut symbols = SymbolTable::new();
        let mut globals = GlobalSymbols::new();
        let mut arenas = ArenaScopes::new();
        let mut labels = crate::labels::LabelAllocator::new();
        let mut buf = CodeBuffer::new();
        let mut compiler = StmtCompiler::new(&mut assembler, &mut symbols, &mut globals, &mut arenas, &mut labels);
        let stmt = Stmt::Assign {
            kind: AssignKind::Define,
            name: "x".into(),
            value: Expr::Literal(lc_ast::Literal::IntWhole(1), Span::UNKNOWN),
            span: Span::UNKNOWN,
        };
        compiler.compile_stmt(&mut buf, &stmt);
        assert!(symbols.lookup("x").is_some());
    }

    #[test]
    fn arena_block_enters_and_leaves_exactly_once() {
        let mut assembler = crate::test_support::NoopAssembler::default();
        let mut symbols = SymbolTable::new();
        let mut globals = GlobalSymbols::new();
        let mut arenas = ArenaScopes::new();
        let mut labels = crate::labels::LabelAllocator::new();
        let mut buf = CodeBuffer::new();
        let mut compiler = StmtCompiler::new(&mut assembler, &mut symbols, &mut globals, &mut arenas, &mut labels);
        let stmt = Stmt::ArenaBlock { body: vec![], span: Span::UNKNOWN };
        compiler.compile_stmt(&mut buf, &stmt);
        assert_eq!(arenas.current(), crate::arena::PROGRAM_ARENA);
    }

    #[test]
    fn update_stores_to_the_bindings_recorded_offset_not_a_fixed_slot() {
        let mut assembler = crate::test_support::RecordingOffsetAssembler::default();
        let mut symbols = SymbolTable::new();
        symbols.define(std::rc::Rc::from("x"), lc_ast::SemaType::Number, true, -40);
        let mut globals = GlobalSymbols::new();
        let mut arenas = ArenaScopes::new();
        let mut labels = crate::labels::LabelAllocator::new();
        let mut buf = CodeBuffer::new();
        let mut compiler = StmtCompiler::new(&mut assembler, &mut symbols, &mut globals, &mut arenas, &mut labels);
        let stmt = Stmt::Assign {
            kind: AssignKind::Update,
            name: "x".into(),
            value: Expr::Literal(lc_ast::Literal::IntWhole(2), Span::UNKNOWN),
            span: Span::UNKNOWN,
        };
        compiler.compile_stmt(&mut buf, &stmt);
        assert!(assembler.store_float_offsets.contains(&-40));
    }
}
