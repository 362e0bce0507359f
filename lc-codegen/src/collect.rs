//! Whole-program collection pass (`spec.md` §4.9 call-order bookkeeping,
//! §4.6/§4.7/§4.8 feature gating).
//!
//! Runs once before codegen proper. Grounded on `cranelift_wasm`'s
//! module-environment pre-scan (collecting a function index space and
//! import table before translating a single body), adapted here to a
//! single-binary, single-module program: there's one flat function
//! namespace, no imports/exports distinction, and the "module environment"
//! is just which runtime helpers this particular program ends up needing.

use lc_ast::{Expr, Loop, Program, Stmt};
use rustc_hash::FxHashSet;
use std::rc::Rc;

/// Which optional runtime helpers a program needs, discovered by walking
/// the whole AST once up front. [`crate::helpers`] only emits the bodies
/// this set calls for, the way a linker only pulls in the libc routines
/// actually referenced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFeatures {
    pub uses_arena: bool,
    pub uses_parallel_loops: bool,
    pub uses_vectorization: bool,
    pub uses_ffi: bool,
    pub uses_random: bool,
    pub uses_spawn: bool,
    pub uses_receive: bool,
    pub uses_memoized_lambda: bool,
    pub uses_strings: bool,
    pub uses_lists: bool,
    pub uses_print: bool,
}

/// The result of one collection pass over a [`Program`].
#[derive(Debug, Default)]
pub struct CollectResult {
    pub features: RuntimeFeatures,
    /// Every function name referenced by a call expression anywhere in
    /// the program, in first-use order (`spec.md` §4.9: helpers are
    /// emitted in the order they're first needed so a single forward
    /// scan can patch call sites against already-placed bodies where
    /// possible).
    pub used_functions: Vec<Rc<str>>,
    seen_functions: FxHashSet<Rc<str>>,
}

pub fn collect(program: &Program) -> CollectResult {
    let mut result = CollectResult::default();
    for function in &program.functions {
        walk_block(&function.body, &mut result);
    }
    walk_block(&program.top_level, &mut result);
    result
}

fn walk_block(body: &[Stmt], result: &mut CollectResult) {
    for stmt in body {
        walk_stmt(stmt, result);
    }
}

fn walk_stmt(stmt: &Stmt, result: &mut CollectResult) {
    match stmt {
        Stmt::Assign { value, .. } => walk_expr(value, result),
        Stmt::MultiAssign { value, .. } => walk_expr(value, result),
        Stmt::IndexUpdate { target, index, value, .. } => {
            walk_expr(target, result);
            walk_expr(index, result);
            walk_expr(value, result);
        }
        Stmt::Postfix { .. } => {}
        Stmt::ExprStmt(expr) => walk_expr(expr, result),
        Stmt::Defer(expr, _) => walk_expr(expr, result),
        Stmt::ArenaBlock { body, .. } => {
            result.features.uses_arena = true;
            walk_block(body, result);
        }
        Stmt::Spawn { body, .. } => {
            result.features.uses_spawn = true;
            walk_block(body, result);
        }
        Stmt::Loop(loop_) => walk_loop(loop_, result),
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                walk_expr(value, result);
            }
        }
        Stmt::ReturnFromLoop { .. } => {}
    }
}

fn walk_loop(loop_: &Loop, result: &mut CollectResult) {
    match loop_ {
        Loop::Range { start, end, max_check, body, .. } => {
            walk_expr(start, result);
            walk_expr(end, result);
            if let Some(max_check) = max_check {
                walk_expr(max_check, result);
            }
            walk_block(body, result);
        }
        Loop::List { list, body, .. } => {
            walk_expr(list, result);
            walk_block(body, result);
        }
        Loop::While { cond, max_iterations, body, .. } => {
            walk_expr(cond, result);
            walk_expr(max_iterations, result);
            walk_block(body, result);
        }
        Loop::Receive { body, .. } => {
            result.features.uses_receive = true;
            walk_block(body, result);
        }
        Loop::ParallelRange { start, end, thread_count, vectorizable, body, .. } => {
            result.features.uses_parallel_loops = true;
            if vectorizable.is_some() {
                result.features.uses_vectorization = true;
            }
            walk_expr(start, result);
            walk_expr(end, result);
            if let Some(thread_count) = thread_count {
                walk_expr(thread_count, result);
            }
            walk_block(body, result);
        }
    }
}

fn walk_expr(expr: &Expr, result: &mut CollectResult) {
    match expr {
        Expr::Literal(lc_ast::Literal::StringLit(_), _) => result.features.uses_strings = true,
        Expr::Literal(_, _) => {}
        Expr::Random(_) => result.features.uses_random = true,
        Expr::FString(parts, _) => {
            result.features.uses_strings = true;
            for part in parts {
                if let lc_ast::FStringPart::Expr(inner) = part {
                    walk_expr(inner, result);
                }
            }
        }
        Expr::Ident(_, _) | Expr::Move(_, _) => {}
        Expr::Unary(_, inner, _) => walk_expr(inner, result),
        Expr::Binary(_, lhs, rhs, _) => {
            walk_expr(lhs, result);
            walk_expr(rhs, result);
        }
        Expr::ListLiteral(items, _) => {
            result.features.uses_lists = true;
            for item in items {
                walk_expr(item, result);
            }
        }
        Expr::MapLiteral(pairs, _) => {
            result.features.uses_lists = true;
            for (k, v) in pairs {
                walk_expr(k, result);
                walk_expr(v, result);
            }
        }
        Expr::Index(target, index, _) => {
            result.features.uses_lists = true;
            walk_expr(target, result);
            walk_expr(index, result);
        }
        Expr::Slice { target, start, end, step, .. } => {
            result.features.uses_lists = true;
            walk_expr(target, result);
            for opt in [start, end, step] {
                if let Some(inner) = opt {
                    walk_expr(inner, result);
                }
            }
        }
        Expr::Cast { target, .. } => walk_expr(target, result),
        Expr::Call { callee, args, .. } => {
            if let Expr::Ident(name, _) = callee.as_ref() {
                if &**name == "println" {
                    result.features.uses_print = true;
                    result.features.uses_strings = true;
                }
                if result.seen_functions.insert(name.clone()) {
                    result.used_functions.push(name.clone());
                }
            } else {
                walk_expr(callee, result);
            }
            for arg in args {
                walk_expr(arg, result);
            }
        }
        Expr::FfiCall { args, .. } => {
            result.features.uses_ffi = true;
            for arg in args {
                walk_expr(arg, result);
            }
        }
        Expr::Lambda(lambda) => walk_expr(&lambda.body, result),
        Expr::PatternLambda(lambda) => {
            if lambda.params.len() == 1 && lambda.captures.is_empty() {
                result.features.uses_memoized_lambda = true;
            }
            for clause in &lambda.clauses {
                walk_expr(&clause.body, result);
            }
        }
        Expr::Match { scrutinee, clauses, .. } => {
            walk_expr(scrutinee, result);
            for clause in clauses {
                walk_expr(&clause.body, result);
            }
        }
        Expr::StringContextCast(inner, _, _) => walk_expr(inner, result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_ast::{Function, Span};

    fn ident(name: &str) -> Expr {
        Expr::Ident(Rc::from(name), Span::UNKNOWN)
    }

    #[test]
    fn calls_are_recorded_once_in_first_use_order() {
        let program = Program {
            functions: vec![Function {
                name: Rc::from("main"),
                params: vec![],
                body: vec![
                    Stmt::ExprStmt(Expr::Call { callee: Box::new(ident("a")), args: vec![], span: Span::UNKNOWN }),
                    Stmt::ExprStmt(Expr::Call { callee: Box::new(ident("b")), args: vec![], span: Span::UNKNOWN }),
                    Stmt::ExprStmt(Expr::Call { callee: Box::new(ident("a")), args: vec![], span: Span::UNKNOWN }),
                ],
                span: Span::UNKNOWN,
            }],
            top_level: vec![],
        };
        let result = collect(&program);
        assert_eq!(result.used_functions.len(), 2);
        assert_eq!(&*result.used_functions[0], "a");
        assert_eq!(&*result.used_functions[1], "b");
    }

    #[test]
    fn arena_blocks_set_the_arena_feature_flag() {
        let program = Program {
            functions: vec![],
            top_level: vec![Stmt::ArenaBlock { body: vec![], span: Span::UNKNOWN }],
        };
        assert!(collect(&program).features.uses_arena);
    }

    #[test]
    fn random_expression_sets_the_random_feature_flag() {
        let program = Program {
            functions: vec![],
            top_level: vec![Stmt::ExprStmt(Expr::Random(Span::UNKNOWN))],
        };
        assert!(collect(&program).features.uses_random);
    }

    #[test]
    fn single_arg_non_capturing_pattern_lambda_is_memoization_eligible() {
        let lambda = lc_ast::PatternLambda {
            params: vec![lc_ast::LambdaParam { name: Rc::from("n"), is_variadic: false }],
            captures: vec![],
            clauses: vec![lc_ast::MatchClause { pattern: None, body: Box::new(ident("n")) }],
            span: Span::UNKNOWN,
        };
        let program = Program {
            functions: vec![],
            top_level: vec![Stmt::ExprStmt(Expr::PatternLambda(lambda))],
        };
        assert!(collect(&program).features.uses_memoized_lambda);
    }
}
