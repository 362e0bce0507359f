//! Integration tests exercising the public `Compiler` entry point
//! end-to-end over small programs (`spec.md` §8 scenarios, adapted to
//! what's checkable without executing the emitted machine code: symbol
//! presence, relocation counts, and deterministic recompilation).

use lc_ast::{AssignKind, Expr, Function, Literal, Loop, Program, RangeBound, Span, Stmt};
use lc_codegen::{CompileOptions, Compiler};
use std::rc::Rc;

fn compiler() -> Compiler {
    Compiler::new(CompileOptions::host()).expect("host target is supported")
}

#[test]
fn a_function_that_only_returns_a_literal_compiles_and_is_named() {
    let mut compiler = compiler();
    let program = Program {
        functions: vec![Function {
            name: Rc::from("answer"),
            params: vec![],
            body: vec![Stmt::Return {
                value: Some(Expr::Literal(Literal::IntWhole(42), Span::UNKNOWN)),
                span: Span::UNKNOWN,
            }],
            span: Span::UNKNOWN,
        }],
        top_level: vec![],
    };
    let module = compiler.compile_program(&program).unwrap();
    assert!(module.symbols.contains_key("answer"));
    assert!(!module.code.is_empty());
}

#[test]
fn recompiling_the_same_program_produces_the_same_code_length() {
    let program = Program {
        functions: vec![Function {
            name: Rc::from("main"),
            params: vec![],
            body: vec![
                Stmt::Assign {
                    kind: AssignKind::Define,
                    name: Rc::from("x"),
                    value: Expr::Literal(Literal::Fractional(1.5), Span::UNKNOWN),
                    span: Span::UNKNOWN,
                },
                Stmt::Return { value: None, span: Span::UNKNOWN },
            ],
            span: Span::UNKNOWN,
        }],
        top_level: vec![],
    };
    let module_a = compiler().compile_program(&program).unwrap();
    let module_b = compiler().compile_program(&program).unwrap();
    assert_eq!(module_a.code.len(), module_b.code.len());
}

#[test]
fn a_range_loop_body_compiles_without_error() {
    let program = Program {
        functions: vec![Function {
            name: Rc::from("sum_to_ten"),
            params: vec![],
            body: vec![Stmt::Loop(Loop::Range {
                label: 1,
                var: Rc::from("i"),
                start: Expr::Literal(Literal::IntWhole(0), Span::UNKNOWN),
                end: Expr::Literal(Literal::IntWhole(10), Span::UNKNOWN),
                bound: RangeBound::Exclusive,
                max_check: None,
                body: vec![],
                span: Span::UNKNOWN,
            })],
            span: Span::UNKNOWN,
        }],
        top_level: vec![],
    };
    let module = compiler().compile_program(&program).unwrap();
    assert!(module.symbols.contains_key("sum_to_ten"));
}

#[test]
fn empty_program_still_emits_the_mandatory_abort_helpers() {
    let module = compiler().compile_program(&Program::default()).unwrap();
    assert!(module.symbols.contains_key(lc_codegen::helpers::ABORT_OUT_OF_BOUNDS));
    assert!(module.symbols.contains_key(lc_codegen::helpers::ABORT_NULL_DEREF));
    assert!(module.symbols.contains_key(lc_codegen::helpers::ABORT_ALLOC_FAILURE));
}
