//! Shared test doubles, not compiled outside `#[cfg(test)]`.

use lc_assembler::{Assembler, CodeBuffer, Cond, FeatureFlagSymbols, Label, Reg, SymbolId, VectorOp};

/// An [`Assembler`] that accepts every call and writes nothing, for tests
/// that only care about the compile-time bookkeeping (symbol tables,
/// arena depth, loop label resolution) around the byte emission rather
/// than the bytes themselves.
#[derive(Default)]
pub struct NoopAssembler;

impl Assembler for NoopAssembler {
    fn mov_imm_to_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: i64) {}
    fn mov_reg_to_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn load_float(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: i32) {}
    fn store_float(&mut self, _: &mut CodeBuffer, _: Reg, _: i32, _: Reg) {}
    fn load_word(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: i32) {}
    fn store_word(&mut self, _: &mut CodeBuffer, _: Reg, _: i32, _: Reg) {}
    fn load_symbol_addr(&mut self, _: &mut CodeBuffer, _: Reg, _: SymbolId) {}
    fn addsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn subsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn mulsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn divsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn fmadd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: Reg, _: Reg) {}
    fn ucomisd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn cvt_int_to_float(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn cvt_float_to_int(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn add_imm(&mut self, _: &mut CodeBuffer, _: Reg, _: i32) {}
    fn add_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn cmp_imm(&mut self, _: &mut CodeBuffer, _: Reg, _: i32) {}
    fn cmp_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn call_symbol(&mut self, _: &mut CodeBuffer, _: SymbolId) {}
    fn call_indirect(&mut self, _: &mut CodeBuffer, _: Reg) {}
    fn jump_symbol(&mut self, _: &mut CodeBuffer, _: SymbolId) {}
    fn bind_label(&mut self, _: &mut CodeBuffer, _: Label) {}
    fn jump(&mut self, _: &mut CodeBuffer, _: Label) {}
    fn jump_conditional(&mut self, _: &mut CodeBuffer, _: Cond, _: Label) {}
    fn push_reg(&mut self, _: &mut CodeBuffer, _: Reg) {}
    fn pop_reg(&mut self, _: &mut CodeBuffer, _: Reg) {}
    fn syscall(&mut self, _: &mut CodeBuffer) {}
    fn ret(&mut self, _: &mut CodeBuffer) {}
    fn prologue(&mut self, _: &mut CodeBuffer, _: i32) {}
    fn epilogue(&mut self, _: &mut CodeBuffer) {}
    fn vector_load(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: i32, _: u8) {}
    fn vector_store(&mut self, _: &mut CodeBuffer, _: Reg, _: i32, _: Reg, _: u8) {}
    fn vector_binop(&mut self, _: &mut CodeBuffer, _: VectorOp, _: Reg, _: Reg, _: Reg, _: u8) {}
    fn vector_cleanup(&mut self, _: &mut CodeBuffer) {}
    fn emit_feature_probe(&mut self, _: &mut CodeBuffer, _: &FeatureFlagSymbols) {}
}

/// An [`Assembler`] that records every `store_float` offset it's asked to
/// write to, for tests asserting a fix writes through a binding's real
/// stack slot rather than a hardcoded one.
#[derive(Default)]
pub struct RecordingOffsetAssembler {
    pub store_float_offsets: Vec<i32>,
}

impl Assembler for RecordingOffsetAssembler {
    fn mov_imm_to_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: i64) {}
    fn mov_reg_to_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn load_float(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: i32) {}
    fn store_float(&mut self, _: &mut CodeBuffer, _: Reg, offset: i32, _: Reg) {
        self.store_float_offsets.push(offset);
    }
    fn load_word(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: i32) {}
    fn store_word(&mut self, _: &mut CodeBuffer, _: Reg, _: i32, _: Reg) {}
    fn load_symbol_addr(&mut self, _: &mut CodeBuffer, _: Reg, _: SymbolId) {}
    fn addsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn subsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn mulsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn divsd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn fmadd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: Reg, _: Reg) {}
    fn ucomisd(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn cvt_int_to_float(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn cvt_float_to_int(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn add_imm(&mut self, _: &mut CodeBuffer, _: Reg, _: i32) {}
    fn add_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn cmp_imm(&mut self, _: &mut CodeBuffer, _: Reg, _: i32) {}
    fn cmp_reg(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg) {}
    fn call_symbol(&mut self, _: &mut CodeBuffer, _: SymbolId) {}
    fn call_indirect(&mut self, _: &mut CodeBuffer, _: Reg) {}
    fn jump_symbol(&mut self, _: &mut CodeBuffer, _: SymbolId) {}
    fn bind_label(&mut self, _: &mut CodeBuffer, _: Label) {}
    fn jump(&mut self, _: &mut CodeBuffer, _: Label) {}
    fn jump_conditional(&mut self, _: &mut CodeBuffer, _: Cond, _: Label) {}
    fn push_reg(&mut self, _: &mut CodeBuffer, _: Reg) {}
    fn pop_reg(&mut self, _: &mut CodeBuffer, _: Reg) {}
    fn syscall(&mut self, _: &mut CodeBuffer) {}
    fn ret(&mut self, _: &mut CodeBuffer) {}
    fn prologue(&mut self, _: &mut CodeBuffer, _: i32) {}
    fn epilogue(&mut self, _: &mut CodeBuffer) {}
    fn vector_load(&mut self, _: &mut CodeBuffer, _: Reg, _: Reg, _: i32, _: u8) {}
    fn vector_store(&mut self, _: &mut CodeBuffer, _: Reg, _: i32, _: Reg, _: u8) {}
    fn vector_binop(&mut self, _: &mut CodeBuffer, _: VectorOp, _: Reg, _: Reg, _: Reg, _: u8) {}
    fn vector_cleanup(&mut self, _: &mut CodeBuffer) {}
    fn emit_feature_probe(&mut self, _: &mut CodeBuffer, _: &FeatureFlagSymbols) {}
}
