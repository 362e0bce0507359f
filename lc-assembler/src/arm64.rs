//! ARM64 (AAPCS64) instruction emitter.
//!
//! AArch64 instructions are uniformly 4 bytes wide, which makes this
//! backend considerably shorter than [`crate::x64::X64Assembler`]: there is
//! no REX/ModRM/SIB machinery, only fixed-width encodings with bitfields.
//! Register conventions: `x0..x30` general purpose, `d0..d31` double
//! precision float (`spec.md` §4.2 result register `d0`).

use crate::buffer::{CodeBuffer, PatchTarget, RelocKind};
use crate::{Assembler, Cond, FeatureFlagSymbols, Label, Reg, SymbolId, VectorOp};

const FP: u8 = 29; // x29, frame pointer
const LR: u8 = 30; // x30, link register
const SP_FRAME_ALIGN: i32 = 16;

#[derive(Debug, Default)]
pub struct Arm64Assembler {
    _private: (),
}

fn align16(n: i32) -> i32 {
    (n + (SP_FRAME_ALIGN - 1)) & !(SP_FRAME_ALIGN - 1)
}

impl Assembler for Arm64Assembler {
    fn mov_imm_to_reg(&mut self, buf: &mut CodeBuffer, dst: Reg, imm: i64) {
        // MOVZ/MOVK sequence, 16 bits per instruction, little endian halves.
        let bits = imm as u64;
        let halves = [bits & 0xffff, (bits >> 16) & 0xffff, (bits >> 32) & 0xffff, (bits >> 48) & 0xffff];
        for (i, half) in halves.iter().enumerate() {
            let opc = if i == 0 { 0b10 } else { 0b11 }; // MOVZ then MOVK
            let word = 0xd2800000u32
                | ((opc as u32) << 29)
                | ((i as u32) << 21)
                | ((*half as u32) << 5)
                | dst.enc() as u32;
            buf.put4(word);
        }
    }

    fn mov_reg_to_reg(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        // MOV (alias for ORR dst, xzr, src)
        let word = 0xaa0003e0u32 | ((src.enc() as u32) << 16) | dst.enc() as u32;
        buf.put4(word);
    }

    fn load_float(&mut self, buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32) {
        let imm9 = (offset & 0x1ff) as u32;
        let word = 0xfc400000u32 | (imm9 << 12) | ((base.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn store_float(&mut self, buf: &mut CodeBuffer, base: Reg, offset: i32, src: Reg) {
        let imm9 = (offset & 0x1ff) as u32;
        let word = 0xfc000000u32 | (imm9 << 12) | ((base.enc() as u32) << 5) | src.enc() as u32;
        buf.put4(word);
    }

    fn load_word(&mut self, buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32) {
        let imm9 = (offset & 0x1ff) as u32;
        let word = 0xf8400000u32 | (imm9 << 12) | ((base.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn store_word(&mut self, buf: &mut CodeBuffer, base: Reg, offset: i32, src: Reg) {
        let imm9 = (offset & 0x1ff) as u32;
        let word = 0xf8000000u32 | (imm9 << 12) | ((base.enc() as u32) << 5) | src.enc() as u32;
        buf.put4(word);
    }

    fn load_symbol_addr(&mut self, buf: &mut CodeBuffer, dst: Reg, symbol: SymbolId) {
        // ADRP dst, page ; ADD dst, dst, #lo12; patched as a pair of
        // PC-relative fixups against the same symbol.
        let adrp = 0x90000000u32 | dst.enc() as u32;
        let pos = buf.offset();
        buf.put4(adrp);
        buf.add_patch(pos, RelocKind::Rel32, PatchTarget::Symbol(symbol), 0);
        let add = 0x91000000u32 | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        let pos2 = buf.offset();
        buf.put4(add);
        buf.add_patch(pos2, RelocKind::Rel32, PatchTarget::Symbol(symbol), 0);
    }

    fn addsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        let word = 0x1e602800u32 | ((src.enc() as u32) << 16) | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn subsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        let word = 0x1e603800u32 | ((src.enc() as u32) << 16) | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn mulsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        let word = 0x1e600800u32 | ((src.enc() as u32) << 16) | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn divsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        let word = 0x1e601800u32 | ((src.enc() as u32) << 16) | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn fmadd(&mut self, buf: &mut CodeBuffer, dst: Reg, a: Reg, b: Reg, c: Reg) {
        debug_assert_eq!(dst.enc(), c.enc(), "fmadd destination must alias the addend");
        // FMADD dst, a, b, c (dst = a*b + c), always available on AAPCS64.
        let word = 0x1f400000u32
            | ((b.enc() as u32) << 16)
            | ((c.enc() as u32) << 10)
            | ((a.enc() as u32) << 5)
            | dst.enc() as u32;
        buf.put4(word);
    }

    fn ucomisd(&mut self, buf: &mut CodeBuffer, lhs: Reg, rhs: Reg) {
        // FCMP
        let word = 0x1e602000u32 | ((rhs.enc() as u32) << 16) | ((lhs.enc() as u32) << 5);
        buf.put4(word);
    }

    fn cvt_int_to_float(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        let word = 0x9e620000u32 | ((src.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn cvt_float_to_int(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        let word = 0x9e780000u32 | ((src.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn add_imm(&mut self, buf: &mut CodeBuffer, dst: Reg, imm: i32) {
        let word = 0x91000000u32 | (((imm & 0xfff) as u32) << 10) | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn cmp_imm(&mut self, buf: &mut CodeBuffer, lhs: Reg, imm: i32) {
        let word = 0xf1000000u32 | (((imm & 0xfff) as u32) << 10) | ((lhs.enc() as u32) << 5) | 0x1f;
        buf.put4(word);
    }

    fn add_reg(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg) {
        // ADD dst, dst, src
        let word = 0x8b000000u32 | ((src.enc() as u32) << 16) | ((dst.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn cmp_reg(&mut self, buf: &mut CodeBuffer, lhs: Reg, rhs: Reg) {
        let word = 0xeb00001fu32 | ((rhs.enc() as u32) << 16) | ((lhs.enc() as u32) << 5);
        buf.put4(word);
    }

    fn call_symbol(&mut self, buf: &mut CodeBuffer, symbol: SymbolId) {
        let pos = buf.offset();
        buf.put4(0x94000000); // BL, immediate patched below
        buf.add_patch(pos, RelocKind::Rel32, PatchTarget::Symbol(symbol), 0);
    }

    fn call_indirect(&mut self, buf: &mut CodeBuffer, target: Reg) {
        let word = 0xd63f0000u32 | ((target.enc() as u32) << 5);
        buf.put4(word);
    }

    fn jump_symbol(&mut self, buf: &mut CodeBuffer, symbol: SymbolId) {
        let pos = buf.offset();
        buf.put4(0x14000000); // B, immediate patched below
        buf.add_patch(pos, RelocKind::Rel32, PatchTarget::Symbol(symbol), 0);
    }

    fn bind_label(&mut self, buf: &mut CodeBuffer, label: Label) {
        buf.bind_label(label);
    }

    fn jump(&mut self, buf: &mut CodeBuffer, label: Label) {
        let pos = buf.offset();
        buf.put4(0x14000000);
        buf.add_patch(pos, RelocKind::Rel32, PatchTarget::Label(label), 0);
    }

    fn jump_conditional(&mut self, buf: &mut CodeBuffer, cond: Cond, label: Label) {
        let cc = match cond {
            Cond::Equal => 0x0,
            Cond::NotEqual => 0x1,
            Cond::Less => 0xb,
            Cond::LessEqual => 0xd,
            Cond::Greater => 0xc,
            Cond::GreaterEqual => 0xa,
            Cond::Unordered => 0x6, // VS
        };
        let pos = buf.offset();
        buf.put4(0x54000000 | cc);
        buf.add_patch(pos, RelocKind::Rel32, PatchTarget::Label(label), 0);
    }

    fn push_reg(&mut self, buf: &mut CodeBuffer, reg: Reg) {
        // STR reg, [sp, #-16]! (pre-indexed, 16-byte aligned push)
        let word = 0xf81f0fe0u32 | reg.enc() as u32;
        buf.put4(word);
    }

    fn pop_reg(&mut self, buf: &mut CodeBuffer, reg: Reg) {
        // LDR reg, [sp], #16 (post-indexed pop)
        let word = 0xf84107e0u32 | reg.enc() as u32;
        buf.put4(word);
    }

    fn syscall(&mut self, buf: &mut CodeBuffer) {
        buf.put4(0xd4000001); // SVC #0
    }

    fn ret(&mut self, buf: &mut CodeBuffer) {
        buf.put4(0xd65f0000 | ((LR as u32) << 5));
    }

    fn prologue(&mut self, buf: &mut CodeBuffer, frame_size: i32) {
        self.push_reg(buf, Reg::Gpr(FP));
        self.push_reg(buf, Reg::Gpr(LR));
        self.mov_reg_to_reg(buf, Reg::Gpr(FP), Reg::Gpr(31)); // sp encoded as x31 alias
        let aligned = align16(frame_size);
        if aligned != 0 {
            // SUB sp, sp, #aligned
            let word = 0xd1000000u32 | (((aligned & 0xfff) as u32) << 10) | (31 << 5) | 31;
            buf.put4(word);
        }
    }

    fn epilogue(&mut self, buf: &mut CodeBuffer) {
        self.mov_reg_to_reg(buf, Reg::Gpr(31), Reg::Gpr(FP));
        self.pop_reg(buf, Reg::Gpr(LR));
        self.pop_reg(buf, Reg::Gpr(FP));
    }

    fn vector_load(&mut self, buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32, width: u8) {
        debug_assert!(matches!(width, 2), "NEON lanes here are fixed at 2 doubles (128-bit Q register)");
        let imm7 = ((offset / 8) & 0x7f) as u32;
        let word = 0x6c400000u32 | (imm7 << 15) | ((base.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn vector_store(&mut self, buf: &mut CodeBuffer, base: Reg, offset: i32, src: Reg, width: u8) {
        debug_assert!(matches!(width, 2));
        let imm7 = ((offset / 8) & 0x7f) as u32;
        let word = 0x6c000000u32 | (imm7 << 15) | ((base.enc() as u32) << 5) | src.enc() as u32;
        buf.put4(word);
    }

    fn vector_binop(&mut self, buf: &mut CodeBuffer, op: VectorOp, dst: Reg, a: Reg, b: Reg, width: u8) {
        debug_assert!(matches!(width, 2));
        let opcode = match op {
            VectorOp::Add => 0x4e60d400u32,
            VectorOp::Sub => 0x4ee0d400u32,
            VectorOp::Mul => 0x4e60dc00u32,
        };
        let word = opcode | ((b.enc() as u32) << 16) | ((a.enc() as u32) << 5) | dst.enc() as u32;
        buf.put4(word);
    }

    fn vector_cleanup(&mut self, _buf: &mut CodeBuffer) {
        // NEON has no upper-register transition penalty; nothing to do.
    }

    fn emit_feature_probe(&mut self, buf: &mut CodeBuffer, flags: &FeatureFlagSymbols) {
        // AArch64 has no user-mode CPUID; NEON/FP are architectural, and
        // FMA is always present via FMADD. Flags are emitted as constant
        // stores rather than a runtime probe.
        log::debug!("arm64: NEON/FMA are architectural, writing constant feature flags");
        for (symbol, value) in [
            (flags.has_fma, 1u32),
            (flags.has_avx2, 0),
            (flags.has_popcnt, 0),
            (flags.has_avx512f, 0),
        ] {
            self.mov_imm_to_reg(buf, Reg::Gpr(11), value as i64);
            let pos_adrp = buf.offset();
            buf.put4(0x90000000 | 12); // adrp x12, symbol
            buf.add_patch(pos_adrp, RelocKind::Rel32, PatchTarget::Symbol(symbol), 0);
            let word = 0x39000000u32 | (12 << 5) | 11; // strb w11, [x12]
            buf.put4(word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CodeBuffer;

    #[test]
    fn mov_imm_emits_movz_then_three_movk() {
        let mut asm = Arm64Assembler::default();
        let mut buf = CodeBuffer::new();
        asm.mov_imm_to_reg(&mut buf, Reg::Gpr(0), 0x1234);
        assert_eq!(buf.bytes().len(), 16); // four 4-byte instructions
    }

    #[test]
    fn call_symbol_records_one_patch() {
        let mut asm = Arm64Assembler::default();
        let mut buf = CodeBuffer::new();
        asm.call_symbol(&mut buf, SymbolId::from_u32(1));
        assert_eq!(buf.patches().len(), 1);
    }
}
