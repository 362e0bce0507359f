//! Single-pass per-architecture instruction emitter.
//!
//! One [`Assembler`] implementation exists per target architecture
//! (x86-64, ARM64, RISC-V64); `lc-codegen` dispatches to one of them once,
//! at compiler construction time, based on a `target_lexicon::Triple`. Every
//! method appends raw bytes to a [`CodeBuffer`] and, for a symbolic target
//! whose final address isn't known yet, records a [`PatchSite`] instead of
//! writing anything relocation-shaped into the byte stream itself
//! (`spec.md` §9: "do not mutate emitted bytes in-place via indexing").
//!
//! Grounded on `cranelift_codegen::binemit` (the `CodeSink`/`Reloc`
//! abstraction this crate's `CodeBuffer`/`RelocKind` mirror) and
//! `cranelift_assembler_x64` (per-register-class operand types).

mod arm64;
mod buffer;
mod reg;
mod riscv64;
mod x64;

pub use arm64::Arm64Assembler;
pub use buffer::{Addend, CodeBuffer, CodeOffset, PatchSite, PatchTarget, RelocKind};
pub use reg::{Cond, Reg};
pub use riscv64::Riscv64Assembler;
pub use x64::X64Assembler;

use target_lexicon::{Architecture, Triple};

lc_entity::entity_impl!(SymbolId, "sym");

/// A code label within the function currently being emitted. Labels are
/// resolved to a [`CodeOffset`] once their definition point is reached;
/// until then, jumps to them register a [`PatchSite`] the same way calls to
/// not-yet-placed symbols do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub fn new(n: u32) -> Self {
        Label(n)
    }
}

/// Per-architecture machine code emitter.
///
/// Method names follow the operations named in `spec.md` §2 item 1
/// (`MovImmToReg`, `AddsdXmm`, `CallSymbol`, `JumpConditional`, `Syscall`)
/// translated to Rust naming conventions. Implementations must not expose
/// raw opcode bytes at call sites (`spec.md` §9 Design Note on named
/// builder methods); every instruction variant gets its own method here.
pub trait Assembler {
    /// Load a 64-bit integer immediate into a general-purpose register.
    fn mov_imm_to_reg(&mut self, buf: &mut CodeBuffer, dst: Reg, imm: i64);

    /// Move a value between two general-purpose registers.
    fn mov_reg_to_reg(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);

    /// Load a float value from `[base + offset]` into a float register.
    fn load_float(&mut self, buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32);

    /// Store a float register to `[base + offset]`.
    fn store_float(&mut self, buf: &mut CodeBuffer, base: Reg, offset: i32, src: Reg);

    /// Load an 8-byte value from `[base + offset]` into a general-purpose
    /// register.
    fn load_word(&mut self, buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32);

    /// Store an 8-byte general-purpose register to `[base + offset]`.
    fn store_word(&mut self, buf: &mut CodeBuffer, base: Reg, offset: i32, src: Reg);

    /// Load the address of a rodata/data symbol, PC-relative, into `dst`;
    /// records a [`PatchSite`] for the final address.
    fn load_symbol_addr(&mut self, buf: &mut CodeBuffer, dst: Reg, symbol: SymbolId);

    /// `dst <- dst + src` in double precision (`AddsdXmm` in `spec.md`).
    fn addsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);
    fn subsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);
    fn mulsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);
    fn divsd(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);
    /// `dst <- (a * b) + c`, emitted as one fused instruction when the CPU
    /// feature probe reports FMA support (`spec.md` §4.2 FMA pattern).
    fn fmadd(&mut self, buf: &mut CodeBuffer, dst: Reg, a: Reg, b: Reg, c: Reg);
    /// Unordered compare of two doubles, setting condition flags usable by
    /// [`Assembler::jump_conditional`] and `is_nan`/ordering predicates.
    fn ucomisd(&mut self, buf: &mut CodeBuffer, lhs: Reg, rhs: Reg);
    fn cvt_int_to_float(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);
    fn cvt_float_to_int(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);

    /// Integer add/sub/compare, used for pointer/offset arithmetic and loop
    /// counters.
    fn add_imm(&mut self, buf: &mut CodeBuffer, dst: Reg, imm: i32);
    /// `dst += src` over general-purpose registers; the only way to turn a
    /// runtime-variable index into a memory address, since every load/store
    /// in this trait only takes a compile-time constant displacement.
    fn add_reg(&mut self, buf: &mut CodeBuffer, dst: Reg, src: Reg);
    fn cmp_imm(&mut self, buf: &mut CodeBuffer, lhs: Reg, imm: i32);
    fn cmp_reg(&mut self, buf: &mut CodeBuffer, lhs: Reg, rhs: Reg);

    /// Call a statically known symbol (PLT stub or in-module function);
    /// records a [`PatchSite`] for the call target.
    fn call_symbol(&mut self, buf: &mut CodeBuffer, symbol: SymbolId);
    /// Call through a register holding a function pointer (closure
    /// invocation).
    fn call_indirect(&mut self, buf: &mut CodeBuffer, target: Reg);
    /// Rewrite the current call into a jump to the callee's body start,
    /// used by tail-call optimization once arguments have been rebound.
    fn jump_symbol(&mut self, buf: &mut CodeBuffer, symbol: SymbolId);

    fn bind_label(&mut self, buf: &mut CodeBuffer, label: Label);
    fn jump(&mut self, buf: &mut CodeBuffer, label: Label);
    fn jump_conditional(&mut self, buf: &mut CodeBuffer, cond: Cond, label: Label);

    fn push_reg(&mut self, buf: &mut CodeBuffer, reg: Reg);
    fn pop_reg(&mut self, buf: &mut CodeBuffer, reg: Reg);

    /// Issue a raw syscall with the platform's syscall-argument registers
    /// already populated by the caller.
    fn syscall(&mut self, buf: &mut CodeBuffer);

    fn ret(&mut self, buf: &mut CodeBuffer);

    /// Emit function prologue: push frame pointer, set frame pointer from
    /// stack pointer, reserve `frame_size` bytes of locals.
    fn prologue(&mut self, buf: &mut CodeBuffer, frame_size: i32);
    /// Emit function epilogue: restore stack pointer, pop frame pointer.
    fn epilogue(&mut self, buf: &mut CodeBuffer);

    /// Vector load/arith at the given lane width (2/4/8), used by the
    /// auto-vectorizer; `None` width means the scalar fallback was already
    /// chosen and these should not be called.
    fn vector_load(&mut self, buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32, width: u8);
    fn vector_store(&mut self, buf: &mut CodeBuffer, base: Reg, offset: i32, src: Reg, width: u8);
    fn vector_binop(&mut self, buf: &mut CodeBuffer, op: VectorOp, dst: Reg, a: Reg, b: Reg, width: u8);
    /// `VZEROUPPER` on x86 when AVX was used; a no-op on other ISAs.
    fn vector_cleanup(&mut self, buf: &mut CodeBuffer);

    /// Execute the CPUID/feature-probe leaves appropriate for this
    /// architecture and store each flag byte into its data symbol.
    fn emit_feature_probe(&mut self, buf: &mut CodeBuffer, flag_symbols: &FeatureFlagSymbols);
}

/// Elementwise vector operation recognized by the auto-vectorizer
/// (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOp {
    Add,
    Sub,
    Mul,
}

/// Data-section symbols the CPU feature probe writes its flag bytes into.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlagSymbols {
    pub has_fma: SymbolId,
    pub has_avx2: SymbolId,
    pub has_popcnt: SymbolId,
    pub has_avx512f: SymbolId,
}

/// Pick the `Assembler` implementation for `triple`'s architecture.
///
/// Mirrors `cranelift_native::builder`: one dispatch point, the rest of the
/// compiler is architecture-agnostic (`spec.md` §9 Design Note).
pub fn assembler_for(triple: &Triple) -> Result<Box<dyn Assembler>, UnsupportedArchitecture> {
    match triple.architecture {
        Architecture::X86_64 => Ok(Box::new(X64Assembler::default())),
        Architecture::Aarch64(_) => Ok(Box::new(Arm64Assembler::default())),
        Architecture::Riscv64(_) => Ok(Box::new(Riscv64Assembler::default())),
        other => Err(UnsupportedArchitecture(other)),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("L targets x86-64, ARM64 and RISC-V64; {0} is not supported")]
pub struct UnsupportedArchitecture(pub Architecture);
