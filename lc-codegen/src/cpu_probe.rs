//! CPU feature probing (`spec.md` §4.6, §4.11 `FeatureFlagSymbols`).
//!
//! On x86-64, vectorizable loops and the FMA-using scalar float path
//! branch at run time on a CPUID-derived flag computed once at program
//! startup and cached in a data-section byte, the pattern
//! `cranelift_codegen::isa::x64`'s own runtime CPUID detection (behind the
//! `std` feature) uses for its settings probe. ARM64 and RISC-V64 have no
//! equivalent user-mode instruction, so their "probe" is a compile-time
//! constant baked in by [`lc_assembler::Assembler::emit_feature_probe`]
//! rather than a runtime branch.

use crate::options::TargetArch;
use lc_assembler::{Assembler, CodeBuffer, FeatureFlagSymbols};

/// Emit the startup feature-probe sequence for `arch`, writing the
/// resulting flag bytes through `symbols`' data slots.
///
/// Returns nothing: the probe's job is entirely side-effecting (writing
/// into the data section at the addresses `symbols` names), matching the
/// fact that nothing downstream needs a return value, only the flags in
/// memory once the probe has run.
pub fn emit_startup_probe(
    assembler: &mut dyn Assembler,
    buf: &mut CodeBuffer,
    arch: TargetArch,
    symbols: &FeatureFlagSymbols,
) {
    match arch {
        TargetArch::X86_64 => assembler.emit_feature_probe(buf, symbols),
        // Constant-folded by the assembler itself; still routed through
        // the same call so callers don't need an arch match of their own.
        TargetArch::Aarch64 | TargetArch::Riscv64 => assembler.emit_feature_probe(buf, symbols),
    }
}

/// Whether the auto-vectorizer may consider a given lane width on `arch`
/// without a runtime probe at all, i.e. architectures where the ISA
/// guarantees the extension unconditionally (`spec.md` §4.6: ARM64 NEON
/// and the RVG profile's base vector ops are always present, unlike
/// x86-64's AVX2/AVX-512 which vary by part).
pub fn vectorization_always_available(arch: TargetArch) -> bool {
    matches!(arch, TargetArch::Aarch64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neon_is_unconditionally_available_but_avx_is_not() {
        assert!(vectorization_always_available(TargetArch::Aarch64));
        assert!(!vectorization_always_available(TargetArch::X86_64));
    }
}
