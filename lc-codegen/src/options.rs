//! Compile-time configuration (`SPEC_FULL.md` §1.1).
//!
//! This crate is a library, not a CLI; configuration is a plain struct its
//! host builds and passes in, the way `cranelift_codegen::settings::Flags`
//! is constructed by `wasmtime`'s embedding API rather than read from a
//! file by the codegen crate itself.

use target_lexicon::Triple;

/// Which architecture family a compile targets. Mirrors the three
/// [`lc_assembler::Assembler`] implementations one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArch {
    X86_64,
    Aarch64,
    Riscv64,
}

/// How aggressively the parallel-loop and auto-vectorization passes may
/// transform a loop (`spec.md` §4.6, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// Emit scalar code only; skip the vectorizer and never spawn worker
    /// threads for `parallel for`, executing it as an ordinary loop.
    None,
    /// Default: vectorize eligible loops when the target's feature probe
    /// allows it, honor explicit `parallel for` thread counts.
    Speed,
}

/// Host-supplied compile configuration (`SPEC_FULL.md` §1.1).
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target: Triple,
    pub opt_level: OptLevel,
    /// Worker thread count used by a `parallel for` loop that doesn't
    /// specify one explicitly (`spec.md` §4.7). Defaults to the number of
    /// logical CPUs the host reports at compile time, matching the
    /// original's runtime-queried default.
    pub default_parallel_threads: u32,
    /// Maximum number of errors collected before a compile gives up
    /// entirely (distinct from [`crate::diagnostics::ErrorCollector`]'s
    /// ten-error display cap — this bounds work, that bounds output).
    pub max_errors: usize,
}

impl CompileOptions {
    pub fn host() -> Self {
        CompileOptions {
            target: Triple::host(),
            opt_level: OptLevel::Speed,
            default_parallel_threads: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
            max_errors: 10,
        }
    }

    pub fn target_arch(&self) -> Result<TargetArch, UnsupportedTarget> {
        use target_lexicon::Architecture;
        match self.target.architecture {
            Architecture::X86_64 => Ok(TargetArch::X86_64),
            Architecture::Aarch64(_) => Ok(TargetArch::Aarch64),
            Architecture::Riscv64(_) => Ok(TargetArch::Riscv64),
            other => Err(UnsupportedTarget(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("L has no code generator for architecture {0:?}")]
pub struct UnsupportedTarget(target_lexicon::Architecture);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_options_resolve_a_supported_target_arch_on_common_ci_hosts() {
        let opts = CompileOptions::host();
        // Not an assertion about *which* arch — only that a triple the
        // test runner itself is built for round-trips cleanly for the
        // three architectures this compiler supports.
        if matches!(
            opts.target.architecture,
            target_lexicon::Architecture::X86_64
                | target_lexicon::Architecture::Aarch64(_)
                | target_lexicon::Architecture::Riscv64(_)
        ) {
            assert!(opts.target_arch().is_ok());
        }
    }

    #[test]
    fn default_parallel_threads_is_at_least_one() {
        assert!(CompileOptions::host().default_parallel_threads >= 1);
    }
}
