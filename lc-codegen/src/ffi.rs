//! FFI call-site marshalling (`spec.md` §4.9, Design Notes: "the marshaller
//! needs to know the target's calling convention, not just its
//! architecture").
//!
//! Grounded on `cranelift_codegen::isa::CallConv` (the enum distinguishing
//! SystemV/WindowsFastcall/AppleAarch64 on otherwise identical
//! architectures) and on the argument-classification shape of
//! `wasmtime`'s native call trampolines in `wasmtime-jit`.

use crate::options::TargetArch;
use lc_ast::SemaType;
use lc_assembler::Reg;
use target_lexicon::{OperatingSystem, Triple};

/// The calling convention a call site must honor, independent of
/// architecture (`spec.md` §4.9: "SystemV on every Unix-like target, the
/// Microsoft x64 convention on Windows, both sharing AAPCS64/RVG once off
/// x86-64").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    SystemV,
    WindowsX64,
    Aapcs64,
    Rvg,
}

pub fn call_conv_for(target: &Triple, arch: TargetArch) -> CallConv {
    match arch {
        TargetArch::X86_64 => {
            if target.operating_system == OperatingSystem::Windows {
                CallConv::WindowsX64
            } else {
                CallConv::SystemV
            }
        }
        TargetArch::Aarch64 => CallConv::Aapcs64,
        TargetArch::Riscv64 => CallConv::Rvg,
    }
}

/// Integer/pointer argument registers for `conv`, in call order. L only
/// ever passes NaN-boxed 64-bit words (`spec.md` §3.1), so there is a
/// single register class to allocate from, unlike a general-purpose ABI
/// that splits integer and float argument counters.
pub fn integer_arg_registers(conv: CallConv) -> &'static [Reg] {
    match conv {
        // RDI, RSI, RDX, RCX, R8, R9
        CallConv::SystemV => &[Reg::Gpr(7), Reg::Gpr(6), Reg::Gpr(2), Reg::Gpr(1), Reg::Gpr(8), Reg::Gpr(9)],
        // RCX, RDX, R8, R9 plus a 32-byte shadow space the caller reserves
        CallConv::WindowsX64 => &[Reg::Gpr(1), Reg::Gpr(2), Reg::Gpr(8), Reg::Gpr(9)],
        // X0-X7
        CallConv::Aapcs64 => &[
            Reg::Gpr(0), Reg::Gpr(1), Reg::Gpr(2), Reg::Gpr(3),
            Reg::Gpr(4), Reg::Gpr(5), Reg::Gpr(6), Reg::Gpr(7),
        ],
        // a0-a7
        CallConv::Rvg => &[
            Reg::Gpr(10), Reg::Gpr(11), Reg::Gpr(12), Reg::Gpr(13),
            Reg::Gpr(14), Reg::Gpr(15), Reg::Gpr(16), Reg::Gpr(17),
        ],
    }
}

/// Stack shadow space a Windows x64 call site must reserve before the
/// call, in bytes; zero on every other convention.
pub fn shadow_space_bytes(conv: CallConv) -> i32 {
    match conv {
        CallConv::WindowsX64 => 32,
        _ => 0,
    }
}

/// How a single FFI argument's L value must be converted before it's
/// placed in an argument register, per its declared C-facing type
/// (`spec.md` §4.9 per-argument cast annotations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMarshal {
    /// Pass the NaN-boxed word unchanged (already a pointer bit pattern).
    PassPointer,
    /// Unbox to a plain `f64` register value.
    PassDouble,
    /// Truncate the unboxed double to a 32/64-bit integer register value.
    PassInt,
    /// Materialize a NUL-terminated byte buffer from an L string and pass
    /// its address.
    PassCString,
}

pub fn marshal_for(ty: SemaType) -> ArgMarshal {
    match ty {
        SemaType::Number => ArgMarshal::PassDouble,
        SemaType::CString => ArgMarshal::PassCString,
        SemaType::CPointer | SemaType::ListT | SemaType::MapT | SemaType::StringT => {
            ArgMarshal::PassPointer
        }
        SemaType::Unknown => ArgMarshal::PassInt,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConventionError {
    TooManyRegisterArgs,
}

/// Assign argument positions to registers, erroring once an FFI call
/// exceeds the convention's register-argument count (`spec.md` §4.10
/// safety checks: stack-passed arguments are explicitly out of scope,
/// Non-goal).
pub fn assign_registers(conv: CallConv, arg_count: usize) -> Result<&'static [Reg], CallingConventionError> {
    let regs = integer_arg_registers(conv);
    if arg_count > regs.len() {
        return Err(CallingConventionError::TooManyRegisterArgs);
    }
    Ok(&regs[..arg_count])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_v_is_chosen_on_linux_x86_64() {
        let target: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        assert_eq!(call_conv_for(&target, TargetArch::X86_64), CallConv::SystemV);
    }

    #[test]
    fn windows_x64_is_chosen_on_windows_x86_64() {
        let target: Triple = "x86_64-pc-windows-msvc".parse().unwrap();
        assert_eq!(call_conv_for(&target, TargetArch::X86_64), CallConv::WindowsX64);
    }

    #[test]
    fn aarch64_always_uses_aapcs64_regardless_of_os() {
        let target: Triple = "aarch64-unknown-linux-gnu".parse().unwrap();
        assert_eq!(call_conv_for(&target, TargetArch::Aarch64), CallConv::Aapcs64);
    }

    #[test]
    fn windows_x64_reserves_shadow_space_but_system_v_does_not() {
        assert_eq!(shadow_space_bytes(CallConv::WindowsX64), 32);
        assert_eq!(shadow_space_bytes(CallConv::SystemV), 0);
    }

    #[test]
    fn too_many_arguments_is_rejected_rather_than_spilled_to_stack() {
        let conv = CallConv::WindowsX64;
        assert!(assign_registers(conv, 4).is_ok());
        assert_eq!(
            assign_registers(conv, 5),
            Err(CallingConventionError::TooManyRegisterArgs)
        );
    }
}
