//! Compiled module container (`SPEC_FULL.md` §4.13).
//!
//! This is the hand-off point to whatever turns raw bytes into a loadable
//! object: an ELF/PE/Mach-O writer is explicitly out of scope here, the
//! same way `cranelift_codegen::Context::compile` returns a
//! `CompiledCode` and leaves object-file emission to `cranelift-object`/
//! `cranelift-faerie` as a separate crate.

use lc_assembler::{Addend, CodeOffset, PatchSite, RelocKind, SymbolId};
use rustc_hash::FxHashMap;
use std::collections::HashMap;

/// One resolved relocation: a patch site whose target offset is now
/// known, ready for an object writer to apply.
#[derive(Debug, Clone)]
pub struct Relocation {
    pub position: CodeOffset,
    pub kind: RelocKind,
    pub symbol: SymbolId,
    pub addend: Addend,
}

/// The output of a successful compile: machine code plus everything an
/// external object writer needs to place and link it (`spec.md` §4.13).
#[derive(Debug, Default)]
pub struct CompiledModule {
    pub code: Vec<u8>,
    pub rodata: Vec<u8>,
    pub data: Vec<u8>,
    pub relocations: Vec<Relocation>,
    /// Defined symbol name -> offset into `code` (functions) or `rodata`/
    /// `data` (string/float constants), disambiguated by `SymbolKind`.
    pub symbols: FxHashMap<String, (SymbolId, SymbolKind, CodeOffset)>,
    /// Symbols referenced but not defined in this module: libc and the
    /// FFI targets named by `extern` declarations (`spec.md` §4.9).
    pub dynamic_symbols: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    RodataConstant,
    DataConstant,
}

impl CompiledModule {
    /// Resolve every recorded [`PatchSite`] in `buffer` against `symbols`
    /// and `labels`, turning compile-time bookkeeping into the finished
    /// [`Relocation`] list (`spec.md` §4.12: "never mutate bytes in
    /// place; resolve once at the end").
    pub fn finish(
        mut code: Vec<u8>,
        patches: Vec<PatchSite>,
        labels: &HashMap<lc_assembler::Label, CodeOffset>,
    ) -> (Vec<u8>, Vec<Relocation>) {
        let mut relocations = Vec::with_capacity(patches.len());
        for patch in patches {
            match patch.target {
                lc_assembler::PatchTarget::Symbol(symbol) => {
                    relocations.push(Relocation {
                        position: patch.position,
                        kind: patch.kind,
                        symbol,
                        addend: patch.addend,
                    });
                }
                lc_assembler::PatchTarget::Label(label) => {
                    // Intra-function labels resolve to a PC-relative
                    // displacement immediately; they never reach the
                    // external relocation list.
                    let target_offset = labels
                        .get(&label)
                        .copied()
                        .unwrap_or_else(|| panic!("unbound label {label:?} at finish()"));
                    patch_pc_relative(&mut code, &patch, target_offset);
                }
            }
        }
        (code, relocations)
    }
}

fn patch_pc_relative(code: &mut Vec<u8>, patch: &PatchSite, target_offset: CodeOffset) {
    let site_end = patch.position + relocation_width(patch.kind);
    let disp = target_offset as i64 - site_end as i64 + patch.addend;
    match patch.kind {
        RelocKind::Rel8 => {
            let byte = disp as i8;
            code[patch.position as usize] = byte as u8;
        }
        RelocKind::Rel32 => {
            let bytes = (disp as i32).to_le_bytes();
            code[patch.position as usize..patch.position as usize + 4].copy_from_slice(&bytes);
        }
        RelocKind::Abs64 | RelocKind::GotPcRel32 => {
            // These only ever target external symbols in practice, but
            // keep the match exhaustive for labels that somehow carry
            // one.
        }
    }
}

fn relocation_width(kind: RelocKind) -> u32 {
    match kind {
        RelocKind::Rel8 => 1,
        RelocKind::Rel32 | RelocKind::GotPcRel32 => 4,
        RelocKind::Abs64 => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_patches_become_relocations_one_to_one() {
        let patches = vec![PatchSite {
            position: 4,
            kind: RelocKind::Rel32,
            target: lc_assembler::PatchTarget::Symbol(SymbolId::from_u32(0)),
            addend: -4,
        }];
        let labels = HashMap::new();
        let (code, relocs) = CompiledModule::finish(vec![0; 8], patches, &labels);
        assert_eq!(code.len(), 8);
        assert_eq!(relocs.len(), 1);
        assert_eq!(relocs[0].position, 4);
    }
}
