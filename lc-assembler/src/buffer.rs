use crate::{Label, SymbolId};
use std::collections::HashMap;

/// Offset in bytes from the start of the code section.
///
/// `u32`, not `usize`: the compiler can in principle cross-compile, so the
/// offset type must not depend on the host pointer width (mirrors
/// `cranelift_codegen::binemit::CodeOffset`).
pub type CodeOffset = u32;

/// Addend applied to a relocation's target address.
pub type Addend = i64;

/// The kind of fixup a [`PatchSite`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// A signed 8-bit PC-relative displacement (short jump).
    Rel8,
    /// A signed 32-bit PC-relative displacement (near jump/call, or a
    /// RIP-relative load of a rodata/data symbol on x86-64).
    Rel32,
    /// A full 64-bit absolute address, written at `position`.
    Abs64,
    /// A PC-relative load through the global offset table / PLT stub,
    /// for a dynamically linked FFI symbol.
    GotPcRel32,
}

/// A single not-yet-resolved fixup recorded during emission.
///
/// `spec.md` §9 Design Note: "Define a `PatchSite { position, kind
/// (rel8|rel32|abs64), target }` record; collect during emission; resolve
/// in a single final pass." Labels are resolved the same way as named
/// symbols: a forward jump records a `PatchSite` against a placeholder
/// target that is filled in once the label is bound.
#[derive(Debug, Clone, Copy)]
pub struct PatchSite {
    pub position: CodeOffset,
    pub kind: RelocKind,
    pub target: PatchTarget,
    pub addend: Addend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    Symbol(SymbolId),
    Label(Label),
}

/// A growing buffer of emitted machine code plus its pending fixups.
///
/// Grounded on `cranelift_codegen::binemit::MemoryCodeSink`: a `CodeSink`
/// that owns its bytes and only records relocations, never resolves them
/// inline.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    patches: Vec<PatchSite>,
    labels: HashMap<Label, CodeOffset>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> CodeOffset {
        self.bytes.len() as CodeOffset
    }

    pub fn put1(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn put4(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put8(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Record a fixup site; `position` is almost always
    /// `self.offset() - N` for the `N`-byte field just appended.
    pub fn add_patch(&mut self, position: CodeOffset, kind: RelocKind, target: PatchTarget, addend: Addend) {
        self.patches.push(PatchSite {
            position,
            kind,
            target,
            addend,
        });
    }

    /// Bind `label` to the current offset. Panics on rebinding the same
    /// label twice, which would indicate a miscompiled loop/branch nest.
    pub fn bind_label(&mut self, label: Label) {
        let offset = self.offset();
        let prior = self.labels.insert(label, offset);
        debug_assert!(prior.is_none(), "label {label:?} bound twice");
    }

    pub fn label_offset(&self, label: Label) -> Option<CodeOffset> {
        self.labels.get(&label).copied()
    }

    pub fn patches(&self) -> &[PatchSite] {
        &self.patches
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<PatchSite>, HashMap<Label, CodeOffset>) {
        (self.bytes, self.patches, self.labels)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_sites_do_not_mutate_bytes_at_record_time() {
        let mut buf = CodeBuffer::new();
        buf.put1(0xe8); // call opcode
        let pos = buf.offset();
        buf.put4(0); // placeholder displacement
        buf.add_patch(pos, RelocKind::Rel32, PatchTarget::Label(Label::new(0)), 0);
        assert_eq!(buf.bytes(), &[0xe8, 0, 0, 0, 0]);
        assert_eq!(buf.patches().len(), 1);
    }

    #[test]
    fn label_binds_to_current_offset() {
        let mut buf = CodeBuffer::new();
        buf.put1(0x90);
        buf.bind_label(Label::new(3));
        assert_eq!(buf.label_offset(Label::new(3)), Some(1));
    }
}
