//! Shared label allocator (`spec.md` §4.4, §4.13).
//!
//! `Compiler::compile_program` emits every function and helper into one
//! [`lc_assembler::CodeBuffer`], so a [`lc_assembler::Label`] bound inside
//! one function's `or!` and a label bound inside another function's loop
//! share the same binding namespace. A single counter threaded through the
//! statement, expression, and loop compilers for the duration of one
//! `compile_program` call is what keeps every id unique across the whole
//! module, the same role `cranelift_codegen::Context`'s per-compilation
//! `ir::Block` numbering plays relative to a single function.

#[derive(Default)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        LabelAllocator::default()
    }

    pub fn fresh(&mut self) -> lc_assembler::Label {
        let label = lc_assembler::Label::new(self.next);
        self.next += 1;
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_labels_are_distinct() {
        let mut labels = LabelAllocator::new();
        let a = labels.fresh();
        let b = labels.fresh();
        assert_ne!(a, b);
    }
}
