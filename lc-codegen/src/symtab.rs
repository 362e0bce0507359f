//! Compile-time symbol tables (`spec.md` §3.2, §4.1, Design Notes §9).
//!
//! The original tracked `variables`/`mutableVars`/`movedVars`/`varTypes`
//! as a fresh copy per scope; the Open Question in `spec.md` §9 resolves
//! that for this port to a persistent scope chain instead (parent
//! pointer per scope, lookup walks outward) so entering a deeply nested
//! block doesn't clone an ever-growing map. Grounded on the scope-chain
//! shape of `cranelift_frontend::ssa`'s variable/block bookkeeping, with
//! `rustc_hash::FxHashMap` in place of `cranelift`'s `SecondaryMap` since
//! names here are `Rc<str>` rather than dense entity keys.

use lc_ast::SemaType;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Binding state for one variable, tracked per scope (`spec.md` §4.1:
/// `:=` defines, `<-` requires a prior mutable definition, `=` reassigns
/// an alias and moves the old one out).
#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: SemaType,
    pub mutable: bool,
    pub moved: bool,
    /// Stack offset from the frame pointer (negative, growing down) this
    /// binding's value lives at, or the sentinel `GLOBAL_SLOT` for a
    /// module-scope (`top_level`) definition (`spec.md` §3.4 "variables:
    /// name -> stack offset ... or sentinel meaning global in .data").
    pub offset: i32,
}

/// Sentinel `Binding::offset` meaning "global in .data" rather than a
/// stack slot (`spec.md` §3.4).
pub const GLOBAL_SLOT: i32 = -1;

/// One lexical scope in the chain. `root()` has no parent; every
/// function body, loop body, lambda body and arena block pushes a new
/// scope that is popped at its end.
#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<Rc<str>, Binding>,
}

/// A chain of scopes, innermost last, supporting shadowing lookups that
/// walk outward to the root.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    /// Functions seen so far this compile, for forward-reference
    /// resolution and the `usedFunctions`/call-order bookkeeping `spec.md`
    /// §4.9 needs to topologically emit mutually-recursive helpers.
    pub function_signatures: FxHashMap<Rc<str>, FunctionSignature>,
    /// Names referenced by a call expression, in first-use order, so the
    /// compiler can detect and special-case self-recursion for tail calls
    /// (`spec.md` §4.5) without a second pass.
    pub call_order: Vec<Rc<str>>,
}

#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub param_count: usize,
    pub is_variadic: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::default()],
            function_signatures: FxHashMap::default(),
            call_order: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the root scope");
        self.scopes.pop();
    }

    pub fn define(&mut self, name: Rc<str>, ty: SemaType, mutable: bool, offset: i32) {
        self.scopes
            .last_mut()
            .expect("root scope always present")
            .bindings
            .insert(name, Binding { ty, mutable, moved: false, offset });
    }

    /// Look up a name, walking from the innermost scope outward
    /// (shadowing).
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.bindings.get(name))
    }

    /// Mark a name moved-from in the scope that actually owns it, per the
    /// `move` expression semantics in `spec.md` §4.1.
    pub fn mark_moved(&mut self, name: &str) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.bindings.get_mut(name) {
                binding.moved = true;
                return true;
            }
        }
        false
    }

    pub fn record_call(&mut self, callee: Rc<str>) {
        if !self.call_order.contains(&callee) {
            self.call_order.push(callee);
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_outer_binding() {
        let mut table = SymbolTable::new();
        table.define(Rc::from("x"), SemaType::Number, false, -8);
        table.push_scope();
        table.define(Rc::from("x"), SemaType::StringT, true, -16);
        assert_eq!(table.lookup("x").unwrap().ty, SemaType::StringT);
        table.pop_scope();
        assert_eq!(table.lookup("x").unwrap().ty, SemaType::Number);
    }

    #[test]
    fn popping_the_inner_scope_restores_outer_visibility() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.define(Rc::from("y"), SemaType::Number, false, -8);
        assert!(table.lookup("y").is_some());
        table.pop_scope();
        assert!(table.lookup("y").is_none());
    }

    #[test]
    fn move_marks_the_owning_scopes_binding() {
        let mut table = SymbolTable::new();
        table.define(Rc::from("z"), SemaType::ListT, true, -8);
        assert!(table.mark_moved("z"));
        assert!(table.lookup("z").unwrap().moved);
    }

    #[test]
    fn call_order_records_first_use_and_deduplicates() {
        let mut table = SymbolTable::new();
        table.record_call(Rc::from("helper"));
        table.record_call(Rc::from("other"));
        table.record_call(Rc::from("helper"));
        assert_eq!(table.call_order.len(), 2);
        assert_eq!(&*table.call_order[0], "helper");
    }
}
