//! Module-wide symbol and rodata bookkeeping (`spec.md` §3.4, §4.13).
//!
//! Function names, synthesized helper names, string-literal rodata blobs,
//! and fixed abort messages all draw from one [`SymbolId`] counter: a
//! [`crate::module::Relocation`] carries a bare `SymbolId` with no name
//! attached, so two independent counters could silently alias the same id
//! to two different meanings. Grounded on `cranelift_codegen::Context`'s
//! single per-compilation `ir::entities::FuncRef`/`GlobalValue` numbering
//! space, generalized here to also cover rodata constants.

use lc_assembler::SymbolId;
use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::module::{CompiledModule, SymbolKind};
use crate::value;

/// One rodata blob pending final placement into [`CompiledModule::rodata`].
struct Blob {
    symbol: SymbolId,
    name: String,
    bytes: Vec<u8>,
}

/// Get-or-insert resolver for every named thing a compiled module can
/// reference by [`SymbolId`]: functions, runtime helpers, interned string
/// literals, and fixed abort/helper messages.
#[derive(Default)]
pub struct GlobalSymbols {
    ids: FxHashMap<String, SymbolId>,
    blobs: Vec<Blob>,
    next: u32,
    next_lambda: u32,
}

impl GlobalSymbols {
    pub fn new() -> Self {
        GlobalSymbols::default()
    }

    fn fresh(&mut self) -> SymbolId {
        let id = SymbolId::from_u32(self.next);
        self.next += 1;
        id
    }

    /// Resolve `name` (a function or runtime-helper name) to a stable
    /// `SymbolId`, minting one on first reference regardless of whether
    /// that name has been defined yet (forward references and mutual
    /// recursion both need this).
    pub fn resolve(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.fresh();
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Intern a string literal's count-prefixed codepoint map (`spec.md`
    /// §3.1 aggregate layout: `count` at offset 0, then `(key, val)` pairs
    /// every 16 bytes, keys being codepoint indices here), deduping
    /// identical literal text to one rodata blob.
    pub fn intern_string(&mut self, content: &Rc<str>) -> SymbolId {
        let key = format!("$str:{content}");
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = self.fresh();
        self.ids.insert(key, id);
        let name = format!("$str{}", id.as_u32());
        self.blobs.push(Blob { symbol: id, name, bytes: encode_codepoint_map(content) });
        id
    }

    /// Intern a fixed helper message (abort text, overflow diagnostics):
    /// raw ASCII bytes consumed by a `write(2)`-shaped syscall with an
    /// explicit length, not the L-visible codepoint-map layout
    /// `intern_string` produces.
    pub fn intern_message(&mut self, key: &str, text: &str) -> (SymbolId, i64) {
        let cache_key = format!("$msg:{key}");
        if let Some(id) = self.ids.get(&cache_key) {
            return (*id, text.len() as i64);
        }
        let id = self.fresh();
        self.ids.insert(cache_key, id);
        let name = format!("$msg{}", id.as_u32());
        self.blobs.push(Blob { symbol: id, name, bytes: text.as_bytes().to_vec() });
        (id, text.len() as i64)
    }

    /// A synthetic name for a lambda body not yet lifted to a top-level
    /// function by any pass (`spec.md` §4.5 Design Notes: "lambda
    /// registration via a growing list iterated by index").
    pub fn fresh_lambda_symbol(&mut self) -> (SymbolId, String) {
        let name = format!("$lambda{}", self.next_lambda);
        self.next_lambda += 1;
        (self.resolve(&name), name)
    }

    /// Write every interned blob's bytes into `module.rodata` and register
    /// its symbol, once code emission and relocation resolution are both
    /// done (`spec.md` §4.12: resolve once at the end).
    pub fn finish_rodata(&self, module: &mut CompiledModule) {
        for blob in &self.blobs {
            let offset = module.rodata.len() as u32;
            module.rodata.extend_from_slice(&blob.bytes);
            module.symbols.insert(blob.name.clone(), (blob.symbol, SymbolKind::RodataConstant, offset));
        }
    }
}

/// Encode a string's count-prefixed codepoint map: `count` (float64) at
/// offset 0, then one `(index, codepoint)` pair per character, each a
/// 16-byte `(key: float64, val: float64)` slot matching the aggregate
/// layout every list/map shares (`spec.md` §3.1).
fn encode_codepoint_map(content: &str) -> Vec<u8> {
    let chars: Vec<char> = content.chars().collect();
    let mut bytes = Vec::with_capacity(8 + chars.len() * 16);
    bytes.extend_from_slice(&value::encode_scalar(chars.len() as f64).to_le_bytes());
    for (i, ch) in chars.iter().enumerate() {
        bytes.extend_from_slice(&value::encode_scalar(i as f64).to_le_bytes());
        bytes.extend_from_slice(&value::encode_scalar(*ch as u32 as f64).to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_the_same_name_twice_returns_the_same_id() {
        let mut globals = GlobalSymbols::new();
        let a = globals.resolve("f");
        let b = globals.resolve("f");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let mut globals = GlobalSymbols::new();
        let a = globals.resolve("f");
        let b = globals.resolve("g");
        assert_ne!(a, b);
    }

    #[test]
    fn identical_string_literals_share_one_rodata_blob() {
        let mut globals = GlobalSymbols::new();
        let a = globals.intern_string(&Rc::from("hi"));
        let b = globals.intern_string(&Rc::from("hi"));
        assert_eq!(a, b);
        let mut module = CompiledModule::default();
        globals.finish_rodata(&mut module);
        assert_eq!(module.rodata.len(), 8 + 2 * 16);
    }

    #[test]
    fn function_names_and_string_literals_never_collide_on_id() {
        let mut globals = GlobalSymbols::new();
        let f = globals.resolve("main");
        let s = globals.intern_string(&Rc::from("x"));
        assert_ne!(f, s);
    }

    #[test]
    fn lambda_symbols_are_numbered_in_allocation_order() {
        let mut globals = GlobalSymbols::new();
        let (_, first) = globals.fresh_lambda_symbol();
        let (_, second) = globals.fresh_lambda_symbol();
        assert_eq!(first, "$lambda0");
        assert_eq!(second, "$lambda1");
    }
}
