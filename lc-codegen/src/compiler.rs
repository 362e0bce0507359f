//! Top-level compiler entry point (`spec.md` §2, §4.13).
//!
//! Mirrors the `cranelift_codegen::Context`/`wasmtime_jit::CompilationArtifacts`
//! split: one [`Compiler`] is built once per target, then
//! [`Compiler::compile_program`] is called once per translation unit,
//! returning a [`CompiledModule`] an external object writer or in-process
//! loader consumes.

use lc_ast::Program;
use lc_assembler::{assembler_for, Assembler, CodeBuffer, FeatureFlagSymbols, Reg, SymbolId};

use crate::arena::ArenaScopes;
use crate::collect::{self, RuntimeFeatures};
use crate::cpu_probe;
use crate::diagnostics::{ErrorCollector, Report};
use crate::ffi::{self, CallConv};
use crate::globals::GlobalSymbols;
use crate::helpers;
use crate::labels::LabelAllocator;
use crate::module::{CompiledModule, SymbolKind};
use crate::options::CompileOptions;
use crate::stmt::StmtCompiler;
use crate::symtab::SymbolTable;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    UnsupportedTarget(#[from] crate::options::UnsupportedTarget),
    #[error(transparent)]
    UnsupportedArchitecture(#[from] lc_assembler::UnsupportedArchitecture),
    #[error("compilation failed with {0} error(s)")]
    DiagnosticsFailed(usize),
}

/// A configured code generator for one target. Construction resolves the
/// target triple to a concrete [`Assembler`] impl once; every subsequent
/// `compile_program` call reuses it (`spec.md` §4.11: one assembler impl
/// chosen at compiler-construction time, not per function).
pub struct Compiler {
    options: CompileOptions,
    assembler: Box<dyn Assembler>,
    globals: GlobalSymbols,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Result<Self, CompileError> {
        let assembler = assembler_for(&options.target)?;
        Ok(Compiler { options, assembler, globals: GlobalSymbols::new() })
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<CompiledModule, CompileError> {
        let collected = collect::collect(program);
        log::debug!(
            "collected program: {} used functions, features={:?}",
            collected.used_functions.len(),
            collected.features
        );

        let mut errors = ErrorCollector::new();
        let mut module = CompiledModule::default();
        let mut buf = CodeBuffer::new();
        // One label namespace for the entire module: every function and
        // helper below is emitted into the same `buf`, so their labels must
        // never collide (`crate::labels`).
        let mut labels = LabelAllocator::new();

        self.emit_startup(&mut buf, collected.features);

        for function in &program.functions {
            self.compile_function(&mut buf, &mut module, function, &mut errors, &mut labels);
            if errors.error_count() >= self.options.max_errors {
                break;
            }
        }

        let required = helpers::required_helpers(collected.features);
        log::debug!("emitting {} runtime helper(s): {:?}", required.len(), required);
        for name in &required {
            self.emit_helper_stub(&mut buf, &mut module, name, &mut labels);
        }

        self.globals.finish_rodata(&mut module);

        if errors.has_errors() {
            return Err(CompileError::DiagnosticsFailed(errors.error_count()));
        }

        let (code, patches, labels) = buf.into_parts();
        let (code, relocations) = CompiledModule::finish(code, patches, &labels);
        module.code = code;
        module.relocations = relocations;
        Ok(module)
    }

    fn emit_startup(&mut self, buf: &mut CodeBuffer, features: RuntimeFeatures) {
        if features.uses_vectorization {
            let flags = FeatureFlagSymbols {
                has_fma: SymbolId::from_u32(100),
                has_avx2: SymbolId::from_u32(101),
                has_popcnt: SymbolId::from_u32(102),
                has_avx512f: SymbolId::from_u32(103),
            };
            let arch = self.options.target_arch().expect("resolved at construction");
            cpu_probe::emit_startup_probe(self.assembler.as_mut(), buf, arch, &flags);
        }
    }

    fn compile_function(
        &mut self,
        buf: &mut CodeBuffer,
        module: &mut CompiledModule,
        function: &lc_ast::Function,
        errors: &mut ErrorCollector,
        labels: &mut LabelAllocator,
    ) {
        let offset = buf.offset();
        let symbol = self.globals.resolve(&function.name);
        module
            .symbols
            .insert(function.name.to_string(), (symbol, SymbolKind::Function, offset));

        let mut symbols = SymbolTable::new();
        self.assembler.prologue(buf, 0);
        // Each parameter arrives in its calling-convention register and is
        // spilled to its own stack slot immediately, the same
        // spill-on-entry shape every loop/lambda-body local gets (`spec.md`
        // §3.2 "variables: name -> stack offset").
        let arg_regs = ffi::integer_arg_registers(CallConv::SystemV);
        for (i, param) in function.params.iter().enumerate() {
            let offset = -8 * (i as i32 + 1);
            if let Some(reg) = arg_regs.get(i) {
                self.assembler.store_float(buf, Reg::Gpr(29), offset, *reg);
            }
            symbols.define(param.name.clone(), lc_ast::SemaType::Unknown, false, offset);
        }
        let mut arenas = ArenaScopes::new();
        {
            let mut stmt_compiler =
                StmtCompiler::new(self.assembler.as_mut(), &mut symbols, &mut self.globals, &mut arenas, labels);
            stmt_compiler.compile_block(buf, &function.body);
        }
        self.assembler.epilogue(buf);
        self.assembler.ret(buf);

        if function.params.len() > 32 {
            errors.push(Report::error(
                format!("function {:?} has more parameters than any supported calling convention", function.name),
                function.span,
            ));
        }
    }

    fn emit_helper_stub(&mut self, buf: &mut CodeBuffer, module: &mut CompiledModule, name: &str, labels: &mut LabelAllocator) {
        let offset = buf.offset();
        let symbol = self.globals.resolve(name);
        module.symbols.insert(name.to_string(), (symbol, SymbolKind::Function, offset));

        let arg_regs = ffi::integer_arg_registers(CallConv::SystemV);
        let assembler = self.assembler.as_mut();
        match name {
            helpers::ABORT_NULL_DEREF => {
                let (sym, len) = self.globals.intern_message("null_deref", "null pointer dereference\n");
                helpers::emit_abort(assembler, buf, sym, len);
            }
            helpers::ABORT_OUT_OF_BOUNDS => {
                let (sym, len) = self.globals.intern_message("out_of_bounds", "index out of bounds\n");
                helpers::emit_abort(assembler, buf, sym, len);
            }
            helpers::ABORT_ALLOC_FAILURE => {
                let (sym, len) = self.globals.intern_message("alloc_failure", "arena allocation failure\n");
                helpers::emit_abort(assembler, buf, sym, len);
            }
            helpers::ARENA_ENSURE_CAPACITY => {
                let abort = self.globals.resolve(helpers::ABORT_ALLOC_FAILURE);
                helpers::emit_arena_ensure_capacity(assembler, buf, &arg_regs[..2], abort, labels);
            }
            helpers::ARENA_ALLOC => {
                let ensure = self.globals.resolve(helpers::ARENA_ENSURE_CAPACITY);
                helpers::emit_arena_alloc(assembler, buf, &arg_regs[..3], Reg::Gpr(11), ensure);
            }
            helpers::ARENA_RESET => {
                helpers::emit_arena_reset(assembler, buf, &arg_regs[..1]);
            }
            helpers::STRING_CONCAT => {
                let arena_alloc = self.globals.resolve(helpers::ARENA_ALLOC);
                helpers::emit_string_concat(assembler, buf, &arg_regs[..2], arena_alloc);
            }
            helpers::STRING_TO_CSTR => {
                let arena_alloc = self.globals.resolve(helpers::ARENA_ALLOC);
                helpers::emit_string_to_cstr(assembler, buf, &arg_regs[..1], arena_alloc);
            }
            helpers::ITOA => {
                let arena_alloc = self.globals.resolve(helpers::ARENA_ALLOC);
                helpers::emit_itoa(assembler, buf, &arg_regs[..1], arena_alloc);
            }
            helpers::LIST_CONCAT => {
                let arena_alloc = self.globals.resolve(helpers::ARENA_ALLOC);
                helpers::emit_list_concat(assembler, buf, &arg_regs[..2], arena_alloc);
            }
            helpers::LIST_UPDATE => {
                let abort = self.globals.resolve(helpers::ABORT_OUT_OF_BOUNDS);
                helpers::emit_list_update(assembler, buf, &arg_regs[..3], abort, labels);
            }
            helpers::PRINT_SYSCALL => {
                helpers::emit_print_syscall(assembler, buf, &arg_regs[..1]);
            }
            helpers::CACHE_LOOKUP => {
                helpers::emit_cache_lookup(assembler, buf, &arg_regs[..1]);
            }
            helpers::CACHE_INSERT => {
                helpers::emit_cache_insert(assembler, buf, &arg_regs[..2]);
            }
            other => {
                log::warn!("no dedicated body for runtime helper {other:?}, emitting an empty stub");
                assembler.prologue(buf, 0);
                assembler.epilogue(buf);
                assembler.ret(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_ast::{Function, Span};
    use std::rc::Rc;

    fn host_compiler() -> Compiler {
        Compiler::new(CompileOptions::host()).expect("host target is always supported")
    }

    #[test]
    fn empty_program_compiles_to_a_module_with_only_the_fixed_helpers() {
        let mut compiler = host_compiler();
        let program = Program::default();
        let module = compiler.compile_program(&program).unwrap();
        assert!(module.symbols.contains_key(helpers::ABORT_NULL_DEREF));
        assert!(!module.symbols.contains_key(helpers::ARENA_ALLOC));
    }

    #[test]
    fn program_with_arena_block_pulls_in_arena_helpers() {
        let mut compiler = host_compiler();
        let program = Program {
            functions: vec![Function {
                name: Rc::from("main"),
                params: vec![],
                body: vec![lc_ast::Stmt::ArenaBlock { body: vec![], span: Span::UNKNOWN }],
                span: Span::UNKNOWN,
            }],
            top_level: vec![],
        };
        let module = compiler.compile_program(&program).unwrap();
        assert!(module.symbols.contains_key(helpers::ARENA_ALLOC));
        assert!(module.symbols.contains_key("main"));
    }

    #[test]
    fn functions_past_the_calling_convention_register_count_are_reported_but_collected() {
        let mut compiler = host_compiler();
        let params = (0..40)
            .map(|i| lc_ast::LambdaParam { name: Rc::from(format!("p{i}")), is_variadic: false })
            .collect();
        let program = Program {
            functions: vec![Function { name: Rc::from("many_args"), params, body: vec![], span: Span::UNKNOWN }],
            top_level: vec![],
        };
        let result = compiler.compile_program(&program);
        assert!(matches!(result, Err(CompileError::DiagnosticsFailed(1))));
    }
}
