//! Loop engine (`spec.md` §4.4).
//!
//! Every loop form compiles to a label pair (`top`, `exit`) the way a
//! hand-written assembly loop would, rather than `cranelift`'s structured
//! `Block` CFG — there is no block-sealing or phi insertion here, just
//! jumps. `break`/`continue`/`ret @N` resolve against a stack of active
//! loop label pairs tracked for the duration of the body's compilation.

use std::rc::Rc;

use lc_assembler::{CodeBuffer, Cond, Label, Reg};

use crate::expr::{ExprCompiler, RESULT};
use crate::stmt::StmtCompiler;
use lc_ast::{Loop, RangeBound};

/// One entry in the active-loop stack, keyed by the loop's source label
/// (`spec.md` §4.4 `@N`) so `break @N`/`continue @N` can target an
/// enclosing loop rather than only the innermost one.
struct ActiveLoop {
    source_label: lc_ast::LoopLabel,
    continue_target: Label,
    break_target: Label,
}

/// Per-function loop-label bookkeeping; lives alongside
/// [`StmtCompiler`] for the duration of one function body.
#[derive(Default)]
pub struct LoopStack {
    active: Vec<ActiveLoop>,
    /// Used only by this struct's own unit tests below, which exercise
    /// `push`/`resolve_*` without a full [`StmtCompiler`] to draw labels
    /// from; production code always allocates loop labels through
    /// [`crate::labels::LabelAllocator`] (via `StmtCompiler::fresh_label`)
    /// so they share the whole module's label namespace.
    #[cfg(test)]
    next_label_id: u32,
}

impl LoopStack {
    #[cfg(test)]
    fn fresh_label(&mut self) -> Label {
        let label = Label::new(self.next_label_id);
        self.next_label_id += 1;
        label
    }

    fn push(&mut self, source_label: lc_ast::LoopLabel, continue_target: Label, break_target: Label) {
        self.active.push(ActiveLoop { source_label, continue_target, break_target });
    }

    fn pop(&mut self) {
        self.active.pop();
    }

    pub fn resolve_break(&self, label: lc_ast::LoopLabel) -> Label {
        self.find(label).break_target
    }

    pub fn resolve_continue(&self, label: lc_ast::LoopLabel) -> Label {
        self.find(label).continue_target
    }

    fn find(&self, label: lc_ast::LoopLabel) -> &ActiveLoop {
        if label == 0 {
            self.active.last().expect("break/continue with no enclosing loop")
        } else {
            self.active
                .iter()
                .rev()
                .find(|l| l.source_label == label)
                .unwrap_or_else(|| panic!("no enclosing loop labeled @{label}"))
        }
    }
}

/// Run `expr` through a fresh [`ExprCompiler`] borrowing `compiler`'s
/// fields, the same construction `StmtCompiler::compile_expr` uses
/// internally; loop bounds need this at points where `StmtCompiler`'s own
/// (private) helper isn't reachable from this module.
fn compile_expr(compiler: &mut StmtCompiler, buf: &mut CodeBuffer, expr: &lc_ast::Expr) {
    let mut expr_compiler =
        ExprCompiler::new(&mut *compiler.assembler, &mut *compiler.symbols, &mut *compiler.globals, &mut *compiler.labels);
    expr_compiler.compile(buf, expr);
}

/// Materialize a float constant into `dst` via the same store/reload round
/// trip `crate::expr::ExprCompiler::load_bits_into` uses, for loop
/// bookkeeping values (zero-initializing a counter, stepping it by one)
/// that never come from the AST.
fn load_const(compiler: &mut StmtCompiler, buf: &mut CodeBuffer, dst: Reg, value: f64) {
    let bits = crate::value::encode_scalar(value);
    let gpr_scratch = Reg::Gpr(11);
    compiler.assembler.mov_imm_to_reg(buf, gpr_scratch, bits as i64);
    compiler.assembler.store_word(buf, Reg::Gpr(4) /* sp */, -8, gpr_scratch);
    compiler.assembler.load_float(buf, dst, Reg::Gpr(4), -8);
}

pub fn compile_loop(compiler: &mut StmtCompiler, buf: &mut CodeBuffer, loop_: &Loop) {
    match loop_ {
        Loop::Range { label, var, start, end, bound, max_check, body, .. } => {
            compile_range_loop(compiler, buf, *label, var, start, end, *bound, max_check.as_ref(), body)
        }
        Loop::List { label, var, list, body, .. } => compile_list_loop(compiler, buf, *label, var, list, body),
        Loop::While { label, cond, max_iterations, body, .. } => {
            compile_while_loop(compiler, buf, *label, cond, max_iterations, body)
        }
        Loop::Receive { label, msg_var, from_var, port_spec, body, .. } => {
            compile_receive_loop(compiler, buf, *label, msg_var, from_var, port_spec, body)
        }
        Loop::ParallelRange { .. } => crate::parallel::compile_parallel_range(compiler, buf, loop_),
    }
}

fn compile_range_loop(
    compiler: &mut StmtCompiler,
    buf: &mut CodeBuffer,
    source_label: lc_ast::LoopLabel,
    var: &Rc<str>,
    start: &lc_ast::Expr,
    end: &lc_ast::Expr,
    bound: RangeBound,
    max_check: Option<&lc_ast::Expr>,
    body: &[lc_ast::Stmt],
) {
    compile_expr(compiler, buf, start);
    let counter_slot = compiler.next_slot();
    compiler.assembler.store_float(buf, Reg::Gpr(29), counter_slot, RESULT);

    compile_expr(compiler, buf, end);
    let end_slot = compiler.next_slot();
    compiler.assembler.store_float(buf, Reg::Gpr(29), end_slot, RESULT);

    let max_slot = max_check.map(|expr| {
        compile_expr(compiler, buf, expr);
        let slot = compiler.next_slot();
        compiler.assembler.store_float(buf, Reg::Gpr(29), slot, RESULT);
        slot
    });

    compiler.symbols.push_scope();
    compiler.symbols.define(var.clone(), lc_ast::SemaType::Number, true, counter_slot);

    let top = compiler.fresh_label();
    let continue_target = compiler.fresh_label();
    let exit = compiler.fresh_label();
    compiler.loop_stack.push(source_label, continue_target, exit);

    compiler.assembler.bind_label(buf, top);
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(29), counter_slot);
    compiler.assembler.load_float(buf, Reg::Fpr(1), Reg::Gpr(29), end_slot);
    compiler.assembler.ucomisd(buf, RESULT, Reg::Fpr(1));
    let stop_cond = if bound == RangeBound::Inclusive { Cond::Greater } else { Cond::GreaterEqual };
    compiler.assembler.jump_conditional(buf, stop_cond, exit);

    if let Some(max_slot) = max_slot {
        compiler.assembler.load_float(buf, RESULT, Reg::Gpr(29), counter_slot);
        compiler.assembler.load_float(buf, Reg::Fpr(1), Reg::Gpr(29), max_slot);
        compiler.assembler.ucomisd(buf, RESULT, Reg::Fpr(1));
        let within = compiler.fresh_label();
        compiler.assembler.jump_conditional(buf, Cond::Less, within);
        let abort = compiler.globals.resolve(crate::helpers::ABORT_OUT_OF_BOUNDS);
        compiler.assembler.call_symbol(buf, abort);
        compiler.assembler.bind_label(buf, within);
    }

    compiler.compile_block(buf, body);

    compiler.assembler.bind_label(buf, continue_target);
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(29), counter_slot);
    load_const(compiler, buf, Reg::Fpr(1), 1.0);
    compiler.assembler.addsd(buf, RESULT, Reg::Fpr(1));
    compiler.assembler.store_float(buf, Reg::Gpr(29), counter_slot, RESULT);
    compiler.assembler.jump(buf, top);
    compiler.assembler.bind_label(buf, exit);

    compiler.loop_stack.pop();
    compiler.symbols.pop_scope();
}

fn compile_list_loop(
    compiler: &mut StmtCompiler,
    buf: &mut CodeBuffer,
    source_label: lc_ast::LoopLabel,
    var: &Rc<str>,
    list: &lc_ast::Expr,
    body: &[lc_ast::Stmt],
) {
    compile_expr(compiler, buf, list);
    let list_slot = compiler.next_slot();
    compiler.assembler.store_float(buf, Reg::Gpr(29), list_slot, RESULT);

    // Unbox the list pointer once to read its count header; the base
    // address is re-derived from `list_slot` every iteration below since
    // it's cheaper than dedicating another stack slot to a raw GPR value.
    compiler.assembler.store_float(buf, Reg::Gpr(4), -8, RESULT);
    compiler.assembler.load_word(buf, Reg::Gpr(12), Reg::Gpr(4), -8);
    compiler.assembler.load_float(buf, Reg::Fpr(2), Reg::Gpr(12), 0);
    let count_slot = compiler.next_slot();
    compiler.assembler.store_float(buf, Reg::Gpr(29), count_slot, Reg::Fpr(2));

    let index_slot = compiler.next_slot();
    load_const(compiler, buf, RESULT, 0.0);
    compiler.assembler.store_float(buf, Reg::Gpr(29), index_slot, RESULT);

    compiler.symbols.push_scope();
    let elem_slot = compiler.next_slot();
    compiler.symbols.define(var.clone(), lc_ast::SemaType::Unknown, false, elem_slot);

    let top = compiler.fresh_label();
    let continue_target = compiler.fresh_label();
    let exit = compiler.fresh_label();
    compiler.loop_stack.push(source_label, continue_target, exit);

    compiler.assembler.bind_label(buf, top);
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(29), index_slot);
    compiler.assembler.load_float(buf, Reg::Fpr(1), Reg::Gpr(29), count_slot);
    compiler.assembler.ucomisd(buf, RESULT, Reg::Fpr(1));
    compiler.assembler.jump_conditional(buf, Cond::GreaterEqual, exit);

    // Element address: `base + 16 + i*16`, `i*16` computed as a float
    // multiply (no integer multiply in this trait) then converted back to
    // an integer byte offset (`spec.md` §3.1 16-byte stride).
    load_const(compiler, buf, Reg::Fpr(1), 16.0);
    compiler.assembler.mulsd(buf, RESULT, Reg::Fpr(1));
    compiler.assembler.cvt_float_to_int(buf, Reg::Gpr(13), RESULT);
    compiler.assembler.load_float(buf, Reg::Fpr(2), Reg::Gpr(29), list_slot);
    compiler.assembler.store_float(buf, Reg::Gpr(4), -8, Reg::Fpr(2));
    compiler.assembler.load_word(buf, Reg::Gpr(14), Reg::Gpr(4), -8);
    compiler.assembler.add_reg(buf, Reg::Gpr(13), Reg::Gpr(14));
    compiler.assembler.add_imm(buf, Reg::Gpr(13), 16);
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(13), 8);
    compiler.assembler.store_float(buf, Reg::Gpr(29), elem_slot, RESULT);

    compiler.compile_block(buf, body);

    compiler.assembler.bind_label(buf, continue_target);
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(29), index_slot);
    load_const(compiler, buf, Reg::Fpr(1), 1.0);
    compiler.assembler.addsd(buf, RESULT, Reg::Fpr(1));
    compiler.assembler.store_float(buf, Reg::Gpr(29), index_slot, RESULT);
    compiler.assembler.jump(buf, top);
    compiler.assembler.bind_label(buf, exit);

    compiler.loop_stack.pop();
    compiler.symbols.pop_scope();
}

fn compile_while_loop(
    compiler: &mut StmtCompiler,
    buf: &mut CodeBuffer,
    source_label: lc_ast::LoopLabel,
    cond: &lc_ast::Expr,
    max_iterations: &lc_ast::Expr,
    body: &[lc_ast::Stmt],
) {
    compile_expr(compiler, buf, max_iterations);
    let max_slot = compiler.next_slot();
    compiler.assembler.store_float(buf, Reg::Gpr(29), max_slot, RESULT);

    let counter_slot = compiler.next_slot();
    load_const(compiler, buf, RESULT, 0.0);
    compiler.assembler.store_float(buf, Reg::Gpr(29), counter_slot, RESULT);

    let top = compiler.fresh_label();
    let continue_target = compiler.fresh_label();
    let exit = compiler.fresh_label();
    compiler.loop_stack.push(source_label, continue_target, exit);

    compiler.assembler.bind_label(buf, top);
    compile_expr(compiler, buf, cond);
    load_const(compiler, buf, Reg::Fpr(1), 0.0);
    compiler.assembler.ucomisd(buf, RESULT, Reg::Fpr(1));
    compiler.assembler.jump_conditional(buf, Cond::Equal, exit);

    // Runaway-loop guard: abort once the cap given by `max_iterations` is
    // reached, the same role `max N` plays on a range loop (`spec.md`
    // §4.4, §4.10).
    compiler.assembler.load_float(buf, Reg::Fpr(2), Reg::Gpr(29), counter_slot);
    compiler.assembler.load_float(buf, Reg::Fpr(3), Reg::Gpr(29), max_slot);
    compiler.assembler.ucomisd(buf, Reg::Fpr(2), Reg::Fpr(3));
    let within = compiler.fresh_label();
    compiler.assembler.jump_conditional(buf, Cond::Less, within);
    let abort = compiler.globals.resolve(crate::helpers::ABORT_OUT_OF_BOUNDS);
    compiler.assembler.call_symbol(buf, abort);
    compiler.assembler.bind_label(buf, within);

    compiler.compile_block(buf, body);

    compiler.assembler.bind_label(buf, continue_target);
    compiler.assembler.load_float(buf, Reg::Fpr(2), Reg::Gpr(29), counter_slot);
    load_const(compiler, buf, Reg::Fpr(3), 1.0);
    compiler.assembler.addsd(buf, Reg::Fpr(2), Reg::Fpr(3));
    compiler.assembler.store_float(buf, Reg::Gpr(29), counter_slot, Reg::Fpr(2));
    compiler.assembler.jump(buf, top);
    compiler.assembler.bind_label(buf, exit);

    compiler.loop_stack.pop();
}

/// `@ msg, from in ":port"`: block on the runtime's port queue via a
/// direct syscall (matching the raw-syscall shape `crate::stmt`'s `Spawn`
/// uses for `fork`/`exit` rather than a synthesized helper, since a
/// blocking receive has no use outside this one call site), binding
/// `msg_var`/`from_var` from the two values it returns.
fn compile_receive_loop(
    compiler: &mut StmtCompiler,
    buf: &mut CodeBuffer,
    source_label: lc_ast::LoopLabel,
    msg_var: &Rc<str>,
    from_var: &Rc<str>,
    port_spec: &Rc<str>,
    body: &[lc_ast::Stmt],
) {
    let port_symbol = compiler.globals.intern_string(port_spec);

    compiler.symbols.push_scope();
    let msg_slot = compiler.next_slot();
    let from_slot = compiler.next_slot();
    compiler.symbols.define(msg_var.clone(), lc_ast::SemaType::Unknown, false, msg_slot);
    compiler.symbols.define(from_var.clone(), lc_ast::SemaType::Unknown, false, from_slot);

    let top = compiler.fresh_label();
    let continue_target = compiler.fresh_label();
    let exit = compiler.fresh_label();
    compiler.loop_stack.push(source_label, continue_target, exit);

    compiler.assembler.bind_label(buf, top);
    compiler.assembler.load_symbol_addr(buf, Reg::Gpr(1), port_symbol);
    compiler.assembler.mov_imm_to_reg(buf, Reg::Gpr(0), 0); // blocking recv
    compiler.assembler.syscall(buf);
    // The kernel hands back the message pointer and sender pointer in the
    // integer return registers; box each into the NaN-boxed representation
    // every other runtime value uses before spilling to its local slot.
    compiler.assembler.store_word(buf, Reg::Gpr(4), -8, Reg::Gpr(0));
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(4), -8);
    compiler.assembler.store_float(buf, Reg::Gpr(29), msg_slot, RESULT);
    compiler.assembler.store_word(buf, Reg::Gpr(4), -8, Reg::Gpr(1));
    compiler.assembler.load_float(buf, RESULT, Reg::Gpr(4), -8);
    compiler.assembler.store_float(buf, Reg::Gpr(29), from_slot, RESULT);

    compiler.compile_block(buf, body);

    compiler.assembler.bind_label(buf, continue_target);
    compiler.assembler.jump(buf, top);
    compiler.assembler.bind_label(buf, exit);

    compiler.loop_stack.pop();
    compiler.symbols.pop_scope();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_with_label_zero_resolves_the_innermost_loop() {
        let mut stack = LoopStack::default();
        let continue_outer = stack.fresh_label();
        let break_outer = stack.fresh_label();
        stack.push(1, continue_outer, break_outer);
        let continue_inner = stack.fresh_label();
        let break_inner = stack.fresh_label();
        stack.push(2, continue_inner, break_inner);
        assert_eq!(stack.resolve_break(0), break_inner);
        stack.pop();
        assert_eq!(stack.resolve_break(0), break_outer);
    }

    #[test]
    fn labeled_break_targets_the_named_enclosing_loop() {
        let mut stack = LoopStack::default();
        let continue_outer = stack.fresh_label();
        let break_outer = stack.fresh_label();
        stack.push(7, continue_outer, break_outer);
        let continue_inner = stack.fresh_label();
        let break_inner = stack.fresh_label();
        stack.push(8, continue_inner, break_inner);
        assert_eq!(stack.resolve_break(7), break_outer);
        let _ = break_inner;
    }

    #[test]
    fn range_loop_defines_its_induction_variable_for_the_body() {
        let mut assembler = crate::test_support::NoopAssembler::default();
        let mut symbols = crate::symtab::SymbolTable::new();
        let mut globals = crate::globals::GlobalSymbols::new();
        let mut arenas = crate::arena::ArenaScopes::new();
        let mut labels = crate::labels::LabelAllocator::new();
        let mut buf = CodeBuffer::new();
        let mut compiler = StmtCompiler::new(&mut assembler, &mut symbols, &mut globals, &mut arenas, &mut labels);
        let start = lc_ast::Expr::Literal(lc_ast::Literal::IntWhole(0), lc_ast::Span::UNKNOWN);
        let end = lc_ast::Expr::Literal(lc_ast::Literal::IntWhole(3), lc_ast::Span::UNKNOWN);
        let body_uses_var = vec![lc_ast::Stmt::ExprStmt(lc_ast::Expr::Ident(Rc::from("i"), lc_ast::Span::UNKNOWN))];
        compile_range_loop(&mut compiler, &mut buf, 0, &Rc::from("i"), &start, &end, RangeBound::Exclusive, None, &body_uses_var);
    }
}
