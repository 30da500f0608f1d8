//! Default-delegating tree mutation.
//!
//! A pass implements [`NodeMutator`] and overrides only the variants it cares
//! about; everything else falls through to defaults that recursively mutate
//! children and rebuild a node only when a child actually changed, preserving
//! structural sharing for untouched subtrees.

use crate::expr::{Expr, ExprNode};
use crate::interval::{BoxExpr, DimExpr, IntervalExpr};
use crate::stmt::{
    Allocate, Block, CallStmt, Check, CopyStmt, CropBuffer, CropDim, IfThenElse, LetStmt, Loop,
    MakeBuffer, SliceBuffer, SliceDim, Stmt, StmtNode, TruncateRank,
};

pub trait NodeMutator: Sized {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        mutate_expr_children(self, e)
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        let Some(node) = s.node() else { return s.clone() };
        match node {
            StmtNode::Block(op) => self.visit_block(s, op),
            StmtNode::LetStmt(op) => self.visit_let_stmt(s, op),
            StmtNode::Loop(op) => self.visit_loop(s, op),
            StmtNode::IfThenElse(op) => self.visit_if_then_else(s, op),
            StmtNode::CallStmt(op) => self.visit_call(s, op),
            StmtNode::CopyStmt(op) => self.visit_copy(s, op),
            StmtNode::Allocate(op) => self.visit_allocate(s, op),
            StmtNode::MakeBuffer(op) => self.visit_make_buffer(s, op),
            StmtNode::CropBuffer(op) => self.visit_crop_buffer(s, op),
            StmtNode::CropDim(op) => self.visit_crop_dim(s, op),
            StmtNode::SliceBuffer(op) => self.visit_slice_buffer(s, op),
            StmtNode::SliceDim(op) => self.visit_slice_dim(s, op),
            StmtNode::TruncateRank(op) => self.visit_truncate_rank(s, op),
            StmtNode::Check(op) => self.visit_check(s, op),
        }
    }

    fn mutate_interval(&mut self, i: &IntervalExpr) -> IntervalExpr {
        IntervalExpr::new(self.mutate_expr(&i.min), self.mutate_expr(&i.max))
    }

    fn mutate_box(&mut self, b: &BoxExpr) -> BoxExpr {
        b.iter().map(|i| self.mutate_interval(i)).collect()
    }

    fn mutate_dims(&mut self, dims: &[DimExpr]) -> Vec<DimExpr> {
        dims.iter()
            .map(|d| DimExpr {
                bounds: self.mutate_interval(&d.bounds),
                stride: self.mutate_expr(&d.stride),
                fold_factor: self.mutate_expr(&d.fold_factor),
            })
            .collect()
    }

    fn visit_block(&mut self, s: &Stmt, op: &Block) -> Stmt {
        let a = self.mutate_stmt(&op.a);
        let b = self.mutate_stmt(&op.b);
        if a.same_as(&op.a) && b.same_as(&op.b) { s.clone() } else { Block::make(a, b) }
    }

    fn visit_let_stmt(&mut self, s: &Stmt, op: &LetStmt) -> Stmt {
        let value = self.mutate_expr(&op.value);
        let body = self.mutate_stmt(&op.body);
        if value.same_as(&op.value) && body.same_as(&op.body) {
            s.clone()
        } else {
            LetStmt::make(op.sym, value, body)
        }
    }

    fn visit_loop(&mut self, s: &Stmt, op: &Loop) -> Stmt {
        let bounds = self.mutate_interval(&op.bounds);
        let step = self.mutate_expr(&op.step);
        let body = self.mutate_stmt(&op.body);
        if bounds.same_as(&op.bounds) && step.same_as(&op.step) && body.same_as(&op.body) {
            s.clone()
        } else {
            Loop::make(op.sym, op.mode, bounds, step, body)
        }
    }

    fn visit_if_then_else(&mut self, s: &Stmt, op: &IfThenElse) -> Stmt {
        let condition = self.mutate_expr(&op.condition);
        let then_body = self.mutate_stmt(&op.then_body);
        let else_body = self.mutate_stmt(&op.else_body);
        if condition.same_as(&op.condition)
            && then_body.same_as(&op.then_body)
            && else_body.same_as(&op.else_body)
        {
            s.clone()
        } else {
            IfThenElse::make(condition, then_body, else_body)
        }
    }

    fn visit_call(&mut self, s: &Stmt, _op: &CallStmt) -> Stmt {
        s.clone()
    }

    fn visit_copy(&mut self, s: &Stmt, op: &CopyStmt) -> Stmt {
        let src_x: Vec<Expr> = op.src_x.iter().map(|e| self.mutate_expr(e)).collect();
        if src_x.iter().zip(&op.src_x).all(|(a, b)| a.same_as(b)) {
            s.clone()
        } else {
            CopyStmt::make(op.src, src_x, op.dst, op.dst_x.clone(), op.padding.clone())
        }
    }

    fn visit_allocate(&mut self, s: &Stmt, op: &Allocate) -> Stmt {
        let dims = self.mutate_dims(&op.dims);
        let body = self.mutate_stmt(&op.body);
        if body.same_as(&op.body) && dims.iter().zip(&op.dims).all(|(a, b)| a.same_as(b)) {
            s.clone()
        } else {
            Allocate::make(op.sym, op.storage, op.elem_size, dims, body)
        }
    }

    fn visit_make_buffer(&mut self, s: &Stmt, op: &MakeBuffer) -> Stmt {
        let base = self.mutate_expr(&op.base);
        let elem_size = self.mutate_expr(&op.elem_size);
        let dims = self.mutate_dims(&op.dims);
        let body = self.mutate_stmt(&op.body);
        if base.same_as(&op.base)
            && elem_size.same_as(&op.elem_size)
            && body.same_as(&op.body)
            && dims.iter().zip(&op.dims).all(|(a, b)| a.same_as(b))
        {
            s.clone()
        } else {
            MakeBuffer::make(op.sym, base, elem_size, dims, body)
        }
    }

    fn visit_crop_buffer(&mut self, s: &Stmt, op: &CropBuffer) -> Stmt {
        let bounds = self.mutate_box(&op.bounds);
        let body = self.mutate_stmt(&op.body);
        if body.same_as(&op.body) && bounds.iter().zip(&op.bounds).all(|(a, b)| a.same_as(b)) {
            s.clone()
        } else {
            CropBuffer::make(op.sym, bounds, body)
        }
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        let bounds = self.mutate_interval(&op.bounds);
        let body = self.mutate_stmt(&op.body);
        if bounds.same_as(&op.bounds) && body.same_as(&op.body) {
            s.clone()
        } else {
            CropDim::make(op.sym, op.dim, bounds, body)
        }
    }

    fn visit_slice_buffer(&mut self, s: &Stmt, op: &SliceBuffer) -> Stmt {
        let at: Vec<Expr> = op.at.iter().map(|e| self.mutate_expr(e)).collect();
        let body = self.mutate_stmt(&op.body);
        if body.same_as(&op.body) && at.iter().zip(&op.at).all(|(a, b)| a.same_as(b)) {
            s.clone()
        } else {
            SliceBuffer::make(op.sym, at, body)
        }
    }

    fn visit_slice_dim(&mut self, s: &Stmt, op: &SliceDim) -> Stmt {
        let at = self.mutate_expr(&op.at);
        let body = self.mutate_stmt(&op.body);
        if at.same_as(&op.at) && body.same_as(&op.body) {
            s.clone()
        } else {
            SliceDim::make(op.sym, op.dim, at, body)
        }
    }

    fn visit_truncate_rank(&mut self, s: &Stmt, op: &TruncateRank) -> Stmt {
        let body = self.mutate_stmt(&op.body);
        if body.same_as(&op.body) { s.clone() } else { TruncateRank::make(op.sym, op.rank, body) }
    }

    fn visit_check(&mut self, s: &Stmt, op: &Check) -> Stmt {
        let condition = self.mutate_expr(&op.condition);
        if condition.same_as(&op.condition) { s.clone() } else { Check::make(condition) }
    }
}

/// Structural recursion for expressions: mutate children via
/// `m.mutate_expr`, rebuilding only on change.
pub fn mutate_expr_children<M: NodeMutator>(m: &mut M, e: &Expr) -> Expr {
    let Some(node) = e.node() else { return e.clone() };

    macro_rules! binary {
        ($ctor:path, $a:expr, $b:expr) => {{
            let a = m.mutate_expr($a);
            let b = m.mutate_expr($b);
            if a.same_as($a) && b.same_as($b) { e.clone() } else { $ctor(a, b) }
        }};
    }

    match node {
        ExprNode::Variable(_) | ExprNode::Constant(_) | ExprNode::Wildcard(_) => e.clone(),
        ExprNode::Let { sym, value, body } => {
            let new_value = m.mutate_expr(value);
            let new_body = m.mutate_expr(body);
            if new_value.same_as(value) && new_body.same_as(body) {
                e.clone()
            } else {
                Expr::let_(*sym, new_value, new_body)
            }
        }
        ExprNode::Add(a, b) => binary!(Expr::add, a, b),
        ExprNode::Sub(a, b) => binary!(Expr::sub, a, b),
        ExprNode::Mul(a, b) => binary!(Expr::mul, a, b),
        ExprNode::Div(a, b) => binary!(Expr::div, a, b),
        ExprNode::Mod(a, b) => binary!(Expr::modulo, a, b),
        ExprNode::Min(a, b) => binary!(Expr::min, a, b),
        ExprNode::Max(a, b) => binary!(Expr::max, a, b),
        ExprNode::Eq(a, b) => binary!(Expr::eq, a, b),
        ExprNode::Ne(a, b) => binary!(Expr::ne, a, b),
        ExprNode::Lt(a, b) => binary!(Expr::lt, a, b),
        ExprNode::Le(a, b) => binary!(Expr::le, a, b),
        ExprNode::And(a, b) => binary!(Expr::and, a, b),
        ExprNode::Or(a, b) => binary!(Expr::or, a, b),
        ExprNode::Not(a) => {
            let new_a = m.mutate_expr(a);
            if new_a.same_as(a) { e.clone() } else { Expr::not(new_a) }
        }
        ExprNode::Select { cond, true_value, false_value } => {
            let c = m.mutate_expr(cond);
            let t = m.mutate_expr(true_value);
            let f = m.mutate_expr(false_value);
            if c.same_as(cond) && t.same_as(true_value) && f.same_as(false_value) {
                e.clone()
            } else {
                Expr::select(c, t, f)
            }
        }
        ExprNode::Call { intrinsic, args } => {
            let new_args: Vec<Expr> = args.iter().map(|a| m.mutate_expr(a)).collect();
            if new_args.iter().zip(args).all(|(a, b)| a.same_as(b)) {
                e.clone()
            } else {
                Expr::call(*intrinsic, new_args)
            }
        }
    }
}
