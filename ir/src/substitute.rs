//! Structural substitution and matching.

use crate::expr::{Expr, ExprNode, Intrinsic};
use crate::interval::BoxExpr;
use crate::mutator::{mutate_expr_children, NodeMutator};
use crate::stmt::{LetStmt, Loop, Stmt, StmtNode};
use crate::symbol::SymbolId;
use crate::symbol_map::SymbolMap;

enum Target {
    Symbol(SymbolId),
    Pattern(Expr),
}

struct Substitutor {
    target: Target,
    replacement: Expr,
    /// Depth of shadowing binders for symbol targets.
    shadowed: usize,
}

impl NodeMutator for Substitutor {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if !e.defined() {
            return e.clone();
        }
        match &self.target {
            Target::Symbol(sym) => {
                if self.shadowed == 0 && e.as_variable() == Some(*sym) {
                    return self.replacement.clone();
                }
                if let Some(ExprNode::Let { sym: bound, value, body }) = e.node() {
                    if *bound == *sym {
                        let new_value = self.mutate_expr(value);
                        self.shadowed += 1;
                        let new_body = self.mutate_expr(body);
                        self.shadowed -= 1;
                        return if new_value.same_as(value) && new_body.same_as(body) {
                            e.clone()
                        } else {
                            Expr::let_(*bound, new_value, new_body)
                        };
                    }
                }
            }
            Target::Pattern(pattern) => {
                if e == pattern {
                    return self.replacement.clone();
                }
            }
        }
        mutate_expr_children(self, e)
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        if let Target::Symbol(sym) = &self.target {
            let sym = *sym;
            // A statement that rebinds the symbol shadows it for its body.
            match s.node() {
                Some(StmtNode::LetStmt(op)) if op.sym == sym => {
                    let value = self.mutate_expr(&op.value);
                    self.shadowed += 1;
                    let body = self.mutate_stmt(&op.body);
                    self.shadowed -= 1;
                    return if value.same_as(&op.value) && body.same_as(&op.body) {
                        s.clone()
                    } else {
                        LetStmt::make(op.sym, value, body)
                    };
                }
                Some(StmtNode::Loop(op)) if op.sym == sym => {
                    let bounds = self.mutate_interval(&op.bounds);
                    let step = self.mutate_expr(&op.step);
                    self.shadowed += 1;
                    let body = self.mutate_stmt(&op.body);
                    self.shadowed -= 1;
                    return if bounds.same_as(&op.bounds)
                        && step.same_as(&op.step)
                        && body.same_as(&op.body)
                    {
                        s.clone()
                    } else {
                        Loop::make(op.sym, op.mode, bounds, step, body)
                    };
                }
                _ => {}
            }
        }
        // Default dispatch handles everything else.
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
}

/// Replace free occurrences of the variable `sym` with `replacement`.
pub fn substitute(e: &Expr, sym: SymbolId, replacement: &Expr) -> Expr {
    let mut m = Substitutor { target: Target::Symbol(sym), replacement: replacement.clone(), shadowed: 0 };
    m.mutate_expr(e)
}

/// Replace every structural occurrence of `target` with `replacement`.
pub fn substitute_expr(e: &Expr, target: &Expr, replacement: &Expr) -> Expr {
    let mut m =
        Substitutor { target: Target::Pattern(target.clone()), replacement: replacement.clone(), shadowed: 0 };
    m.mutate_expr(e)
}

pub fn substitute_in_stmt(s: &Stmt, sym: SymbolId, replacement: &Expr) -> Stmt {
    let mut m = Substitutor { target: Target::Symbol(sym), replacement: replacement.clone(), shadowed: 0 };
    m.mutate_stmt(s)
}

struct BufferBoundsSubstitutor<'a> {
    sym: SymbolId,
    bounds: &'a BoxExpr,
}

impl NodeMutator for BufferBoundsSubstitutor<'_> {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if let Some(ExprNode::Call { intrinsic, args }) = e.node() {
            if let [buffer, dim] = args.as_slice() {
                if buffer.as_variable() == Some(self.sym) {
                    if let Some(d) = dim.as_constant() {
                        if let Some(interval) = self.bounds.get(d as usize) {
                            match intrinsic {
                                Intrinsic::BufferMin if interval.min.defined() => {
                                    return interval.min.clone();
                                }
                                Intrinsic::BufferMax if interval.max.defined() => {
                                    return interval.max.clone();
                                }
                                Intrinsic::BufferExtent if interval.defined() => {
                                    return interval.extent();
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        }
        mutate_expr_children(self, e)
    }
}

/// Specialize `buffer_min`/`buffer_max`/`buffer_extent` calls on `sym` to the
/// bounds of a concrete box.
pub fn substitute_buffer_bounds(e: &Expr, sym: SymbolId, bounds: &BoxExpr) -> Expr {
    let mut m = BufferBoundsSubstitutor { sym, bounds };
    m.mutate_expr(e)
}

/// Structural match of `e` against `pattern`. [`ExprNode::Wildcard`] nodes in
/// the pattern bind the matched subexpression; a wildcard seen twice must
/// match structurally-equal subexpressions.
pub fn match_expr(pattern: &Expr, e: &Expr, bindings: &mut SymbolMap<Expr>) -> bool {
    match (pattern.node(), e.node()) {
        (Some(ExprNode::Wildcard(sym)), _) => {
            if let Some(bound) = bindings.get(*sym) {
                bound == e
            } else {
                bindings.set(*sym, e.clone());
                true
            }
        }
        (Some(ExprNode::Variable(a)), Some(ExprNode::Variable(b))) => a == b,
        (Some(ExprNode::Constant(a)), Some(ExprNode::Constant(b))) => a == b,
        (Some(ExprNode::Let { sym: sa, value: va, body: ba }), Some(ExprNode::Let { sym: sb, value: vb, body: bb })) => {
            sa == sb && match_expr(va, vb, bindings) && match_expr(ba, bb, bindings)
        }
        (Some(ExprNode::Not(a)), Some(ExprNode::Not(b))) => match_expr(a, b, bindings),
        (
            Some(ExprNode::Select { cond: ca, true_value: ta, false_value: fa }),
            Some(ExprNode::Select { cond: cb, true_value: tb, false_value: fb }),
        ) => match_expr(ca, cb, bindings) && match_expr(ta, tb, bindings) && match_expr(fa, fb, bindings),
        (Some(ExprNode::Call { intrinsic: ia, args: aa }), Some(ExprNode::Call { intrinsic: ib, args: ab })) => {
            ia == ib
                && aa.len() == ab.len()
                && aa.iter().zip(ab).all(|(a, b)| match_expr(a, b, bindings))
        }
        (Some(pa), Some(pb)) => {
            if std::mem::discriminant(pa) != std::mem::discriminant(pb) {
                return false;
            }
            match (binary_parts(pa), binary_parts(pb)) {
                (Some((a1, a2)), Some((b1, b2))) => {
                    match_expr(a1, b1, bindings) && match_expr(a2, b2, bindings)
                }
                _ => false,
            }
        }
        (None, None) => true,
        _ => false,
    }
}

fn binary_parts(node: &ExprNode) -> Option<(&Expr, &Expr)> {
    use ExprNode::*;
    match node {
        Add(a, b) | Sub(a, b) | Mul(a, b) | Div(a, b) | Mod(a, b) | Min(a, b) | Max(a, b)
        | Eq(a, b) | Ne(a, b) | Lt(a, b) | Le(a, b) | And(a, b) | Or(a, b) => Some((a, b)),
        _ => None,
    }
}
