//! The algebraic simplifier.
//!
//! A pure bottom-up rewriter over expressions and statements. Arithmetic on
//! linear expressions is canonicalized into a sum of coefficient-scaled terms
//! with the constant on the right, which makes shared terms cancel in
//! subtractions and lets comparisons be discharged from the bounds of the
//! difference. Infinities absorb addition and scale through multiplication;
//! indeterminate values poison every arithmetic node containing them.
//!
//! The simplifier carries a bounds environment mapping variables to their
//! enclosing loop or let ranges, which [`crate::bounds`] uses to evaluate
//! interval queries.

use slinky_ir::depends_on::{count_uses, stmt_count_uses};
use slinky_ir::expr::{indeterminate, negative_infinity, positive_infinity};
use slinky_ir::substitute::{substitute, substitute_in_stmt};
use slinky_ir::{
    Allocate, Check, CropBuffer, CropDim, Expr, ExprNode, IfThenElse, Index, Intrinsic,
    IntervalExpr, LetStmt, Loop, MakeBuffer, NodeMutator, SliceBuffer, SliceDim, Stmt,
    SymbolMap, TruncateRank,
};

use crate::bounds::bounds_of;

/// Simplify with no variable bounds in scope.
pub fn simplify(e: &Expr) -> Expr {
    Simplifier::new().mutate_expr(e)
}

/// Simplify under known variable ranges.
pub fn simplify_in(e: &Expr, bounds: &SymbolMap<IntervalExpr>) -> Expr {
    Simplifier::with_bounds(bounds.clone()).mutate_expr(e)
}

pub fn simplify_stmt(s: &Stmt) -> Stmt {
    Simplifier::new().mutate_stmt(s)
}

pub(crate) struct Simplifier {
    bounds: SymbolMap<IntervalExpr>,
}

impl Simplifier {
    pub(crate) fn new() -> Self {
        Self { bounds: SymbolMap::new() }
    }

    pub(crate) fn with_bounds(bounds: SymbolMap<IntervalExpr>) -> Self {
        Self { bounds }
    }

    fn fold(&mut self, e: &Expr) -> Expr {
        let Some(node) = e.node() else { return e.clone() };
        match node {
            ExprNode::Variable(_) | ExprNode::Constant(_) | ExprNode::Wildcard(_) => e.clone(),
            ExprNode::Let { sym, value, body } => {
                let value = self.mutate_expr(value);
                if is_leaf(&value) || count_uses(body, *sym) <= 1 {
                    self.mutate_expr(&substitute(body, *sym, &value))
                } else {
                    let saved = self.bounds.replace(*sym, Some(bounds_of(&value, &self.bounds)));
                    let body = self.mutate_expr(body);
                    self.bounds.replace(*sym, saved);
                    Expr::let_(*sym, value, body)
                }
            }
            ExprNode::Add(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_add(a, b)
            }
            ExprNode::Sub(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_sub(a, b)
            }
            ExprNode::Mul(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_mul(a, b)
            }
            ExprNode::Div(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_div(a, b)
            }
            ExprNode::Mod(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_mod(a, b)
            }
            ExprNode::Min(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_min_max(a, b, true)
            }
            ExprNode::Max(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_min_max(a, b, false)
            }
            ExprNode::Eq(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_cmp(Cmp::Eq, a, b)
            }
            ExprNode::Ne(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_cmp(Cmp::Ne, a, b)
            }
            ExprNode::Lt(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_cmp(Cmp::Lt, a, b)
            }
            ExprNode::Le(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                self.fold_cmp(Cmp::Le, a, b)
            }
            ExprNode::And(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                fold_and(a, b)
            }
            ExprNode::Or(a, b) => {
                let (a, b) = (self.mutate_expr(a), self.mutate_expr(b));
                fold_or(a, b)
            }
            ExprNode::Not(a) => fold_not(self.mutate_expr(a)),
            ExprNode::Select { cond, true_value, false_value } => {
                let cond = self.mutate_expr(cond);
                if let Some(c) = cond.as_constant() {
                    return if c != 0 {
                        self.mutate_expr(true_value)
                    } else {
                        self.mutate_expr(false_value)
                    };
                }
                let t = self.mutate_expr(true_value);
                let f = self.mutate_expr(false_value);
                if t == f { t } else { Expr::select(cond, t, f) }
            }
            ExprNode::Call { intrinsic, args } => {
                let args: Vec<Expr> = args.iter().map(|a| self.mutate_expr(a)).collect();
                if *intrinsic == Intrinsic::Abs && args.len() == 1 {
                    let x = &args[0];
                    if x.is_indeterminate() {
                        return indeterminate();
                    }
                    if x.is_infinity() {
                        return positive_infinity();
                    }
                    if let Some(c) = x.as_constant() {
                        return Expr::constant(c.wrapping_abs());
                    }
                }
                Expr::call(*intrinsic, args)
            }
        }
    }

    fn fold_add(&mut self, a: Expr, b: Expr) -> Expr {
        if a.is_indeterminate() || b.is_indeterminate() {
            return indeterminate();
        }
        match (infinity_sign(&a), infinity_sign(&b)) {
            (Some(sa), Some(sb)) => return if sa == sb { a } else { indeterminate() },
            (Some(_), None) => return a,
            (None, Some(_)) => return b,
            (None, None) => {}
        }
        canonicalize_linear(&Expr::add(a, b))
    }

    fn fold_sub(&mut self, a: Expr, b: Expr) -> Expr {
        if a.is_indeterminate() || b.is_indeterminate() {
            return indeterminate();
        }
        match (infinity_sign(&a), infinity_sign(&b)) {
            (Some(sa), Some(sb)) => return if sa != sb { a } else { indeterminate() },
            (Some(_), None) => return a,
            (None, Some(sb)) => return if sb > 0 { negative_infinity() } else { positive_infinity() },
            (None, None) => {}
        }
        canonicalize_linear(&Expr::sub(a, b))
    }

    fn fold_mul(&mut self, a: Expr, b: Expr) -> Expr {
        if a.is_indeterminate() || b.is_indeterminate() {
            return indeterminate();
        }
        // Commute a constant to the right.
        let (a, b) = if a.as_constant().is_some() && b.as_constant().is_none() { (b, a) } else { (a, b) };
        match (infinity_sign(&a), infinity_sign(&b)) {
            (Some(sa), Some(sb)) => {
                return if sa * sb > 0 { positive_infinity() } else { negative_infinity() };
            }
            (Some(sa), None) | (None, Some(sa)) => {
                let other = if infinity_sign(&a).is_some() { &b } else { &a };
                return match other.as_constant() {
                    Some(0) => indeterminate(),
                    Some(c) if c > 0 => {
                        if sa > 0 { positive_infinity() } else { negative_infinity() }
                    }
                    Some(_) => {
                        if sa > 0 { negative_infinity() } else { positive_infinity() }
                    }
                    None => Expr::mul(a.clone(), b.clone()),
                };
            }
            (None, None) => {}
        }
        match b.as_constant() {
            Some(0) => Expr::constant(0),
            Some(1) => a,
            Some(_) => canonicalize_linear(&Expr::mul(a, b)),
            None => Expr::mul(a, b),
        }
    }

    fn fold_div(&mut self, a: Expr, b: Expr) -> Expr {
        if a.is_indeterminate() || b.is_indeterminate() {
            return indeterminate();
        }
        if b.is_constant(0) {
            return indeterminate();
        }
        if b.is_infinity() {
            return if a.is_infinity() { indeterminate() } else { Expr::constant(0) };
        }
        if let Some(sa) = infinity_sign(&a) {
            return match b.as_constant() {
                Some(c) if c > 0 => a,
                Some(_) => {
                    if sa > 0 { negative_infinity() } else { positive_infinity() }
                }
                None => Expr::div(a, b),
            };
        }
        match (a.as_constant(), b.as_constant()) {
            (Some(x), Some(y)) => Expr::constant(slinky_ir::eval::floor_div(x, y)),
            (Some(0), _) => Expr::constant(0),
            (_, Some(1)) => a,
            _ => Expr::div(a, b),
        }
    }

    fn fold_mod(&mut self, a: Expr, b: Expr) -> Expr {
        if a.is_indeterminate() || b.is_indeterminate() || a.is_infinity() || b.is_infinity() {
            return indeterminate();
        }
        if b.is_constant(0) {
            return indeterminate();
        }
        match (a.as_constant(), b.as_constant()) {
            (Some(x), Some(y)) => Expr::constant(slinky_ir::eval::floor_mod(x, y)),
            (Some(0), _) => Expr::constant(0),
            (_, Some(1)) => Expr::constant(0),
            _ => Expr::modulo(a, b),
        }
    }

    fn fold_min_max(&mut self, a: Expr, b: Expr, is_min: bool) -> Expr {
        if a.is_indeterminate() || b.is_indeterminate() {
            return indeterminate();
        }
        // Identity and absorbing infinities.
        for (x, y) in [(&a, &b), (&b, &a)] {
            if x.is_positive_infinity() {
                return if is_min { y.clone() } else { x.clone() };
            }
            if x.is_negative_infinity() {
                return if is_min { x.clone() } else { y.clone() };
            }
        }
        if a == b {
            return a;
        }
        // Resolve by the sign of the difference when it is decidable.
        if let Some(ord) = self.compare(&a, &b) {
            return match (ord, is_min) {
                (std::cmp::Ordering::Greater, true) | (std::cmp::Ordering::Less, false) => b,
                _ => a,
            };
        }
        // Commute a constant to the right, then merge with a nested constant.
        let (a, b) = if a.as_constant().is_some() && b.as_constant().is_none() { (b, a) } else { (a, b) };
        if let Some(cb) = b.as_constant() {
            let nested = match (a.node(), is_min) {
                (Some(ExprNode::Min(x, c)), true) => c.as_constant().map(|cc| (x.clone(), cc)),
                (Some(ExprNode::Max(x, c)), false) => c.as_constant().map(|cc| (x.clone(), cc)),
                _ => None,
            };
            if let Some((x, ca)) = nested {
                let merged = if is_min { ca.min(cb) } else { ca.max(cb) };
                return if is_min {
                    Expr::min(x, Expr::constant(merged))
                } else {
                    Expr::max(x, Expr::constant(merged))
                };
            }
        }
        if is_min { Expr::min(a, b) } else { Expr::max(a, b) }
    }

    /// Decide the ordering of `a` and `b` from the bounds of their
    /// difference, when provable. `Equal` is only reported for a constant
    /// zero difference.
    fn compare(&mut self, a: &Expr, b: &Expr) -> Option<std::cmp::Ordering> {
        let d = self.fold_sub(a.clone(), b.clone());
        if let Some(c) = d.as_constant() {
            return Some(c.cmp(&0));
        }
        if d.is_positive_infinity() {
            return Some(std::cmp::Ordering::Greater);
        }
        if d.is_negative_infinity() {
            return Some(std::cmp::Ordering::Less);
        }
        let range = bounds_of(&d, &self.bounds);
        if let Some(hi) = constant_bound(&range.max) {
            // a - b <= 0 proves a <= b, which is enough to pick a side.
            if hi <= 0 {
                return Some(std::cmp::Ordering::Less);
            }
        }
        if let Some(lo) = constant_bound(&range.min) {
            if lo >= 0 {
                return Some(std::cmp::Ordering::Greater);
            }
        }
        None
    }

    fn fold_cmp(&mut self, op: Cmp, a: Expr, b: Expr) -> Expr {
        // The difference b - a decides every comparison: a < b iff d > 0,
        // a <= b iff d >= 0, a == b iff d == 0.
        let rebuild = |a: Expr, b: Expr| match op {
            Cmp::Eq => Expr::eq(a, b),
            Cmp::Ne => Expr::ne(a, b),
            Cmp::Lt => Expr::lt(a, b),
            Cmp::Le => Expr::le(a, b),
        };
        if a.is_indeterminate() || b.is_indeterminate() {
            return rebuild(a, b);
        }
        let d = self.fold_sub(b.clone(), a.clone());
        let (lo, hi) = if let Some(c) = d.as_constant() {
            (Some(c), Some(c))
        } else if d.is_positive_infinity() {
            (Some(Index::MAX), None)
        } else if d.is_negative_infinity() {
            (None, Some(Index::MIN))
        } else {
            let range = bounds_of(&d, &self.bounds);
            (constant_bound(&range.min), constant_bound(&range.max))
        };
        let decided = match op {
            // d > 0
            Cmp::Lt => match (lo, hi) {
                (Some(lo), _) if lo >= 1 => Some(true),
                (_, Some(hi)) if hi <= 0 => Some(false),
                _ => None,
            },
            // d >= 0
            Cmp::Le => match (lo, hi) {
                (Some(lo), _) if lo >= 0 => Some(true),
                (_, Some(hi)) if hi < 0 => Some(false),
                _ => None,
            },
            // d == 0
            Cmp::Eq => match (lo, hi) {
                (Some(0), Some(0)) => Some(true),
                (Some(lo), _) if lo >= 1 => Some(false),
                (_, Some(hi)) if hi <= -1 => Some(false),
                _ => None,
            },
            Cmp::Ne => match (lo, hi) {
                (Some(0), Some(0)) => Some(false),
                (Some(lo), _) if lo >= 1 => Some(true),
                (_, Some(hi)) if hi <= -1 => Some(true),
                _ => None,
            },
        };
        match decided {
            Some(v) => Expr::constant(v as Index),
            None => rebuild(a, b),
        }
    }
}

#[derive(Clone, Copy)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
}

impl NodeMutator for Simplifier {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        let result = self.fold(e);
        // Preserve sharing when the rewrite was an identity.
        if result == *e { e.clone() } else { result }
    }

    fn visit_let_stmt(&mut self, _s: &Stmt, op: &LetStmt) -> Stmt {
        let value = self.mutate_expr(&op.value);
        let uses = stmt_count_uses(&op.body, op.sym);
        if uses.id_uses == 0 && (is_leaf(&value) || uses.expr_uses <= 1) {
            return self.mutate_stmt(&substitute_in_stmt(&op.body, op.sym, &value));
        }
        let saved = self.bounds.replace(op.sym, Some(bounds_of(&value, &self.bounds)));
        let body = self.mutate_stmt(&op.body);
        self.bounds.replace(op.sym, saved);
        if !body.defined() {
            return body;
        }
        LetStmt::make(op.sym, value, body)
    }

    fn visit_loop(&mut self, s: &Stmt, op: &Loop) -> Stmt {
        let bounds = IntervalExpr::new(self.mutate_expr(&op.bounds.min), self.mutate_expr(&op.bounds.max));
        let step = self.mutate_expr(&op.step);
        if crate::bounds::prove_true(&bounds.empty(), &self.bounds) {
            return Stmt::undefined();
        }
        let saved = self.bounds.replace(op.sym, Some(bounds.clone()));
        let body = self.mutate_stmt(&op.body);
        self.bounds.replace(op.sym, saved);
        if !body.defined() {
            return Stmt::undefined();
        }
        if bounds.same_as(&op.bounds) && step.same_as(&op.step) && body.same_as(&op.body) {
            s.clone()
        } else {
            Loop::make(op.sym, op.mode, bounds, step, body)
        }
    }

    fn visit_if_then_else(&mut self, _s: &Stmt, op: &IfThenElse) -> Stmt {
        let condition = self.mutate_expr(&op.condition);
        if let Some(c) = condition.as_constant() {
            return if c != 0 {
                self.mutate_stmt(&op.then_body)
            } else {
                self.mutate_stmt(&op.else_body)
            };
        }
        let then_body = self.mutate_stmt(&op.then_body);
        let else_body = self.mutate_stmt(&op.else_body);
        if !then_body.defined() && !else_body.defined() {
            return Stmt::undefined();
        }
        IfThenElse::make(condition, then_body, else_body)
    }

    fn visit_check(&mut self, _s: &Stmt, op: &Check) -> Stmt {
        let condition = self.mutate_expr(&op.condition);
        match condition.as_constant() {
            Some(c) if c != 0 => Stmt::undefined(),
            _ => Check::make(condition),
        }
    }

    fn visit_allocate(&mut self, s: &Stmt, op: &Allocate) -> Stmt {
        let dims = self.mutate_dims(&op.dims);
        let body = self.mutate_stmt(&op.body);
        if !body.defined() {
            return Stmt::undefined();
        }
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
        if !body.defined() {
            return Stmt::undefined();
        }
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
        if !body.defined() {
            return Stmt::undefined();
        }
        if body.same_as(&op.body) && bounds.iter().zip(&op.bounds).all(|(a, b)| a.same_as(b)) {
            s.clone()
        } else {
            CropBuffer::make(op.sym, bounds, body)
        }
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        let bounds = self.mutate_interval(&op.bounds);
        let body = self.mutate_stmt(&op.body);
        if !body.defined() {
            return Stmt::undefined();
        }
        if bounds.same_as(&op.bounds) && body.same_as(&op.body) {
            s.clone()
        } else {
            CropDim::make(op.sym, op.dim, bounds, body)
        }
    }

    fn visit_slice_buffer(&mut self, s: &Stmt, op: &SliceBuffer) -> Stmt {
        let at: Vec<Expr> = op.at.iter().map(|e| self.mutate_expr(e)).collect();
        let body = self.mutate_stmt(&op.body);
        if !body.defined() {
            return Stmt::undefined();
        }
        if body.same_as(&op.body) && at.iter().zip(&op.at).all(|(a, b)| a.same_as(b)) {
            s.clone()
        } else {
            SliceBuffer::make(op.sym, at, body)
        }
    }

    fn visit_slice_dim(&mut self, s: &Stmt, op: &SliceDim) -> Stmt {
        let at = self.mutate_expr(&op.at);
        let body = self.mutate_stmt(&op.body);
        if !body.defined() {
            return Stmt::undefined();
        }
        if at.same_as(&op.at) && body.same_as(&op.body) {
            s.clone()
        } else {
            SliceDim::make(op.sym, op.dim, at, body)
        }
    }

    fn visit_truncate_rank(&mut self, s: &Stmt, op: &TruncateRank) -> Stmt {
        let body = self.mutate_stmt(&op.body);
        if !body.defined() {
            return Stmt::undefined();
        }
        if body.same_as(&op.body) { s.clone() } else { TruncateRank::make(op.sym, op.rank, body) }
    }
}

/// True when `e` is known to evaluate to 0 or 1, which the boolean identity
/// rules require: dropping `&& true` around an arbitrary integer would change
/// its value.
fn is_boolean(e: &Expr) -> bool {
    match e.node() {
        Some(
            ExprNode::Eq(..)
            | ExprNode::Ne(..)
            | ExprNode::Lt(..)
            | ExprNode::Le(..)
            | ExprNode::And(..)
            | ExprNode::Or(..)
            | ExprNode::Not(_),
        ) => true,
        Some(ExprNode::Constant(c)) => *c == 0 || *c == 1,
        _ => false,
    }
}

fn fold_and(a: Expr, b: Expr) -> Expr {
    match (a.as_constant(), b.as_constant()) {
        (Some(0), _) | (_, Some(0)) => Expr::constant(0),
        (Some(_), Some(_)) => Expr::constant(1),
        (Some(_), None) if is_boolean(&b) => b,
        (None, Some(_)) if is_boolean(&a) => a,
        _ => {
            if a == b && is_boolean(&a) {
                a
            } else {
                Expr::and(a, b)
            }
        }
    }
}

fn fold_or(a: Expr, b: Expr) -> Expr {
    match (a.as_constant(), b.as_constant()) {
        (Some(0), Some(0)) => Expr::constant(0),
        (Some(0), None) if is_boolean(&b) => b,
        (None, Some(0)) if is_boolean(&a) => a,
        (Some(c), _) if c != 0 => Expr::constant(1),
        (_, Some(c)) if c != 0 => Expr::constant(1),
        _ => {
            if a == b && is_boolean(&a) {
                a
            } else {
                Expr::or(a, b)
            }
        }
    }
}

fn fold_not(a: Expr) -> Expr {
    if let Some(c) = a.as_constant() {
        return Expr::constant((c == 0) as Index);
    }
    if let Some(ExprNode::Not(inner)) = a.node() {
        if is_boolean(inner) {
            return inner.clone();
        }
    }
    Expr::not(a)
}

fn is_leaf(e: &Expr) -> bool {
    matches!(e.node(), Some(ExprNode::Variable(_)) | Some(ExprNode::Constant(_)))
}

/// +1 for positive infinity, -1 for negative, None otherwise.
fn infinity_sign(e: &Expr) -> Option<i32> {
    if e.is_positive_infinity() {
        Some(1)
    } else if e.is_negative_infinity() {
        Some(-1)
    } else {
        None
    }
}

/// A finite constant bound, with infinities mapped to the extremes of
/// [`Index`] for comparison purposes.
fn constant_bound(e: &Expr) -> Option<Index> {
    if let Some(c) = e.as_constant() {
        return Some(c);
    }
    if e.is_positive_infinity() {
        return Some(Index::MAX);
    }
    if e.is_negative_infinity() {
        return Some(Index::MIN);
    }
    None
}

/// Decompose an expression into `constant + sum of coeff * term` where terms
/// are non-linear subtrees, then rebuild the canonical form. Shared terms
/// combine, so `(x + 1) - x` folds to `1`.
pub(crate) fn canonicalize_linear(e: &Expr) -> Expr {
    let mut terms: Vec<(Expr, Index)> = Vec::new();
    let mut constant: Index = 0;
    collect_linear(e, 1, &mut terms, &mut constant);

    // Combine structurally equal terms, keeping first-seen order so the
    // rebuild is stable under repeated simplification.
    let mut combined: Vec<(Expr, Index)> = Vec::new();
    for (term, coeff) in terms {
        match combined.iter_mut().find(|(t, _)| *t == term) {
            Some((_, c)) => *c = c.wrapping_add(coeff),
            None => combined.push((term, coeff)),
        }
    }
    combined.retain(|(_, c)| *c != 0);

    let mut result = Expr::undefined();
    for (term, coeff) in combined {
        let scaled = if coeff == 1 { term } else { Expr::mul(term, Expr::constant(coeff)) };
        result = if result.defined() { Expr::add(result, scaled) } else { scaled };
    }
    match (result.defined(), constant) {
        (false, c) => Expr::constant(c),
        (true, 0) => result,
        (true, c) => Expr::add(result, Expr::constant(c)),
    }
}

fn collect_linear(e: &Expr, factor: Index, terms: &mut Vec<(Expr, Index)>, constant: &mut Index) {
    match e.node() {
        Some(ExprNode::Constant(c)) => *constant = constant.wrapping_add(c.wrapping_mul(factor)),
        Some(ExprNode::Add(a, b)) => {
            collect_linear(a, factor, terms, constant);
            collect_linear(b, factor, terms, constant);
        }
        Some(ExprNode::Sub(a, b)) => {
            collect_linear(a, factor, terms, constant);
            collect_linear(b, factor.wrapping_neg(), terms, constant);
        }
        Some(ExprNode::Mul(a, b)) => {
            if let Some(c) = b.as_constant() {
                collect_linear(a, factor.wrapping_mul(c), terms, constant);
            } else if let Some(c) = a.as_constant() {
                collect_linear(b, factor.wrapping_mul(c), terms, constant);
            } else {
                terms.push((e.clone(), factor));
            }
        }
        _ => terms.push((e.clone(), factor)),
    }
}

/// Decompose `e` as `coeff * Variable(sym) + rest`, failing when `sym`
/// occurs non-linearly.
pub(crate) fn linear_in(e: &Expr, sym: slinky_ir::SymbolId) -> Option<(Index, Expr)> {
    let mut terms: Vec<(Expr, Index)> = Vec::new();
    let mut constant: Index = 0;
    collect_linear(e, 1, &mut terms, &mut constant);

    let mut coeff = 0;
    let mut rest: Vec<(Expr, Index)> = Vec::new();
    for (term, c) in terms {
        if term.as_variable() == Some(sym) {
            coeff += c;
        } else if slinky_ir::depends_on::depends_on(&term, sym) {
            return None;
        } else {
            rest.push((term, c));
        }
    }

    let mut rest_expr = Expr::undefined();
    for (term, c) in rest {
        let scaled = if c == 1 { term } else { Expr::mul(term, Expr::constant(c)) };
        rest_expr = if rest_expr.defined() { Expr::add(rest_expr, scaled) } else { scaled };
    }
    let rest_expr = match (rest_expr.defined(), constant) {
        (false, c) => Expr::constant(c),
        (true, 0) => rest_expr,
        (true, c) => Expr::add(rest_expr, Expr::constant(c)),
    };
    Some((coeff, rest_expr))
}
