//! Expression nodes.
//!
//! Expressions are immutable trees of reference-counted nodes with structural
//! sharing; rewrites build new trees and use pointer identity ([`Expr::same_as`])
//! to short-circuit unchanged subtrees. An [`Expr`] handle may be *undefined*,
//! which is how absent bounds and fold factors are represented throughout the
//! IR.

use std::sync::Arc;

use crate::symbol::{Index, SymbolId};

/// Intrinsic functions callable from expressions.
///
/// The `Buffer*` intrinsics are symbolic accessors for the fields of a buffer
/// that is in scope at evaluation time. The builder emits them as
/// placeholders; bounds inference replaces most of them with concrete
/// expressions before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    PositiveInfinity,
    NegativeInfinity,
    Indeterminate,
    Abs,
    BufferRank,
    BufferBase,
    BufferElemSize,
    BufferSizeBytes,
    BufferMin,
    BufferMax,
    BufferStride,
    BufferFoldFactor,
    BufferExtent,
    BufferAt,
}

/// One node of an expression tree. All arithmetic is on [`Index`] values;
/// comparisons and logic produce 0 or 1.
#[derive(Debug)]
pub enum ExprNode {
    Variable(SymbolId),
    Constant(Index),
    /// Matches any expression in [`crate::substitute::match_expr`] patterns.
    Wildcard(SymbolId),
    Let { sym: SymbolId, value: Expr, body: Expr },
    Add(Expr, Expr),
    Sub(Expr, Expr),
    Mul(Expr, Expr),
    /// Floored division: quotient rounded toward negative infinity.
    Div(Expr, Expr),
    /// Floored remainder: takes the sign of the divisor.
    Mod(Expr, Expr),
    Min(Expr, Expr),
    Max(Expr, Expr),
    Eq(Expr, Expr),
    Ne(Expr, Expr),
    Lt(Expr, Expr),
    Le(Expr, Expr),
    And(Expr, Expr),
    Or(Expr, Expr),
    Not(Expr),
    Select { cond: Expr, true_value: Expr, false_value: Expr },
    Call { intrinsic: Intrinsic, args: Vec<Expr> },
}

/// A possibly-undefined handle to an [`ExprNode`].
#[derive(Debug, Clone, Default)]
pub struct Expr {
    node: Option<Arc<ExprNode>>,
}

impl Expr {
    fn new(node: ExprNode) -> Expr {
        Expr { node: Some(Arc::new(node)) }
    }

    /// An undefined expression.
    pub fn undefined() -> Expr {
        Expr { node: None }
    }

    pub fn defined(&self) -> bool {
        self.node.is_some()
    }

    pub fn node(&self) -> Option<&ExprNode> {
        self.node.as_deref()
    }

    /// Pointer identity: true when both handles refer to the same allocation
    /// (or both are undefined).
    pub fn same_as(&self, other: &Expr) -> bool {
        match (&self.node, &other.node) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn var(sym: SymbolId) -> Expr {
        Expr::new(ExprNode::Variable(sym))
    }

    pub fn constant(value: Index) -> Expr {
        Expr::new(ExprNode::Constant(value))
    }

    pub fn wildcard(sym: SymbolId) -> Expr {
        Expr::new(ExprNode::Wildcard(sym))
    }

    pub fn let_(sym: SymbolId, value: Expr, body: Expr) -> Expr {
        Expr::new(ExprNode::Let { sym, value, body })
    }

    pub fn add(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Add(a, b))
    }

    pub fn sub(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Sub(a, b))
    }

    pub fn mul(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Mul(a, b))
    }

    pub fn div(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Div(a, b))
    }

    pub fn modulo(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Mod(a, b))
    }

    pub fn min(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Min(a, b))
    }

    pub fn max(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Max(a, b))
    }

    pub fn eq(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Eq(a, b))
    }

    pub fn ne(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Ne(a, b))
    }

    pub fn lt(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Lt(a, b))
    }

    pub fn le(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Le(a, b))
    }

    /// `a > b` desugars to `b < a`.
    pub fn gt(a: Expr, b: Expr) -> Expr {
        Expr::lt(b, a)
    }

    /// `a >= b` desugars to `b <= a`.
    pub fn ge(a: Expr, b: Expr) -> Expr {
        Expr::le(b, a)
    }

    pub fn and(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::And(a, b))
    }

    pub fn or(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Or(a, b))
    }

    pub fn not(a: Expr) -> Expr {
        Expr::new(ExprNode::Not(a))
    }

    pub fn select(cond: Expr, true_value: Expr, false_value: Expr) -> Expr {
        Expr::new(ExprNode::Select { cond, true_value, false_value })
    }

    pub fn call(intrinsic: Intrinsic, args: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Call { intrinsic, args })
    }

    pub fn as_constant(&self) -> Option<Index> {
        match self.node() {
            Some(ExprNode::Constant(c)) => Some(*c),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<SymbolId> {
        match self.node() {
            Some(ExprNode::Variable(s)) => Some(*s),
            _ => None,
        }
    }

    pub fn is_constant(&self, value: Index) -> bool {
        self.as_constant() == Some(value)
    }

    fn is_nullary_call(&self, intrinsic: Intrinsic) -> bool {
        matches!(self.node(), Some(ExprNode::Call { intrinsic: i, args }) if *i == intrinsic && args.is_empty())
    }

    pub fn is_positive_infinity(&self) -> bool {
        self.is_nullary_call(Intrinsic::PositiveInfinity)
    }

    pub fn is_negative_infinity(&self) -> bool {
        self.is_nullary_call(Intrinsic::NegativeInfinity)
    }

    pub fn is_infinity(&self) -> bool {
        self.is_positive_infinity() || self.is_negative_infinity()
    }

    pub fn is_indeterminate(&self) -> bool {
        self.is_nullary_call(Intrinsic::Indeterminate)
    }
}

impl From<Index> for Expr {
    fn from(value: Index) -> Expr {
        Expr::constant(value)
    }
}

/// Structural equality, with a pointer-identity fast path. Undefined
/// expressions compare equal to each other.
impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        if self.same_as(other) {
            return true;
        }
        match (self.node(), other.node()) {
            (Some(a), Some(b)) => nodes_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Expr {}

fn nodes_equal(a: &ExprNode, b: &ExprNode) -> bool {
    use ExprNode::*;
    match (a, b) {
        (Variable(x), Variable(y)) | (Wildcard(x), Wildcard(y)) => x == y,
        (Constant(x), Constant(y)) => x == y,
        (Let { sym: sa, value: va, body: ba }, Let { sym: sb, value: vb, body: bb }) => {
            sa == sb && va == vb && ba == bb
        }
        (Add(xa, ya), Add(xb, yb))
        | (Sub(xa, ya), Sub(xb, yb))
        | (Mul(xa, ya), Mul(xb, yb))
        | (Div(xa, ya), Div(xb, yb))
        | (Mod(xa, ya), Mod(xb, yb))
        | (Min(xa, ya), Min(xb, yb))
        | (Max(xa, ya), Max(xb, yb))
        | (Eq(xa, ya), Eq(xb, yb))
        | (Ne(xa, ya), Ne(xb, yb))
        | (Lt(xa, ya), Lt(xb, yb))
        | (Le(xa, ya), Le(xb, yb))
        | (And(xa, ya), And(xb, yb))
        | (Or(xa, ya), Or(xb, yb)) => xa == xb && ya == yb,
        (Not(x), Not(y)) => x == y,
        (
            Select { cond: ca, true_value: ta, false_value: fa },
            Select { cond: cb, true_value: tb, false_value: fb },
        ) => ca == cb && ta == tb && fa == fb,
        (Call { intrinsic: ia, args: aa }, Call { intrinsic: ib, args: ab }) => {
            ia == ib && aa.len() == ab.len() && aa.iter().zip(ab).all(|(x, y)| x == y)
        }
        _ => false,
    }
}

// Operator overloads build nodes without simplification; the simplifier is a
// separate, explicit step.

impl<R: Into<Expr>> std::ops::Add<R> for Expr {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        Expr::add(self, rhs.into())
    }
}

impl<R: Into<Expr>> std::ops::Sub<R> for Expr {
    type Output = Expr;
    fn sub(self, rhs: R) -> Expr {
        Expr::sub(self, rhs.into())
    }
}

impl<R: Into<Expr>> std::ops::Mul<R> for Expr {
    type Output = Expr;
    fn mul(self, rhs: R) -> Expr {
        Expr::mul(self, rhs.into())
    }
}

impl<R: Into<Expr>> std::ops::Div<R> for Expr {
    type Output = Expr;
    fn div(self, rhs: R) -> Expr {
        Expr::div(self, rhs.into())
    }
}

impl<R: Into<Expr>> std::ops::Rem<R> for Expr {
    type Output = Expr;
    fn rem(self, rhs: R) -> Expr {
        Expr::modulo(self, rhs.into())
    }
}

impl std::ops::Add<Expr> for Index {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::add(Expr::constant(self), rhs)
    }
}

impl std::ops::Sub<Expr> for Index {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::sub(Expr::constant(self), rhs)
    }
}

impl std::ops::Mul<Expr> for Index {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::mul(Expr::constant(self), rhs)
    }
}

pub fn positive_infinity() -> Expr {
    Expr::call(Intrinsic::PositiveInfinity, Vec::new())
}

pub fn negative_infinity() -> Expr {
    Expr::call(Intrinsic::NegativeInfinity, Vec::new())
}

pub fn indeterminate() -> Expr {
    Expr::call(Intrinsic::Indeterminate, Vec::new())
}

pub fn abs(x: Expr) -> Expr {
    Expr::call(Intrinsic::Abs, vec![x])
}

fn buffer_meta(intrinsic: Intrinsic, buffer: Expr, dim: Index) -> Expr {
    Expr::call(intrinsic, vec![buffer, Expr::constant(dim)])
}

pub fn buffer_rank(buffer: Expr) -> Expr {
    Expr::call(Intrinsic::BufferRank, vec![buffer])
}

pub fn buffer_base(buffer: Expr) -> Expr {
    Expr::call(Intrinsic::BufferBase, vec![buffer])
}

pub fn buffer_elem_size(buffer: Expr) -> Expr {
    Expr::call(Intrinsic::BufferElemSize, vec![buffer])
}

pub fn buffer_size_bytes(buffer: Expr) -> Expr {
    Expr::call(Intrinsic::BufferSizeBytes, vec![buffer])
}

pub fn buffer_min(buffer: Expr, dim: Index) -> Expr {
    buffer_meta(Intrinsic::BufferMin, buffer, dim)
}

pub fn buffer_max(buffer: Expr, dim: Index) -> Expr {
    buffer_meta(Intrinsic::BufferMax, buffer, dim)
}

pub fn buffer_stride(buffer: Expr, dim: Index) -> Expr {
    buffer_meta(Intrinsic::BufferStride, buffer, dim)
}

pub fn buffer_fold_factor(buffer: Expr, dim: Index) -> Expr {
    buffer_meta(Intrinsic::BufferFoldFactor, buffer, dim)
}

pub fn buffer_extent(buffer: Expr, dim: Index) -> Expr {
    buffer_meta(Intrinsic::BufferExtent, buffer, dim)
}

pub fn buffer_at(buffer: Expr, coords: Vec<Expr>) -> Expr {
    let mut args = Vec::with_capacity(coords.len() + 1);
    args.push(buffer);
    args.extend(coords);
    Expr::call(Intrinsic::BufferAt, args)
}
