//! Scalar expression evaluation.
//!
//! This is the arithmetic ground truth shared by the simplifier's constant
//! folding, the runtime evaluator, and the property tests. Division and
//! remainder are floored: quotients round toward negative infinity and
//! remainders take the sign of the divisor.

use crate::expr::{Expr, ExprNode, Intrinsic};
use crate::symbol::{Index, SymbolId};

/// Floored division. Division by zero yields zero so the evaluator stays
/// total; the simplifier treats constant zero divisors as indeterminate
/// before evaluation can see them.
pub fn floor_div(a: Index, b: Index) -> Index {
    if b == 0 {
        return 0;
    }
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

/// Floored remainder: `a - floor_div(a, b) * b`, zero when `b` is zero.
pub fn floor_mod(a: Index, b: Index) -> Index {
    if b == 0 {
        return 0;
    }
    a.wrapping_sub(floor_div(a, b).wrapping_mul(b))
}

/// Evaluate a scalar expression against a variable lookup.
///
/// Returns `None` when the expression is undefined, references an unknown
/// variable, or contains a non-scalar construct (infinities, indeterminate,
/// buffer intrinsics, wildcards). Arithmetic wraps on overflow, consistently
/// with the simplifier's constant folding.
pub fn eval_expr(e: &Expr, lookup: &dyn Fn(SymbolId) -> Option<Index>) -> Option<Index> {
    let mut lets = Vec::new();
    eval_with_lets(e, lookup, &mut lets)
}

fn eval_with_lets(
    e: &Expr,
    lookup: &dyn Fn(SymbolId) -> Option<Index>,
    lets: &mut Vec<(SymbolId, Index)>,
) -> Option<Index> {
    let node = e.node()?;
    match node {
        ExprNode::Variable(sym) => {
            if let Some(&(_, v)) = lets.iter().rev().find(|(s, _)| s == sym) {
                return Some(v);
            }
            lookup(*sym)
        }
        ExprNode::Constant(c) => Some(*c),
        ExprNode::Wildcard(_) => None,
        ExprNode::Let { sym, value, body } => {
            let v = eval_with_lets(value, lookup, lets)?;
            lets.push((*sym, v));
            let result = eval_with_lets(body, lookup, lets);
            lets.pop();
            result
        }
        ExprNode::Add(a, b) => binary(a, b, lookup, lets, |x, y| x.wrapping_add(y)),
        ExprNode::Sub(a, b) => binary(a, b, lookup, lets, |x, y| x.wrapping_sub(y)),
        ExprNode::Mul(a, b) => binary(a, b, lookup, lets, |x, y| x.wrapping_mul(y)),
        ExprNode::Div(a, b) => binary(a, b, lookup, lets, floor_div),
        ExprNode::Mod(a, b) => binary(a, b, lookup, lets, floor_mod),
        ExprNode::Min(a, b) => binary(a, b, lookup, lets, Index::min),
        ExprNode::Max(a, b) => binary(a, b, lookup, lets, Index::max),
        ExprNode::Eq(a, b) => binary(a, b, lookup, lets, |x, y| (x == y) as Index),
        ExprNode::Ne(a, b) => binary(a, b, lookup, lets, |x, y| (x != y) as Index),
        ExprNode::Lt(a, b) => binary(a, b, lookup, lets, |x, y| (x < y) as Index),
        ExprNode::Le(a, b) => binary(a, b, lookup, lets, |x, y| (x <= y) as Index),
        ExprNode::And(a, b) => binary(a, b, lookup, lets, |x, y| (x != 0 && y != 0) as Index),
        ExprNode::Or(a, b) => binary(a, b, lookup, lets, |x, y| (x != 0 || y != 0) as Index),
        ExprNode::Not(a) => Some((eval_with_lets(a, lookup, lets)? == 0) as Index),
        ExprNode::Select { cond, true_value, false_value } => {
            if eval_with_lets(cond, lookup, lets)? != 0 {
                eval_with_lets(true_value, lookup, lets)
            } else {
                eval_with_lets(false_value, lookup, lets)
            }
        }
        ExprNode::Call { intrinsic: Intrinsic::Abs, args } if args.len() == 1 => {
            eval_with_lets(&args[0], lookup, lets).map(Index::wrapping_abs)
        }
        ExprNode::Call { .. } => None,
    }
}

fn binary(
    a: &Expr,
    b: &Expr,
    lookup: &dyn Fn(SymbolId) -> Option<Index>,
    lets: &mut Vec<(SymbolId, Index)>,
    f: impl FnOnce(Index, Index) -> Index,
) -> Option<Index> {
    Some(f(eval_with_lets(a, lookup, lets)?, eval_with_lets(b, lookup, lets)?))
}
