//! Interval analysis over expressions.
//!
//! [`bounds_of`] computes symbolic lower and upper bounds for an expression
//! under an environment of known variable ranges. Unknown variables are their
//! own exact bounds; constructs with no useful bound become infinities. The
//! results are simplified expressions, so constant ranges collapse to
//! constants the comparison rules can act on.

use slinky_ir::expr::{negative_infinity, positive_infinity};
use slinky_ir::{abs, Expr, ExprNode, Intrinsic, IntervalExpr, SymbolId, SymbolMap};

use crate::simplify::{linear_in, simplify_in};

pub fn bounds_of(e: &Expr, env: &SymbolMap<IntervalExpr>) -> IntervalExpr {
    let raw = raw_bounds(e, env);
    IntervalExpr::new(simplify_in(&raw.min, env), simplify_in(&raw.max, env))
}

fn full_range() -> IntervalExpr {
    IntervalExpr::new(negative_infinity(), positive_infinity())
}

fn bool_range() -> IntervalExpr {
    IntervalExpr::new(Expr::constant(0), Expr::constant(1))
}

fn raw_bounds(e: &Expr, env: &SymbolMap<IntervalExpr>) -> IntervalExpr {
    let Some(node) = e.node() else { return full_range() };
    match node {
        ExprNode::Constant(_) => IntervalExpr::point(e.clone()),
        ExprNode::Variable(sym) => match env.get(*sym) {
            Some(range) if range.defined() => range.clone(),
            _ => IntervalExpr::point(e.clone()),
        },
        ExprNode::Wildcard(_) | ExprNode::Let { .. } => full_range(),
        ExprNode::Add(a, b) => {
            let (a, b) = (raw_bounds(a, env), raw_bounds(b, env));
            IntervalExpr::new(Expr::add(a.min, b.min), Expr::add(a.max, b.max))
        }
        ExprNode::Sub(a, b) => {
            let (a, b) = (raw_bounds(a, env), raw_bounds(b, env));
            IntervalExpr::new(Expr::sub(a.min, b.max), Expr::sub(a.max, b.min))
        }
        ExprNode::Mul(a, b) => {
            if let Some(c) = b.as_constant() {
                scale_bounds(raw_bounds(a, env), c)
            } else if let Some(c) = a.as_constant() {
                scale_bounds(raw_bounds(b, env), c)
            } else {
                full_range()
            }
        }
        ExprNode::Div(a, b) => match b.as_constant() {
            Some(c) if c > 0 => {
                let a = raw_bounds(a, env);
                IntervalExpr::new(Expr::div(a.min, Expr::constant(c)), Expr::div(a.max, Expr::constant(c)))
            }
            Some(c) if c < 0 => {
                let a = raw_bounds(a, env);
                IntervalExpr::new(Expr::div(a.max, Expr::constant(c)), Expr::div(a.min, Expr::constant(c)))
            }
            _ => full_range(),
        },
        ExprNode::Mod(_, b) => match b.as_constant() {
            // Floored remainder has the divisor's sign.
            Some(m) if m > 0 => IntervalExpr::new(Expr::constant(0), Expr::constant(m - 1)),
            Some(m) if m < 0 => IntervalExpr::new(Expr::constant(m + 1), Expr::constant(0)),
            _ => full_range(),
        },
        ExprNode::Min(a, b) => {
            let (a, b) = (raw_bounds(a, env), raw_bounds(b, env));
            IntervalExpr::new(Expr::min(a.min, b.min), Expr::min(a.max, b.max))
        }
        ExprNode::Max(a, b) => {
            let (a, b) = (raw_bounds(a, env), raw_bounds(b, env));
            IntervalExpr::new(Expr::max(a.min, b.min), Expr::max(a.max, b.max))
        }
        ExprNode::Eq(..)
        | ExprNode::Ne(..)
        | ExprNode::Lt(..)
        | ExprNode::Le(..)
        | ExprNode::And(..)
        | ExprNode::Or(..)
        | ExprNode::Not(_) => bool_range(),
        ExprNode::Select { true_value, false_value, .. } => {
            let (t, f) = (raw_bounds(true_value, env), raw_bounds(false_value, env));
            IntervalExpr::new(Expr::min(t.min, f.min), Expr::max(t.max, f.max))
        }
        ExprNode::Call { intrinsic, args } => match intrinsic {
            Intrinsic::PositiveInfinity | Intrinsic::NegativeInfinity => IntervalExpr::point(e.clone()),
            Intrinsic::Indeterminate => full_range(),
            Intrinsic::Abs => {
                let Some(x) = args.first() else { return full_range() };
                let x = raw_bounds(x, env);
                IntervalExpr::new(Expr::constant(0), Expr::max(abs(x.min), abs(x.max)))
            }
            // Buffer metadata is a concrete runtime value: exact.
            _ => IntervalExpr::point(e.clone()),
        },
    }
}

fn scale_bounds(i: IntervalExpr, c: i64) -> IntervalExpr {
    let ce = Expr::constant(c);
    if c >= 0 {
        IntervalExpr::new(Expr::mul(i.min, ce.clone()), Expr::mul(i.max, ce))
    } else {
        IntervalExpr::new(Expr::mul(i.max, ce.clone()), Expr::mul(i.min, ce))
    }
}

/// True when `e` provably evaluates to nonzero under `env`.
pub fn prove_true(e: &Expr, env: &SymbolMap<IntervalExpr>) -> bool {
    matches!(simplify_in(e, env).as_constant(), Some(c) if c != 0)
}

/// True when `e` provably evaluates to zero under `env`.
pub fn prove_false(e: &Expr, env: &SymbolMap<IntervalExpr>) -> bool {
    simplify_in(e, env).as_constant() == Some(0)
}

/// The interval of values of `sym` for which `cond` provably holds.
///
/// Handles conjunctions of comparisons that are affine in `sym`. When the
/// condition cannot be solved, the result is the empty interval
/// `[+oo, -oo]`; callers detect failure by the negative-infinity max.
pub fn where_true(cond: &Expr, sym: SymbolId, env: &SymbolMap<IntervalExpr>) -> IntervalExpr {
    let cond = simplify_in(cond, env);
    solve(&cond, sym, env)
}

fn nowhere() -> IntervalExpr {
    IntervalExpr::new(positive_infinity(), negative_infinity())
}

fn everywhere() -> IntervalExpr {
    IntervalExpr::new(negative_infinity(), positive_infinity())
}

fn solve(cond: &Expr, sym: SymbolId, env: &SymbolMap<IntervalExpr>) -> IntervalExpr {
    match cond.node() {
        Some(ExprNode::And(a, b)) => {
            let (a, b) = (solve(a, sym, env), solve(b, sym, env));
            IntervalExpr::new(
                simplify_in(&Expr::max(a.min, b.min), env),
                simplify_in(&Expr::min(a.max, b.max), env),
            )
        }
        // a <= b  <=>  (a - b) <= 0
        Some(ExprNode::Le(a, b)) => solve_le(&Expr::sub(a.clone(), b.clone()), sym, env),
        // a < b  <=>  (a - b) + 1 <= 0
        Some(ExprNode::Lt(a, b)) => {
            solve_le(&(Expr::sub(a.clone(), b.clone()) + 1), sym, env)
        }
        Some(ExprNode::Eq(a, b)) => {
            let le = solve_le(&Expr::sub(a.clone(), b.clone()), sym, env);
            let ge = solve_le(&Expr::sub(b.clone(), a.clone()), sym, env);
            IntervalExpr::new(
                simplify_in(&Expr::max(le.min, ge.min), env),
                simplify_in(&Expr::min(le.max, ge.max), env),
            )
        }
        Some(ExprNode::Constant(c)) => {
            if *c != 0 {
                everywhere()
            } else {
                nowhere()
            }
        }
        _ => nowhere(),
    }
}

/// Solve `d <= 0` for `sym` where `d` is affine in `sym`.
fn solve_le(d: &Expr, sym: SymbolId, env: &SymbolMap<IntervalExpr>) -> IntervalExpr {
    let d = simplify_in(d, env);
    let Some((coeff, rest)) = linear_in(&d, sym) else { return nowhere() };
    if rest.is_indeterminate() || rest.is_infinity() {
        return nowhere();
    }
    match coeff {
        0 => {
            if prove_true(&Expr::le(d.clone(), Expr::constant(0)), env) {
                everywhere()
            } else {
                nowhere()
            }
        }
        k if k > 0 => {
            // sym <= floor(-rest / k)
            let max = simplify_in(
                &Expr::div(Expr::sub(Expr::constant(0), rest), Expr::constant(k)),
                env,
            );
            IntervalExpr::new(negative_infinity(), max)
        }
        k => {
            // sym >= ceil(rest / -k) = floor((rest + (-k) - 1) / -k)
            let p = -k;
            let min = simplify_in(&Expr::div(rest + (p - 1), Expr::constant(p)), env);
            IntervalExpr::new(min, positive_infinity())
        }
    }
}

/// `x` rounded up to a multiple of `m` (as an expression).
pub fn align_up(x: Expr, m: Expr) -> Expr {
    Expr::div(x + (m.clone() - 1), m.clone()) * m
}

/// `x` rounded down to a multiple of `m` (as an expression).
pub fn align_down(x: Expr, m: Expr) -> Expr {
    Expr::div(x, m.clone()) * m
}
