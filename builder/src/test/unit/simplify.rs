use test_case::test_case;

use slinky_ir::expr::{abs, negative_infinity, positive_infinity};
use slinky_ir::{
    CallStmt, CallTarget, Check, Expr, IfThenElse, IntervalExpr, LetStmt, Loop, LoopMode, Stmt,
    StmtNode, SymbolMap,
};

use crate::simplify::{simplify, simplify_in, simplify_stmt};

use super::ctx_xy;

#[test_case(7, 2, 3; "pos_pos")]
#[test_case(-7, 2, -4; "neg_pos")]
#[test_case(7, -2, -4; "pos_neg")]
fn division_folds_floored(a: i64, b: i64, expected: i64) {
    assert_eq!(simplify(&Expr::div(a.into(), b.into())), Expr::constant(expected));
}

#[test_case(-7, 2, 1; "neg_pos")]
#[test_case(7, -2, -1; "pos_neg")]
fn remainder_folds_floored(a: i64, b: i64, expected: i64) {
    assert_eq!(simplify(&Expr::modulo(a.into(), b.into())), Expr::constant(expected));
}

#[test]
fn division_by_zero_is_indeterminate_and_poisons() {
    let (_ctx, x, _y) = ctx_xy();
    assert!(simplify(&Expr::div(x.clone(), 0.into())).is_indeterminate());
    assert!(simplify(&(Expr::div(x.clone(), 0.into()) + 5)).is_indeterminate());
    assert!(simplify(&Expr::min(Expr::div(x.clone(), 0.into()), x)).is_indeterminate());
}

#[test]
fn additive_identities() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&(x.clone() + 0)), x);
    assert_eq!(simplify(&(0 + x.clone())), x);
    assert_eq!(simplify(&(x.clone() - 0)), x);
}

#[test]
fn multiplicative_identities() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&(x.clone() * 1)), x);
    assert_eq!(simplify(&(x.clone() * 0)), Expr::constant(0));
    assert_eq!(simplify(&Expr::div(x.clone(), 1.into())), x);
    assert_eq!(simplify(&(x.clone() % 1)), Expr::constant(0));
}

#[test]
fn constants_commute_right() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&(3 + x.clone())), x.clone() + 3);
    assert_eq!(simplify(&(x.clone() - 3)), x.clone() + (-3));
    assert_eq!(simplify(&(2 * x.clone())), x * 2);
}

#[test]
fn affine_cancellation() {
    let (_ctx, x, y) = ctx_xy();
    assert_eq!(simplify(&(x.clone() - x.clone())), Expr::constant(0));
    assert_eq!(simplify(&((x.clone() + 1) - x.clone())), Expr::constant(1));
    assert_eq!(simplify(&((x.clone() - 2) - (x.clone() - 1))), Expr::constant(-1));
    assert_eq!(simplify(&((x.clone() + y.clone()) - (y.clone() + x.clone()))), Expr::constant(0));
    assert_eq!(simplify(&((x.clone() + 1) + 2)), x.clone() + 3);
    assert_eq!(simplify(&((x.clone() * 2) * 3)), x.clone() * 6);
    assert_eq!(simplify(&((x.clone() + 1) * 2)), x * 2 + 2);
}

#[test]
fn equal_affine_forms_compare_equal() {
    let (_ctx, x, y) = ctx_xy();
    let a = simplify(&((x.clone() + y.clone()) + 1));
    let b = simplify(&((y + 1) + x));
    // Same canonical terms in different source order still cancel to zero.
    assert_eq!(simplify(&Expr::sub(a, b)), Expr::constant(0));
}

#[test]
fn min_max_infinity_identities() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&Expr::min(x.clone(), positive_infinity())), x);
    assert!(simplify(&Expr::min(x.clone(), negative_infinity())).is_negative_infinity());
    assert_eq!(simplify(&Expr::max(x.clone(), negative_infinity())), x);
    assert!(simplify(&Expr::max(x.clone(), positive_infinity())).is_positive_infinity());
}

#[test]
fn min_max_resolve_by_difference() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&Expr::min(x.clone(), x.clone() + 1)), x);
    assert_eq!(simplify(&Expr::max(x.clone() + 2, x.clone())), x.clone() + 2);
    assert_eq!(simplify(&Expr::min(x.clone(), x.clone())), x);
}

#[test]
fn nested_min_constant_merge() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(
        simplify(&Expr::min(Expr::min(x.clone(), 5.into()), 3.into())),
        Expr::min(x.clone(), 3.into())
    );
    assert_eq!(
        simplify(&Expr::max(Expr::max(x.clone(), 5.into()), 3.into())),
        Expr::max(x, 5.into())
    );
}

#[test]
fn infinity_arithmetic() {
    assert!(simplify(&(positive_infinity() + 1)).is_positive_infinity());
    assert!(simplify(&(negative_infinity() + 1)).is_negative_infinity());
    assert!(simplify(&Expr::sub(positive_infinity(), negative_infinity())).is_positive_infinity());
    assert!(simplify(&Expr::sub(positive_infinity(), positive_infinity())).is_indeterminate());
    assert!(simplify(&Expr::add(positive_infinity(), negative_infinity())).is_indeterminate());
    assert!(simplify(&Expr::mul(positive_infinity(), Expr::constant(-2))).is_negative_infinity());
    assert!(simplify(&Expr::mul(positive_infinity(), Expr::constant(0))).is_indeterminate());
    assert!(simplify(&abs(negative_infinity())).is_positive_infinity());
}

#[test]
fn comparison_reflexivity() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&Expr::le(x.clone(), x.clone())), Expr::constant(1));
    assert_eq!(simplify(&Expr::lt(x.clone(), x.clone())), Expr::constant(0));
    assert_eq!(simplify(&Expr::eq(x.clone(), x.clone())), Expr::constant(1));
    assert_eq!(simplify(&Expr::ne(x.clone(), x)), Expr::constant(0));
}

#[test]
fn comparison_by_affine_difference() {
    let (_ctx, x, _y) = ctx_xy();
    assert_eq!(simplify(&Expr::le(x.clone() + 1, x.clone() + 3)), Expr::constant(1));
    assert_eq!(simplify(&Expr::lt(x.clone() + 3, x.clone() + 1)), Expr::constant(0));
    assert_eq!(simplify(&Expr::eq(x.clone() + 1, x.clone() + 2)), Expr::constant(0));
    assert_eq!(simplify(&Expr::ne(x.clone() + 1, x.clone() + 2)), Expr::constant(1));
    // Unknown differences stay symbolic.
    let undecided = simplify(&Expr::lt(x.clone(), x.clone() * 2));
    assert!(undecided.as_constant().is_none());
}

#[test]
fn comparisons_use_variable_bounds() {
    let (ctx, x, _y) = ctx_xy();
    let mut env = SymbolMap::new();
    env.set(ctx.lookup("x").unwrap(), IntervalExpr::new(0.into(), 10.into()));

    assert_eq!(simplify_in(&Expr::lt(x.clone(), 11.into()), &env), Expr::constant(1));
    assert_eq!(simplify_in(&Expr::le(Expr::constant(0), x.clone()), &env), Expr::constant(1));
    assert_eq!(simplify_in(&Expr::lt(x.clone(), 5.into()), &env).as_constant(), None);
    // Bounds also settle min/max.
    assert_eq!(simplify_in(&Expr::min(x.clone(), 10.into()), &env), x.clone());
    assert_eq!(simplify_in(&Expr::max(x.clone(), 0.into()), &env), x);
}

#[test]
fn logical_identities() {
    let (_ctx, x, _y) = ctx_xy();
    let c = Expr::lt(x.clone(), 5.into());
    assert_eq!(simplify(&Expr::and(c.clone(), 1.into())), c);
    assert_eq!(simplify(&Expr::and(c.clone(), 0.into())), Expr::constant(0));
    assert_eq!(simplify(&Expr::or(c.clone(), 0.into())), c);
    assert_eq!(simplify(&Expr::or(c.clone(), 1.into())), Expr::constant(1));
    assert_eq!(simplify(&Expr::not(Expr::not(c.clone()))), c);
    assert_eq!(simplify(&Expr::and(c.clone(), c.clone())), c);
}

#[test]
fn select_rules() {
    let (_ctx, x, y) = ctx_xy();
    assert_eq!(simplify(&Expr::select(1.into(), x.clone(), y.clone())), x);
    assert_eq!(simplify(&Expr::select(0.into(), x.clone(), y.clone())), y);
    let c = Expr::lt(x.clone(), y.clone());
    assert_eq!(simplify(&Expr::select(c, x.clone() + 1, x.clone() + 1)), x + 1);
}

#[test]
fn let_inlining() {
    let (mut ctx, x, _y) = ctx_xy();
    let t = ctx.insert("t");

    // Leaf value: always inlined.
    let e = Expr::let_(t, x.clone(), Expr::var(t) + Expr::var(t));
    assert_eq!(simplify(&e), x.clone() * 2);

    // Single use: inlined.
    let e = Expr::let_(t, x.clone() * 2, Expr::var(t) + 1);
    assert_eq!(simplify(&e), x.clone() * 2 + 1);

    // Multiple uses of a non-leaf value: kept.
    let e = Expr::let_(t, x.clone() * 2, Expr::var(t) * Expr::var(t));
    assert!(matches!(simplify(&e).node(), Some(slinky_ir::ExprNode::Let { .. })));
}

#[test]
fn simplify_is_idempotent_on_samples() {
    let (_ctx, x, y) = ctx_xy();
    let samples = [
        (x.clone() + 1) * 2 - y.clone(),
        Expr::min(x.clone(), Expr::max(y.clone(), 0.into())),
        Expr::select(Expr::lt(x.clone(), y.clone()), x.clone() % 7, Expr::div(y.clone(), 3.into())),
        Expr::le(x.clone() * 3, y.clone() * 2 + 1),
        abs(x.clone() - y.clone()),
    ];
    for e in samples {
        let once = simplify(&e);
        let twice = simplify(&once);
        assert_eq!(once, twice, "not idempotent for {e}");
    }
}

#[test]
fn check_statements_fold() {
    let (_ctx, x, _y) = ctx_xy();
    assert!(!simplify_stmt(&Check::make(Expr::le(x.clone(), x.clone()))).defined());
    let kept = simplify_stmt(&Check::make(Expr::le(x.clone(), 5.into())));
    assert!(matches!(kept.node(), Some(StmtNode::Check(_))));
    // A statically false check stays to fail at runtime.
    let false_check = simplify_stmt(&Check::make(Expr::constant(0)));
    assert!(matches!(false_check.node(), Some(StmtNode::Check(_))));
}

#[test]
fn if_with_constant_condition_folds() {
    let (_ctx, x, _y) = ctx_xy();
    let then_body = Check::make(x.clone());
    let else_body = Check::make(x.clone() + 1);
    let folded = simplify_stmt(&IfThenElse::make(Expr::le(0.into(), 0.into()), then_body.clone(), else_body));
    assert!(matches!(folded.node(), Some(StmtNode::Check(c)) if c.condition == x));
}

#[test]
fn provably_empty_loop_drops() {
    let (mut ctx, x, _y) = ctx_xy();
    let i = ctx.insert("i");
    let body = Check::make(x.clone());
    let empty = Loop::make(i, LoopMode::Serial, IntervalExpr::new(5.into(), 1.into()), 1.into(), body.clone());
    assert!(!simplify_stmt(&empty).defined());

    let live = Loop::make(i, LoopMode::Serial, IntervalExpr::new(0.into(), 4.into()), 1.into(), body);
    assert!(simplify_stmt(&live).defined());
}

#[test]
fn loop_bounds_feed_body_simplification() {
    let (mut ctx, _x, _y) = ctx_xy();
    let i = ctx.insert("i");
    let body = Check::make(Expr::lt(Expr::var(i), 100.into()));
    let l = Loop::make(i, LoopMode::Serial, IntervalExpr::new(0.into(), 9.into()), 1.into(), body);
    // i < 100 is provable inside the loop, so the check disappears and the
    // loop body becomes empty, dropping the loop.
    assert!(!simplify_stmt(&l).defined());
}

#[test]
fn buffer_lets_are_not_inlined() {
    let (mut ctx, _x, _y) = ctx_xy();
    let b = ctx.insert("b");
    let t = ctx.insert("t");
    let call = CallStmt::make(
        CallTarget::Copy { src_x: vec![], dst_x: vec![], padding: None },
        vec![b],
        vec![t],
    );
    let s = LetStmt::make(b, Expr::var(t), call);
    // The call references the symbol by id; substitution cannot reach it.
    assert!(matches!(simplify_stmt(&s).node(), Some(StmtNode::LetStmt(_))));
}

#[test]
fn scalar_let_stmts_inline() {
    let (mut ctx, x, _y) = ctx_xy();
    let t = ctx.insert("t");
    let s = LetStmt::make(t, x.clone() + 1, Check::make(Expr::le(Expr::var(t), x.clone() + 5)));
    // After substitution the check is provable and everything folds away.
    assert!(!simplify_stmt(&s).defined());
}

#[test]
fn unchanged_trees_keep_sharing() {
    let (_ctx, x, y) = ctx_xy();
    let e = Expr::min(x.clone(), y.clone());
    assert!(simplify(&e).same_as(&e));

    let s: Stmt = Check::make(Expr::lt(x, y));
    assert!(simplify_stmt(&s).same_as(&s));
}
