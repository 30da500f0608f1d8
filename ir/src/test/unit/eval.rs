use test_case::test_case;

use crate::eval::{eval_expr, floor_div, floor_mod};
use crate::expr::{abs, indeterminate, Expr};
use crate::symbol::NodeContext;

#[test_case(7, 2, 3; "positive")]
#[test_case(-7, 2, -4; "negative dividend rounds down")]
#[test_case(7, -2, -4; "negative divisor rounds down")]
#[test_case(-7, -2, 3; "both negative")]
#[test_case(6, 3, 2; "exact")]
#[test_case(-6, 3, -2; "exact negative")]
fn floored_division(a: i64, b: i64, expected: i64) {
    assert_eq!(floor_div(a, b), expected);
}

#[test_case(7, 2, 1; "positive")]
#[test_case(-7, 2, 1; "remainder takes divisor sign")]
#[test_case(7, -2, -1; "negative divisor")]
#[test_case(-7, -2, -1; "both negative")]
fn floored_remainder(a: i64, b: i64, expected: i64) {
    assert_eq!(floor_mod(a, b), expected);
}

#[test]
fn quotient_remainder_identity() {
    for a in -20..20 {
        for b in [-7, -3, -1, 1, 2, 5] {
            assert_eq!(floor_div(a, b) * b + floor_mod(a, b), a, "a={a} b={b}");
        }
    }
}

#[test]
fn eval_arithmetic_and_logic() {
    let mut ctx = NodeContext::new();
    let x = ctx.insert("x");
    let lookup = move |s| if s == x { Some(5) } else { None };

    let e = (Expr::var(x) + 3) * 2;
    assert_eq!(eval_expr(&e, &lookup), Some(16));

    let cmp = Expr::and(Expr::lt(Expr::var(x), 6.into()), Expr::ne(Expr::var(x), 0.into()));
    assert_eq!(eval_expr(&cmp, &lookup), Some(1));

    let sel = Expr::select(Expr::le(Expr::var(x), 4.into()), 1.into(), Expr::var(x));
    assert_eq!(eval_expr(&sel, &lookup), Some(5));

    assert_eq!(eval_expr(&abs(Expr::constant(-9)), &lookup), Some(9));
}

#[test]
fn eval_let_bindings_shadow() {
    let mut ctx = NodeContext::new();
    let x = ctx.insert("x");
    let lookup = move |s| if s == x { Some(1) } else { None };

    let e = Expr::let_(x, Expr::var(x) + 10, Expr::var(x) * 2);
    assert_eq!(eval_expr(&e, &lookup), Some(22));
}

#[test]
fn eval_unknowns_are_none() {
    let mut ctx = NodeContext::new();
    let x = ctx.insert("x");
    let lookup = |_| None;

    assert_eq!(eval_expr(&Expr::var(x), &lookup), None);
    assert_eq!(eval_expr(&indeterminate(), &lookup), None);
    assert_eq!(eval_expr(&Expr::undefined(), &lookup), None);
}
