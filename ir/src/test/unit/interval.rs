use smallvec::smallvec;

use crate::expr::Expr;
use crate::interval::{box_union, merge_crop, BoxExpr, IntervalExpr};
use crate::symbol::NodeContext;

#[test]
fn extent_is_inclusive() {
    let i = IntervalExpr::new(Expr::constant(2), Expr::constant(5));
    assert_eq!(i.extent(), Expr::constant(5) - 2 + 1);
}

#[test]
fn point_interval() {
    let mut ctx = NodeContext::new();
    let x = Expr::var(ctx.insert("x"));
    let i = IntervalExpr::point(x.clone());
    assert_eq!(i.min, x);
    assert_eq!(i.max, x);
}

#[test]
fn union_takes_min_of_mins_and_max_of_maxes() {
    let a = IntervalExpr::new(0.into(), 5.into());
    let b = IntervalExpr::new(3.into(), 9.into());
    let u = a.union(&b);
    assert_eq!(u.min, Expr::min(0.into(), 3.into()));
    assert_eq!(u.max, Expr::max(5.into(), 9.into()));
}

#[test]
fn union_with_undefined_adopts_other_bound() {
    let a = IntervalExpr::undefined();
    let b = IntervalExpr::new(3.into(), 9.into());
    let u = a.union(&b);
    assert_eq!(u.min, Expr::constant(3));
    assert_eq!(u.max, Expr::constant(9));
}

#[test]
fn intersect_swaps_roles() {
    let a = IntervalExpr::new(0.into(), 5.into());
    let b = IntervalExpr::new(3.into(), 9.into());
    let i = a.intersect(&b);
    assert_eq!(i.min, Expr::max(0.into(), 3.into()));
    assert_eq!(i.max, Expr::min(5.into(), 9.into()));
}

#[test]
fn box_union_grows_rank() {
    let mut a: BoxExpr = smallvec![IntervalExpr::new(0.into(), 1.into())];
    let b: BoxExpr =
        smallvec![IntervalExpr::new(2.into(), 3.into()), IntervalExpr::new(4.into(), 5.into())];
    box_union(&mut a, &b);
    assert_eq!(a.len(), 2);
    assert_eq!(a[1].min, Expr::constant(4));
}

#[test]
fn merge_crop_overwrites_only_defined_bounds() {
    let mut bounds: Option<BoxExpr> = None;
    merge_crop(&mut bounds, 0, &IntervalExpr::new(0.into(), 9.into()));
    merge_crop(&mut bounds, 0, &IntervalExpr::new(Expr::constant(2), Expr::undefined()));

    let b = bounds.unwrap();
    assert_eq!(b[0].min, Expr::constant(2));
    assert_eq!(b[0].max, Expr::constant(9));
}

#[test]
fn merge_crop_extends_rank() {
    let mut bounds: Option<BoxExpr> = None;
    merge_crop(&mut bounds, 2, &IntervalExpr::new(1.into(), 1.into()));
    let b = bounds.unwrap();
    assert_eq!(b.len(), 3);
    assert!(!b[0].defined());
    assert!(b[2].defined());
}
