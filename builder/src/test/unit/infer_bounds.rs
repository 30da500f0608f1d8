use smallvec::smallvec;

use slinky_ir::expr::{buffer_max, buffer_min};
use slinky_ir::{
    Allocate, CallStmt, CallTarget, CropBuffer, CropDim, Expr, IntervalExpr, Loop, LoopMode,
    MemoryType, NodeContext, Stmt, StmtNode, SymbolId,
};

use crate::error::Error;
use crate::infer_bounds::{buffer_meta_box, buffer_meta_dims, infer_bounds};

use super::{for_each_stmt, nop_callback};

struct TwoStage {
    ctx: NodeContext,
    input: SymbolId,
    intm: SymbolId,
    out: SymbolId,
    x: SymbolId,
}

fn two_stage() -> TwoStage {
    let mut ctx = NodeContext::new();
    TwoStage {
        input: ctx.insert("in"),
        intm: ctx.insert("intm"),
        out: ctx.insert("out"),
        x: ctx.insert("x"),
        ctx,
    }
}

/// The shape the pipeline builder emits for a two stage elementwise chain
/// with a consumer loop: the intermediate's producer before the loop, each
/// stage's inputs cropped to the demanded region.
fn two_stage_stmt(t: &TwoStage, consumer_crop: IntervalExpr) -> Stmt {
    let x = Expr::var(t.x);

    let produce_intm = CropBuffer::make(
        t.input,
        buffer_meta_box(t.intm, 1),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![t.input], vec![t.intm]),
    );

    let consume = CropDim::make(
        t.out,
        0,
        IntervalExpr::point(x.clone()),
        CropBuffer::make(
            t.intm,
            smallvec![consumer_crop],
            CallStmt::make(CallTarget::Callback(nop_callback()), vec![t.intm], vec![t.out]),
        ),
    );
    let consumer_loop = Loop::make(
        t.x,
        LoopMode::Serial,
        IntervalExpr::new(0.into(), 9.into()),
        1.into(),
        consume,
    );

    Allocate::make(
        t.intm,
        MemoryType::Heap,
        4,
        buffer_meta_dims(t.intm, 1),
        Stmt::block(vec![produce_intm, consumer_loop]),
    )
}

fn find_allocate(s: &Stmt, sym: SymbolId) -> Option<slinky_ir::DimExpr> {
    let mut result = None;
    for_each_stmt(s, &mut |node| {
        if let StmtNode::Allocate(op) = node {
            if op.sym == sym {
                result = Some(op.dims[0].clone());
            }
        }
    });
    result
}

#[test]
fn point_demand_unions_over_the_loop() {
    let t = two_stage();
    let x = Expr::var(t.x);
    let s = two_stage_stmt(&t, IntervalExpr::point(x));

    let result = infer_bounds(&s, &[t.input], false).unwrap();
    let dim = find_allocate(&result, t.intm).expect("allocation survives");
    assert_eq!(dim.bounds.min, Expr::constant(0));
    assert_eq!(dim.bounds.max, Expr::constant(9));
    assert_eq!(dim.stride, Expr::constant(4));
}

#[test]
fn stencil_demand_widens_the_union() {
    let t = two_stage();
    let x = Expr::var(t.x);
    let s = two_stage_stmt(&t, IntervalExpr::new(x.clone() - 1, x + 2));

    let result = infer_bounds(&s, &[t.input], false).unwrap();
    let dim = find_allocate(&result, t.intm).expect("allocation survives");
    assert_eq!(dim.bounds.min, Expr::constant(-1));
    assert_eq!(dim.bounds.max, Expr::constant(11));
}

#[test]
fn producer_is_cropped_to_the_loop_wide_region() {
    let t = two_stage();
    let x = Expr::var(t.x);
    let s = two_stage_stmt(&t, IntervalExpr::point(x));

    let result = infer_bounds(&s, &[t.input], false).unwrap();
    // A crop with the union bounds wraps the consumer loop.
    let mut found = false;
    for_each_stmt(&result, &mut |node| {
        if let StmtNode::CropBuffer(op) = node {
            if op.sym == t.intm
                && op.bounds.len() == 1
                && op.bounds[0].min == Expr::constant(0)
                && op.bounds[0].max == Expr::constant(9)
            {
                found = true;
            }
        }
    });
    assert!(found, "expected loop-wide crop of the intermediate");
}

#[test]
fn input_demand_propagates_through_the_allocation() {
    let t = two_stage();
    let x = Expr::var(t.x);
    let s = two_stage_stmt(&t, IntervalExpr::point(x));

    let result = infer_bounds(&s, &[t.input], false).unwrap();
    // The input checks must be in terms of the resolved region, not the
    // intermediate's metadata.
    let mut check_exprs = Vec::new();
    for_each_stmt(&result, &mut |node| {
        if let StmtNode::Check(op) = node {
            check_exprs.push(op.condition.clone());
        }
    });
    assert!(!check_exprs.is_empty(), "input checks expected");
    let buf = Expr::var(t.input);
    assert!(check_exprs.contains(&Expr::le(buffer_min(buf.clone(), 0), Expr::constant(0))));
    assert!(check_exprs.contains(&Expr::le(Expr::constant(9), buffer_max(buf, 0))));
}

#[test]
fn no_checks_suppresses_emission() {
    let t = two_stage();
    let x = Expr::var(t.x);
    let s = two_stage_stmt(&t, IntervalExpr::point(x));

    let result = infer_bounds(&s, &[t.input], true).unwrap();
    let mut checks = 0;
    for_each_stmt(&result, &mut |node| {
        if matches!(node, StmtNode::Check(_)) {
            checks += 1;
        }
    });
    assert_eq!(checks, 0);
}

#[test]
fn unconsumed_allocation_is_unbounded() {
    let mut ctx = NodeContext::new();
    let dead = ctx.insert("dead");
    let out = ctx.insert("out");

    let s = Allocate::make(
        dead,
        MemoryType::Heap,
        4,
        buffer_meta_dims(dead, 1),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![], vec![out]),
    );
    let err = infer_bounds(&s, &[], false).unwrap_err();
    assert_eq!(err, Error::UnboundedAllocation { symbol: dead });
}

#[test]
fn slices_are_rejected() {
    let mut ctx = NodeContext::new();
    let buf = ctx.insert("buf");
    let s = slinky_ir::SliceDim::make(
        buf,
        0,
        Expr::constant(0),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![], vec![buf]),
    );
    let err = infer_bounds(&s, &[], false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedStmt { .. }));
}
