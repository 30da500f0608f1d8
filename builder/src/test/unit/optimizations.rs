use smallvec::smallvec;

use slinky_ir::expr::{buffer_max, buffer_min};
use slinky_ir::{
    Allocate, CallStmt, CallTarget, Check, CropBuffer, DimExpr, Expr, IntervalExpr, MemoryType,
    NodeContext, Stmt, StmtNode, SymbolId,
};

use crate::optimizations::{alias_buffers, optimize_copies, reduce_scopes, remove_input_crops};

use super::{for_each_stmt, nop_callback};

fn concrete_dims() -> Vec<DimExpr> {
    vec![DimExpr {
        bounds: IntervalExpr::new(0.into(), 9.into()),
        stride: Expr::constant(4),
        fold_factor: Expr::undefined(),
    }]
}

fn whole_output_box(out: SymbolId) -> smallvec::SmallVec<[IntervalExpr; 4]> {
    let var = Expr::var(out);
    smallvec![IntervalExpr::new(buffer_min(var.clone(), 0), buffer_max(var, 0))]
}

struct Chain {
    input: SymbolId,
    t: SymbolId,
    out: SymbolId,
}

fn chain(ctx: &mut NodeContext) -> Chain {
    Chain { input: ctx.insert("in"), t: ctx.insert("t"), out: ctx.insert("out") }
}

/// `in -> t -> out` where the consumer reads `t` over exactly the region of
/// `out`: the alias candidate shape.
fn elementwise_chain(c: &Chain, consumer_outputs: Vec<SymbolId>) -> Stmt {
    let produce = CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.input], vec![c.t]);
    let consume = CropBuffer::make(
        c.t,
        whole_output_box(c.out),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.t], consumer_outputs),
    );
    Allocate::make(c.t, MemoryType::Heap, 4, concrete_dims(), Stmt::block(vec![produce, consume]))
}

fn count_nodes(s: &Stmt, mut pred: impl FnMut(&StmtNode) -> bool) -> usize {
    let mut count = 0;
    for_each_stmt(s, &mut |node| {
        if pred(node) {
            count += 1;
        }
    });
    count
}

#[test]
fn elementwise_consumer_aliases_the_allocation() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);
    let s = elementwise_chain(&c, vec![c.out]);

    let result = alias_buffers(&s).unwrap();
    assert_eq!(count_nodes(&result, |n| matches!(n, StmtNode::Allocate(_))), 0);

    let mut alias = None;
    for_each_stmt(&result, &mut |node| {
        if let StmtNode::LetStmt(op) = node {
            alias = Some((op.sym, op.value.clone()));
        }
    });
    let (sym, value) = alias.expect("allocation replaced by alias");
    assert_eq!(sym, c.t);
    assert_eq!(value, Expr::var(c.out));
}

#[test]
fn shifted_consumer_does_not_alias() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);

    let produce = CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.input], vec![c.t]);
    let shifted = smallvec![IntervalExpr::new(
        buffer_min(Expr::var(c.out), 0) - 1,
        buffer_max(Expr::var(c.out), 0),
    )];
    let consume = CropBuffer::make(
        c.t,
        shifted,
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.t], vec![c.out]),
    );
    let s = Allocate::make(c.t, MemoryType::Heap, 4, concrete_dims(), Stmt::block(vec![produce, consume]));

    let result = alias_buffers(&s).unwrap();
    assert_eq!(count_nodes(&result, |n| matches!(n, StmtNode::Allocate(_))), 1);
}

#[test]
fn multi_output_consumers_donate_no_storage() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);
    let out2 = ctx.insert("out2");
    let s = elementwise_chain(&c, vec![c.out, out2]);

    let result = alias_buffers(&s).unwrap();
    assert_eq!(count_nodes(&result, |n| matches!(n, StmtNode::Allocate(_))), 1);
}

#[test]
fn a_target_is_aliased_at_most_once() {
    let mut ctx = NodeContext::new();
    let input = ctx.insert("in");
    let t1 = ctx.insert("t1");
    let t2 = ctx.insert("t2");
    let out = ctx.insert("out");

    // Both t1 and t2 are consumed elementwise into out.
    let inner = Stmt::block(vec![
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![input], vec![t1]),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![input], vec![t2]),
        CropBuffer::make(
            t1,
            whole_output_box(out),
            CropBuffer::make(
                t2,
                whole_output_box(out),
                CallStmt::make(CallTarget::Callback(nop_callback()), vec![t1, t2], vec![out]),
            ),
        ),
    ]);
    let s = Allocate::make(
        t1,
        MemoryType::Heap,
        4,
        concrete_dims(),
        Allocate::make(t2, MemoryType::Heap, 4, concrete_dims(), inner),
    );

    let result = alias_buffers(&s).unwrap();
    assert_eq!(count_nodes(&result, |n| matches!(n, StmtNode::Allocate(_))), 1);
    assert_eq!(count_nodes(&result, |n| matches!(n, StmtNode::LetStmt(_))), 1);
}

#[test]
fn scope_reduction_hoists_independent_statements() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);
    let x = Expr::var(ctx.insert("x"));

    let body = Stmt::block(vec![
        Check::make(Expr::lt(x.clone(), 5.into())),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.input], vec![c.t]),
        Check::make(Expr::lt(x, 6.into())),
    ]);
    let s = Allocate::make(c.t, MemoryType::Heap, 4, concrete_dims(), body);

    let result = reduce_scopes(&s);
    // Root is now a block: check, allocate(call), check.
    let Some(StmtNode::Block(b)) = result.node() else { panic!("expected block") };
    assert!(matches!(b.a.node(), Some(StmtNode::Check(_))));
    let mut allocate_body_nodes = 0;
    for_each_stmt(&result, &mut |node| {
        if let StmtNode::Allocate(op) = node {
            for_each_stmt(&op.body, &mut |_| allocate_body_nodes += 1);
        }
    });
    assert_eq!(allocate_body_nodes, 1, "only the call stays inside the allocation");
}

#[test]
fn dead_scopes_are_dropped() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);
    let x = Expr::var(ctx.insert("x"));

    let s = Allocate::make(
        c.t,
        MemoryType::Heap,
        4,
        concrete_dims(),
        Check::make(Expr::lt(x, 5.into())),
    );
    let result = reduce_scopes(&s);
    assert!(matches!(result.node(), Some(StmtNode::Check(_))));
}

#[test]
fn identity_calls_lower_to_copies() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);
    let x = ctx.insert("x");

    let s = CallStmt::make(
        CallTarget::Copy { src_x: vec![Expr::var(x)], dst_x: vec![x], padding: Some(vec![0; 4]) },
        vec![c.input],
        vec![c.out],
    );
    let result = optimize_copies(&s);
    let Some(StmtNode::CopyStmt(copy)) = result.node() else { panic!("expected copy") };
    assert_eq!(copy.src, c.input);
    assert_eq!(copy.dst, c.out);
    assert_eq!(copy.padding.as_deref(), Some(&[0u8; 4][..]));
}

#[test]
fn read_only_crops_are_removed() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);

    let s = CropBuffer::make(
        c.input,
        whole_output_box(c.out),
        CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.input], vec![c.out]),
    );
    let result = remove_input_crops(&s);
    assert!(matches!(result.node(), Some(StmtNode::CallStmt(_))));
}

#[test]
fn crops_of_written_buffers_stay() {
    let mut ctx = NodeContext::new();
    let c = chain(&mut ctx);

    let s = CropBuffer::make(
        c.t,
        whole_output_box(c.out),
        Stmt::block(vec![
            CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.input], vec![c.t]),
            CallStmt::make(CallTarget::Callback(nop_callback()), vec![c.t], vec![c.out]),
        ]),
    );
    let result = remove_input_crops(&s);
    assert!(matches!(result.node(), Some(StmtNode::CropBuffer(_))));
}
