
use slinky_ir::{Callback, RawBuffer, Stmt, StmtNode};
use std::sync::Arc;

/// Pre-order walk over every statement node, for structure assertions.
pub(crate) fn for_each_stmt(s: &Stmt, f: &mut dyn FnMut(&StmtNode)) {
    let Some(node) = s.node() else { return };
    f(node);
    match node {
        StmtNode::Block(op) => {
            for_each_stmt(&op.a, f);
            for_each_stmt(&op.b, f);
        }
        StmtNode::LetStmt(op) => for_each_stmt(&op.body, f),
        StmtNode::Loop(op) => for_each_stmt(&op.body, f),
        StmtNode::IfThenElse(op) => {
            for_each_stmt(&op.then_body, f);
            for_each_stmt(&op.else_body, f);
        }
        StmtNode::Allocate(op) => for_each_stmt(&op.body, f),
        StmtNode::MakeBuffer(op) => for_each_stmt(&op.body, f),
        StmtNode::CropBuffer(op) => for_each_stmt(&op.body, f),
        StmtNode::CropDim(op) => for_each_stmt(&op.body, f),
        StmtNode::SliceBuffer(op) => for_each_stmt(&op.body, f),
        StmtNode::SliceDim(op) => for_each_stmt(&op.body, f),
        StmtNode::TruncateRank(op) => for_each_stmt(&op.body, f),
        StmtNode::CallStmt(_) | StmtNode::CopyStmt(_) | StmtNode::Check(_) => {}
    }
}

pub(crate) fn count_allocations(s: &Stmt) -> usize {
    let mut count = 0;
    for_each_stmt(s, &mut |node| {
        if matches!(node, StmtNode::Allocate(_)) {
            count += 1;
        }
    });
    count
}

pub(crate) fn callback(
    f: impl Fn(&[RawBuffer], &mut [RawBuffer]) -> i64 + Send + Sync + 'static,
) -> Callback {
    Arc::new(f)
}
