//! Symbol dependence queries.
//!
//! A node depends on a symbol when it references it as a variable, as a
//! buffer argument of a call or copy, or as the subject of a crop, slice,
//! allocation, or binding. Ids are unique within a context, so shadowing is
//! not considered.

use crate::expr::{Expr, ExprNode};
use crate::interval::{BoxExpr, DimExpr, IntervalExpr};
use crate::stmt::{Stmt, StmtNode};
use crate::symbol::SymbolId;

pub fn depends_on(e: &Expr, sym: SymbolId) -> bool {
    depends_on_any(e, &[sym])
}

pub fn depends_on_any(e: &Expr, syms: &[SymbolId]) -> bool {
    let Some(node) = e.node() else { return false };
    match node {
        ExprNode::Variable(s) | ExprNode::Wildcard(s) => syms.contains(s),
        ExprNode::Constant(_) => false,
        ExprNode::Let { sym, value, body } => {
            syms.contains(sym) || depends_on_any(value, syms) || depends_on_any(body, syms)
        }
        ExprNode::Add(a, b)
        | ExprNode::Sub(a, b)
        | ExprNode::Mul(a, b)
        | ExprNode::Div(a, b)
        | ExprNode::Mod(a, b)
        | ExprNode::Min(a, b)
        | ExprNode::Max(a, b)
        | ExprNode::Eq(a, b)
        | ExprNode::Ne(a, b)
        | ExprNode::Lt(a, b)
        | ExprNode::Le(a, b)
        | ExprNode::And(a, b)
        | ExprNode::Or(a, b) => depends_on_any(a, syms) || depends_on_any(b, syms),
        ExprNode::Not(a) => depends_on_any(a, syms),
        ExprNode::Select { cond, true_value, false_value } => {
            depends_on_any(cond, syms)
                || depends_on_any(true_value, syms)
                || depends_on_any(false_value, syms)
        }
        ExprNode::Call { args, .. } => args.iter().any(|a| depends_on_any(a, syms)),
    }
}

pub fn interval_depends_on(i: &IntervalExpr, sym: SymbolId) -> bool {
    depends_on(&i.min, sym) || depends_on(&i.max, sym)
}

fn box_depends_on_any(b: &BoxExpr, syms: &[SymbolId]) -> bool {
    b.iter().any(|i| depends_on_any(&i.min, syms) || depends_on_any(&i.max, syms))
}

fn dims_depend_on_any(dims: &[DimExpr], syms: &[SymbolId]) -> bool {
    dims.iter().any(|d| {
        depends_on_any(&d.bounds.min, syms)
            || depends_on_any(&d.bounds.max, syms)
            || depends_on_any(&d.stride, syms)
            || depends_on_any(&d.fold_factor, syms)
    })
}

pub fn stmt_depends_on(s: &Stmt, sym: SymbolId) -> bool {
    stmt_depends_on_any(s, &[sym])
}

pub fn stmt_depends_on_any(s: &Stmt, syms: &[SymbolId]) -> bool {
    let Some(node) = s.node() else { return false };
    match node {
        StmtNode::Block(op) => stmt_depends_on_any(&op.a, syms) || stmt_depends_on_any(&op.b, syms),
        StmtNode::LetStmt(op) => {
            syms.contains(&op.sym) || depends_on_any(&op.value, syms) || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::Loop(op) => {
            syms.contains(&op.sym)
                || depends_on_any(&op.bounds.min, syms)
                || depends_on_any(&op.bounds.max, syms)
                || depends_on_any(&op.step, syms)
                || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::IfThenElse(op) => {
            depends_on_any(&op.condition, syms)
                || stmt_depends_on_any(&op.then_body, syms)
                || stmt_depends_on_any(&op.else_body, syms)
        }
        StmtNode::CallStmt(op) => {
            op.inputs.iter().chain(&op.outputs).any(|s| syms.contains(s))
                || match &op.target {
                    crate::stmt::CallTarget::Copy { src_x, dst_x, .. } => {
                        dst_x.iter().any(|s| syms.contains(s))
                            || src_x.iter().any(|e| depends_on_any(e, syms))
                    }
                    crate::stmt::CallTarget::Callback(_) => false,
                }
        }
        StmtNode::CopyStmt(op) => {
            syms.contains(&op.src)
                || syms.contains(&op.dst)
                || op.dst_x.iter().any(|s| syms.contains(s))
                || op.src_x.iter().any(|e| depends_on_any(e, syms))
        }
        StmtNode::Allocate(op) => {
            syms.contains(&op.sym)
                || dims_depend_on_any(&op.dims, syms)
                || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::MakeBuffer(op) => {
            syms.contains(&op.sym)
                || depends_on_any(&op.base, syms)
                || depends_on_any(&op.elem_size, syms)
                || dims_depend_on_any(&op.dims, syms)
                || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::CropBuffer(op) => {
            syms.contains(&op.sym)
                || box_depends_on_any(&op.bounds, syms)
                || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::CropDim(op) => {
            syms.contains(&op.sym)
                || depends_on_any(&op.bounds.min, syms)
                || depends_on_any(&op.bounds.max, syms)
                || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::SliceBuffer(op) => {
            syms.contains(&op.sym)
                || op.at.iter().any(|e| depends_on_any(e, syms))
                || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::SliceDim(op) => {
            syms.contains(&op.sym) || depends_on_any(&op.at, syms) || stmt_depends_on_any(&op.body, syms)
        }
        StmtNode::TruncateRank(op) => syms.contains(&op.sym) || stmt_depends_on_any(&op.body, syms),
        StmtNode::Check(op) => depends_on_any(&op.condition, syms),
    }
}

/// Count free occurrences of `sym` in expression position. Binding nodes for
/// other symbols are traversed; a `Let` rebinding `sym` shadows it.
pub fn count_uses(e: &Expr, sym: SymbolId) -> usize {
    let Some(node) = e.node() else { return 0 };
    match node {
        ExprNode::Variable(s) => usize::from(*s == sym),
        ExprNode::Constant(_) | ExprNode::Wildcard(_) => 0,
        ExprNode::Let { sym: bound, value, body } => {
            count_uses(value, sym) + if *bound == sym { 0 } else { count_uses(body, sym) }
        }
        ExprNode::Add(a, b)
        | ExprNode::Sub(a, b)
        | ExprNode::Mul(a, b)
        | ExprNode::Div(a, b)
        | ExprNode::Mod(a, b)
        | ExprNode::Min(a, b)
        | ExprNode::Max(a, b)
        | ExprNode::Eq(a, b)
        | ExprNode::Ne(a, b)
        | ExprNode::Lt(a, b)
        | ExprNode::Le(a, b)
        | ExprNode::And(a, b)
        | ExprNode::Or(a, b) => count_uses(a, sym) + count_uses(b, sym),
        ExprNode::Not(a) => count_uses(a, sym),
        ExprNode::Select { cond, true_value, false_value } => {
            count_uses(cond, sym) + count_uses(true_value, sym) + count_uses(false_value, sym)
        }
        ExprNode::Call { args, .. } => args.iter().map(|a| count_uses(a, sym)).sum(),
    }
}

/// Counts of how a statement references a symbol: in expression position
/// (substitutable) versus as a buffer/binding id (not substitutable).
#[derive(Debug, Default, Clone, Copy)]
pub struct StmtUses {
    pub expr_uses: usize,
    pub id_uses: usize,
}

pub fn stmt_count_uses(s: &Stmt, sym: SymbolId) -> StmtUses {
    let mut uses = StmtUses::default();
    stmt_count_uses_into(s, sym, &mut uses);
    uses
}

fn count_into(e: &Expr, sym: SymbolId, uses: &mut StmtUses) {
    uses.expr_uses += count_uses(e, sym);
}

fn id_into(s: SymbolId, sym: SymbolId, uses: &mut StmtUses) {
    if s == sym {
        uses.id_uses += 1;
    }
}

fn stmt_count_uses_into(s: &Stmt, sym: SymbolId, uses: &mut StmtUses) {
    let Some(node) = s.node() else { return };
    match node {
        StmtNode::Block(op) => {
            stmt_count_uses_into(&op.a, sym, uses);
            stmt_count_uses_into(&op.b, sym, uses);
        }
        StmtNode::LetStmt(op) => {
            count_into(&op.value, sym, uses);
            if op.sym != sym {
                stmt_count_uses_into(&op.body, sym, uses);
            }
        }
        StmtNode::Loop(op) => {
            count_into(&op.bounds.min, sym, uses);
            count_into(&op.bounds.max, sym, uses);
            count_into(&op.step, sym, uses);
            if op.sym != sym {
                stmt_count_uses_into(&op.body, sym, uses);
            }
        }
        StmtNode::IfThenElse(op) => {
            count_into(&op.condition, sym, uses);
            stmt_count_uses_into(&op.then_body, sym, uses);
            stmt_count_uses_into(&op.else_body, sym, uses);
        }
        StmtNode::CallStmt(op) => {
            op.inputs.iter().chain(&op.outputs).for_each(|&s| id_into(s, sym, uses));
            if let crate::stmt::CallTarget::Copy { src_x, dst_x, .. } = &op.target {
                dst_x.iter().for_each(|&s| id_into(s, sym, uses));
                src_x.iter().for_each(|e| count_into(e, sym, uses));
            }
        }
        StmtNode::CopyStmt(op) => {
            id_into(op.src, sym, uses);
            id_into(op.dst, sym, uses);
            op.dst_x.iter().for_each(|&s| id_into(s, sym, uses));
            op.src_x.iter().for_each(|e| count_into(e, sym, uses));
        }
        StmtNode::Allocate(op) => {
            for d in &op.dims {
                count_into(&d.bounds.min, sym, uses);
                count_into(&d.bounds.max, sym, uses);
                count_into(&d.stride, sym, uses);
                count_into(&d.fold_factor, sym, uses);
            }
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::MakeBuffer(op) => {
            count_into(&op.base, sym, uses);
            count_into(&op.elem_size, sym, uses);
            for d in &op.dims {
                count_into(&d.bounds.min, sym, uses);
                count_into(&d.bounds.max, sym, uses);
                count_into(&d.stride, sym, uses);
                count_into(&d.fold_factor, sym, uses);
            }
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::CropBuffer(op) => {
            id_into(op.sym, sym, uses);
            for i in &op.bounds {
                count_into(&i.min, sym, uses);
                count_into(&i.max, sym, uses);
            }
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::CropDim(op) => {
            id_into(op.sym, sym, uses);
            count_into(&op.bounds.min, sym, uses);
            count_into(&op.bounds.max, sym, uses);
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::SliceBuffer(op) => {
            id_into(op.sym, sym, uses);
            op.at.iter().for_each(|e| count_into(e, sym, uses));
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::SliceDim(op) => {
            id_into(op.sym, sym, uses);
            count_into(&op.at, sym, uses);
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::TruncateRank(op) => {
            id_into(op.sym, sym, uses);
            stmt_count_uses_into(&op.body, sym, uses);
        }
        StmtNode::Check(op) => count_into(&op.condition, sym, uses),
    }
}
