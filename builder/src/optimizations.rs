//! Buffer aliasing, scope reduction, copy lowering, and input crop removal.

use std::collections::BTreeSet;

use tracing::debug;

use slinky_ir::depends_on::stmt_depends_on;
use slinky_ir::expr::{buffer_max, buffer_min};
use slinky_ir::{
    merge_crop, merge_crop_box, Allocate, Block, BoxExpr, CallStmt, CallTarget, CopyStmt,
    CropBuffer, CropDim, Expr, LetStmt, MakeBuffer, NodeMutator, SliceBuffer, SliceDim, Stmt,
    StmtNode, SymbolId, SymbolMap, TruncateRank,
};

use crate::error::{Error, Result};

/// Replace allocations that are consumed elementwise with aliases of the
/// consumer's output, eliminating the intermediate storage.
pub fn alias_buffers(s: &Stmt) -> Result<Stmt> {
    let mut pass = BufferAliaser::default();
    let result = pass.mutate_stmt(s);
    match pass.error {
        Some(error) => Err(error),
        None => Ok(result),
    }
}

#[derive(Default, Clone)]
struct AliasInfo {
    /// Output buffers this allocation could alias: consumers that read it
    /// elementwise and write exactly one output.
    candidates: BTreeSet<SymbolId>,
    elementwise: bool,
}

#[derive(Default)]
struct BufferAliaser {
    alias_info: SymbolMap<AliasInfo>,
    buffer_bounds: SymbolMap<BoxExpr>,
    error: Option<Error>,
}

/// A consumer access is elementwise for output `out` when the cropped input
/// region is structurally the whole current region of `out` in every
/// dimension: one point of output demands exactly that point of input.
fn is_elementwise(input_bounds: &BoxExpr, out: SymbolId) -> bool {
    let out_var = Expr::var(out);
    input_bounds.iter().enumerate().all(|(d, interval)| {
        interval.min == buffer_min(out_var.clone(), d as i64)
            && interval.max == buffer_max(out_var.clone(), d as i64)
    })
}

impl NodeMutator for BufferAliaser {
    fn visit_allocate(&mut self, s: &Stmt, op: &Allocate) -> Stmt {
        let bounds: BoxExpr = op.dims.iter().map(|d| d.bounds.clone()).collect();
        let saved_bounds = self.buffer_bounds.replace(op.sym, Some(bounds));
        let saved_info =
            self.alias_info.replace(op.sym, Some(AliasInfo { candidates: BTreeSet::new(), elementwise: true }));

        let body = self.mutate_stmt(&op.body);

        self.buffer_bounds.replace(op.sym, saved_bounds);
        let info = self.alias_info.replace(op.sym, saved_info).unwrap_or_default();

        if info.elementwise && !info.candidates.is_empty() {
            // Deterministic choice: the lowest symbol id.
            let target = *info.candidates.iter().next().expect("candidates is non-empty");
            debug!(sym = op.sym, target, "aliasing allocation to consumer output");
            // A target may back at most one alias.
            for (_, other) in self.alias_info.iter_mut() {
                other.candidates.remove(&target);
            }
            return LetStmt::make(op.sym, Expr::var(target), body);
        }

        if body.same_as(&op.body) {
            s.clone()
        } else {
            Allocate::make(op.sym, op.storage, op.elem_size, op.dims.clone(), body)
        }
    }

    fn visit_call(&mut self, s: &Stmt, op: &CallStmt) -> Stmt {
        for &input in &op.inputs {
            if !self.alias_info.contains(input) {
                continue;
            }
            let bounds = self.buffer_bounds.get(input).cloned();
            let single_output = (op.outputs.len() == 1).then(|| op.outputs[0]);
            let info = self.alias_info.get_mut(input).expect("checked above");
            match (bounds, single_output) {
                (Some(bounds), Some(out)) if is_elementwise(&bounds, out) => {
                    info.candidates.insert(out);
                }
                (Some(bounds), None) if op.outputs.iter().any(|&o| is_elementwise(&bounds, o)) => {
                    // Pointwise access, but a multi-output producer cannot
                    // donate its storage.
                }
                _ => info.elementwise = false,
            }
        }
        s.clone()
    }

    fn visit_copy(&mut self, s: &Stmt, op: &CopyStmt) -> Stmt {
        // Copies may shift coordinates or pad; never alias through them.
        if let Some(info) = self.alias_info.get_mut(op.src) {
            info.elementwise = false;
        }
        s.clone()
    }

    fn visit_crop_buffer(&mut self, s: &Stmt, op: &CropBuffer) -> Stmt {
        let mut bounds = self.buffer_bounds.get(op.sym).cloned();
        merge_crop_box(&mut bounds, &op.bounds);
        let saved = self.buffer_bounds.replace(op.sym, bounds);
        let body = self.mutate_stmt(&op.body);
        self.buffer_bounds.replace(op.sym, saved);
        if body.same_as(&op.body) { s.clone() } else { CropBuffer::make(op.sym, op.bounds.clone(), body) }
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        let mut bounds = self.buffer_bounds.get(op.sym).cloned();
        merge_crop(&mut bounds, op.dim, &op.bounds);
        let saved = self.buffer_bounds.replace(op.sym, bounds);
        let body = self.mutate_stmt(&op.body);
        self.buffer_bounds.replace(op.sym, saved);
        if body.same_as(&op.body) {
            s.clone()
        } else {
            CropDim::make(op.sym, op.dim, op.bounds.clone(), body)
        }
    }

    fn visit_slice_buffer(&mut self, s: &Stmt, _op: &SliceBuffer) -> Stmt {
        self.error.get_or_insert(Error::UnsupportedStmt { pass: "buffer aliasing", stmt: "slice_buffer" });
        s.clone()
    }

    fn visit_slice_dim(&mut self, s: &Stmt, _op: &SliceDim) -> Stmt {
        self.error.get_or_insert(Error::UnsupportedStmt { pass: "buffer aliasing", stmt: "slice_dim" });
        s.clone()
    }

    fn visit_truncate_rank(&mut self, s: &Stmt, _op: &TruncateRank) -> Stmt {
        self.error.get_or_insert(Error::UnsupportedStmt { pass: "buffer aliasing", stmt: "truncate_rank" });
        s.clone()
    }
}

/// Tighten every scoping statement around the smallest contiguous span of
/// its body that references the bound symbol.
pub fn reduce_scopes(s: &Stmt) -> Stmt {
    ScopeReducer.mutate_stmt(s)
}

struct ScopeReducer;

fn flatten_block(s: &Stmt, out: &mut Vec<Stmt>) {
    match s.node() {
        Some(StmtNode::Block(b)) => {
            flatten_block(&b.a, out);
            flatten_block(&b.b, out);
        }
        Some(_) => out.push(s.clone()),
        None => {}
    }
}

/// Split `body` into `(before, dependent span, after)` where `before` and
/// `after` do not reference `sym`.
fn split_body(body: &Stmt, sym: SymbolId) -> (Stmt, Stmt, Stmt) {
    let mut stmts = Vec::new();
    flatten_block(body, &mut stmts);

    let first = stmts.iter().position(|s| stmt_depends_on(s, sym));
    let Some(first) = first else {
        return (body.clone(), Stmt::undefined(), Stmt::undefined());
    };
    let last = stmts.iter().rposition(|s| stmt_depends_on(s, sym)).expect("first exists");

    let after = stmts.split_off(last + 1);
    let middle = stmts.split_off(first);
    (Stmt::block(stmts), Stmt::block(middle), Stmt::block(after))
}

fn clone_with_new_body(s: &Stmt, new_body: Stmt) -> Stmt {
    match s.node() {
        Some(StmtNode::LetStmt(op)) => LetStmt::make(op.sym, op.value.clone(), new_body),
        Some(StmtNode::Allocate(op)) => {
            Allocate::make(op.sym, op.storage, op.elem_size, op.dims.clone(), new_body)
        }
        Some(StmtNode::MakeBuffer(op)) => {
            MakeBuffer::make(op.sym, op.base.clone(), op.elem_size.clone(), op.dims.clone(), new_body)
        }
        Some(StmtNode::CropBuffer(op)) => CropBuffer::make(op.sym, op.bounds.clone(), new_body),
        Some(StmtNode::CropDim(op)) => CropDim::make(op.sym, op.dim, op.bounds.clone(), new_body),
        Some(StmtNode::SliceBuffer(op)) => SliceBuffer::make(op.sym, op.at.clone(), new_body),
        Some(StmtNode::SliceDim(op)) => SliceDim::make(op.sym, op.dim, op.at.clone(), new_body),
        Some(StmtNode::TruncateRank(op)) => TruncateRank::make(op.sym, op.rank, new_body),
        _ => unreachable!("not a scoping statement"),
    }
}

impl ScopeReducer {
    fn reduce(&mut self, s: &Stmt, sym: SymbolId, body: &Stmt) -> Stmt {
        let new_body = self.mutate_stmt(body);
        let (before, middle, after) = split_body(&new_body, sym);

        if middle.defined() {
            if new_body.same_as(body) && !before.defined() && !after.defined() {
                return s.clone();
            }
            Stmt::block(vec![before, clone_with_new_body(s, middle), after])
        } else {
            // Nothing in the body uses the symbol; the scope is dead.
            Stmt::block(vec![before, after])
        }
    }
}

impl NodeMutator for ScopeReducer {
    fn visit_let_stmt(&mut self, s: &Stmt, op: &LetStmt) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_allocate(&mut self, s: &Stmt, op: &Allocate) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_make_buffer(&mut self, s: &Stmt, op: &MakeBuffer) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_crop_buffer(&mut self, s: &Stmt, op: &CropBuffer) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_slice_buffer(&mut self, s: &Stmt, op: &SliceBuffer) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_slice_dim(&mut self, s: &Stmt, op: &SliceDim) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }

    fn visit_truncate_rank(&mut self, s: &Stmt, op: &TruncateRank) -> Stmt {
        self.reduce(s, op.sym, &op.body)
    }
}

/// Lower identity calls to native copies.
pub fn optimize_copies(s: &Stmt) -> Stmt {
    CopyOptimizer.mutate_stmt(s)
}

struct CopyOptimizer;

impl NodeMutator for CopyOptimizer {
    fn visit_call(&mut self, s: &Stmt, op: &CallStmt) -> Stmt {
        if let CallTarget::Copy { src_x, dst_x, padding } = &op.target {
            if let (Some(&src), Some(&dst)) = (op.inputs.first(), op.outputs.first()) {
                debug!(src, dst, "lowering identity call to copy");
                return CopyStmt::make(src, src_x.clone(), dst, dst_x.clone(), padding.clone());
            }
        }
        s.clone()
    }
}

/// Remove crops whose subject is never written beneath them. Those crops
/// carried consumer demands for bounds inference; once the shapes are final,
/// read-side access is driven entirely by the output bounds.
pub fn remove_input_crops(s: &Stmt) -> Stmt {
    let mut pass = InputCropRemover::default();
    pass.mutate_stmt(s)
}

#[derive(Default)]
struct InputCropRemover {
    used_as_output: SymbolMap<bool>,
}

impl InputCropRemover {
    fn visit_crop(
        &mut self,
        s: &Stmt,
        sym: SymbolId,
        body: &Stmt,
        rebuild: impl FnOnce(Stmt) -> Stmt,
    ) -> Stmt {
        let saved = self.used_as_output.replace(sym, Some(false));
        let new_body = self.mutate_stmt(body);
        let written = self.used_as_output.get(sym).copied().unwrap_or(false);
        if !written {
            self.used_as_output.replace(sym, saved);
            return new_body;
        }
        // Keep the crop, and let enclosing crops of the same buffer know it
        // is written below them too.
        self.used_as_output.set(sym, true);
        if new_body.same_as(body) { s.clone() } else { rebuild(new_body) }
    }
}

impl NodeMutator for InputCropRemover {
    fn visit_call(&mut self, s: &Stmt, op: &CallStmt) -> Stmt {
        for &output in &op.outputs {
            self.used_as_output.set(output, true);
        }
        s.clone()
    }

    fn visit_copy(&mut self, s: &Stmt, op: &CopyStmt) -> Stmt {
        self.used_as_output.set(op.dst, true);
        s.clone()
    }

    fn visit_crop_buffer(&mut self, s: &Stmt, op: &CropBuffer) -> Stmt {
        self.visit_crop(s, op.sym, &op.body, |body| {
            CropBuffer::make(op.sym, op.bounds.clone(), body)
        })
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        self.visit_crop(s, op.sym, &op.body, |body| {
            CropDim::make(op.sym, op.dim, op.bounds.clone(), body)
        })
    }
}
