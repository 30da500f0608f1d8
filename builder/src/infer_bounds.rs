//! Bounds inference.
//!
//! Walks the naively-built statement tree post-order, tracking the active
//! crop region of every buffer and accumulating, for each allocation, the
//! union of regions its consumers demand. Leaving a loop substitutes the loop
//! bounds into any inferred region that mentioned the loop variable and crops
//! the producer to the loop-wide region. At each `allocate`, the symbolic
//! `buffer_*` placeholders in the user-supplied dims are resolved against the
//! inferred region to a fixed point.

use smallvec::smallvec;
use tracing::debug;

use slinky_ir::depends_on::depends_on;
use slinky_ir::expr::{buffer_fold_factor, buffer_max, buffer_min};
use slinky_ir::substitute::substitute_expr;
use slinky_ir::{
    box_union, merge_crop, merge_crop_box, Allocate, Block, BoxExpr, Check, CropBuffer, CropDim,
    DimExpr, Expr, IntervalExpr, Loop, NodeMutator, Stmt, SymbolId, SymbolMap,
};

use crate::error::{Error, Result};
use crate::simplify::simplify;

const SUBSTITUTE_LIMIT: usize = 100;

/// Infer allocation bounds for `s`, also inferring the regions required of
/// the formal `inputs` and emitting checks that the supplied buffers cover
/// them (unless `no_checks`).
pub fn infer_bounds(s: &Stmt, inputs: &[SymbolId], no_checks: bool) -> Result<Stmt> {
    let mut inferrer = BoundsInferrer::default();
    inferrer.no_checks = no_checks;
    for &input in inputs {
        inferrer.infer.set(input, BoxExpr::new());
    }
    let result = inferrer.mutate_stmt(s);
    if let Some(error) = inferrer.error {
        return Err(error);
    }

    let mut checks = Vec::new();
    if !no_checks {
        for &input in inputs {
            let Some(bounds) = inferrer.infer.get(input) else { continue };
            let buf = Expr::var(input);
            for (d, interval) in bounds.iter().enumerate() {
                if !interval.defined() {
                    continue;
                }
                let d = d as i64;
                checks.push(Check::make(Expr::le(buffer_min(buf.clone(), d), interval.min.clone())));
                checks.push(Check::make(Expr::ge(buffer_max(buf.clone(), d), interval.max.clone())));
                checks.push(Check::make(Expr::le(
                    interval.extent(),
                    buffer_fold_factor(buf.clone(), d),
                )));
            }
        }
    }
    Ok(Block::make(Stmt::block(checks), result))
}

/// Substitute `substitutions` into `dims` until nothing changes. Dims may
/// reference their own buffer's metadata, so a single pass is not enough.
pub(crate) fn recursive_substitute(
    mut dims: Vec<DimExpr>,
    substitutions: &[(Expr, Expr)],
    sym: SymbolId,
) -> Result<Vec<DimExpr>> {
    for _ in 0..SUBSTITUTE_LIMIT {
        let mut changed = false;
        for dim in &mut dims {
            let mut new_dim = dim.clone();
            for (target, replacement) in substitutions {
                new_dim.bounds.min = substitute_expr(&new_dim.bounds.min, target, replacement);
                new_dim.bounds.max = substitute_expr(&new_dim.bounds.max, target, replacement);
                new_dim.stride = substitute_expr(&new_dim.stride, target, replacement);
                new_dim.fold_factor = substitute_expr(&new_dim.fold_factor, target, replacement);
            }
            if !new_dim.same_as(dim) {
                changed = true;
                *dim = new_dim;
            }
        }
        if !changed {
            return Ok(dims);
        }
    }
    Err(Error::UnresolvedBounds { symbol: sym })
}

#[derive(Default)]
struct BoundsInferrer {
    /// Union of consumer demands for each allocation being inferred.
    infer: SymbolMap<BoxExpr>,
    /// Active crop region per buffer.
    crops: SymbolMap<BoxExpr>,
    no_checks: bool,
    error: Option<Error>,
}

impl BoundsInferrer {
    fn record_demand(&mut self, buffer: SymbolId) {
        if !self.infer.contains(buffer) {
            return;
        }
        let Some(crop) = self.crops.get(buffer).cloned() else { return };
        let inferred = self.infer.get_mut(buffer).expect("checked above");
        box_union(inferred, &crop);
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

impl NodeMutator for BoundsInferrer {
    fn visit_call(&mut self, s: &Stmt, op: &slinky_ir::CallStmt) -> Stmt {
        for &input in &op.inputs {
            self.record_demand(input);
        }
        s.clone()
    }

    fn visit_copy(&mut self, s: &Stmt, op: &slinky_ir::CopyStmt) -> Stmt {
        self.record_demand(op.src);
        s.clone()
    }

    fn visit_crop_buffer(&mut self, s: &Stmt, op: &CropBuffer) -> Stmt {
        let mut crop = self.crops.get(op.sym).cloned();
        merge_crop_box(&mut crop, &op.bounds);
        let saved = self.crops.replace(op.sym, crop);
        let body = self.mutate_stmt(&op.body);
        self.crops.replace(op.sym, saved);
        if body.same_as(&op.body) { s.clone() } else { CropBuffer::make(op.sym, op.bounds.clone(), body) }
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        let mut crop = self.crops.get(op.sym).cloned();
        merge_crop(&mut crop, op.dim, &op.bounds);
        let saved = self.crops.replace(op.sym, crop);
        let body = self.mutate_stmt(&op.body);
        self.crops.replace(op.sym, saved);
        if body.same_as(&op.body) {
            s.clone()
        } else {
            CropDim::make(op.sym, op.dim, op.bounds.clone(), body)
        }
    }

    fn visit_slice_buffer(&mut self, s: &Stmt, _op: &slinky_ir::SliceBuffer) -> Stmt {
        self.fail(Error::UnsupportedStmt { pass: "bounds inference", stmt: "slice_buffer" });
        s.clone()
    }

    fn visit_slice_dim(&mut self, s: &Stmt, _op: &slinky_ir::SliceDim) -> Stmt {
        self.fail(Error::UnsupportedStmt { pass: "bounds inference", stmt: "slice_dim" });
        s.clone()
    }

    fn visit_truncate_rank(&mut self, s: &Stmt, _op: &slinky_ir::TruncateRank) -> Stmt {
        self.fail(Error::UnsupportedStmt { pass: "bounds inference", stmt: "truncate_rank" });
        s.clone()
    }

    fn visit_loop(&mut self, s: &Stmt, op: &Loop) -> Stmt {
        let body = self.mutate_stmt(&op.body);
        let mut result =
            if body.same_as(&op.body) { s.clone() } else { Loop::make(op.sym, op.mode, op.bounds.clone(), op.step.clone(), body) };

        // Any inferred region that mentions the loop variable is required for
        // every iteration; after the loop it is the union over the full
        // range. Substituting the loop min into the region min and the loop
        // max into the region max (taking min/max with the other endpoint)
        // handles both monotone directions.
        for buffer in self.infer.keys() {
            let Some(inferring) = self.infer.get(buffer).cloned() else { continue };
            let mut changed = false;
            let mut widened = inferring.clone();
            for interval in &mut widened {
                if interval.min.defined() && depends_on(&interval.min, op.sym) {
                    let at_min = slinky_ir::substitute::substitute(&interval.min, op.sym, &op.bounds.min);
                    let at_max = slinky_ir::substitute::substitute(&interval.min, op.sym, &op.bounds.max);
                    interval.min = simplify(&Expr::min(at_min, at_max));
                    changed = true;
                }
                if interval.max.defined() && depends_on(&interval.max, op.sym) {
                    let at_min = slinky_ir::substitute::substitute(&interval.max, op.sym, &op.bounds.min);
                    let at_max = slinky_ir::substitute::substitute(&interval.max, op.sym, &op.bounds.max);
                    interval.max = simplify(&Expr::max(at_min, at_max));
                    changed = true;
                }
            }
            if changed {
                self.infer.set(buffer, widened.clone());
                result = CropBuffer::make(buffer, widened, result);
            }
        }
        result
    }

    fn visit_allocate(&mut self, _s: &Stmt, op: &Allocate) -> Stmt {
        let saved = self.infer.replace(op.sym, Some(BoxExpr::new()));
        let body = self.mutate_stmt(&op.body);
        let bounds = self.infer.replace(op.sym, saved).unwrap_or_default();

        if bounds.len() < op.dims.len() || bounds.iter().any(|i| !i.defined()) {
            self.fail(Error::UnboundedAllocation { symbol: op.sym });
            return Allocate::make(op.sym, op.storage, op.elem_size, op.dims.clone(), body);
        }
        debug!(sym = op.sym, rank = bounds.len(), "inferred allocation bounds");

        // The dims were constructed as buffer_* placeholders on the
        // allocation itself. Resolve them against the inferred region; a dim
        // like `buffer_min(b, 0) + 10` picks up the inferred value plus the
        // user's adjustment. Strides accumulate densely, capped by the fold
        // factor which is still symbolic at this point.
        let alloc_var = Expr::var(op.sym);
        let mut substitutions: Vec<(Expr, Expr)> = Vec::new();
        let mut stride = Expr::constant(op.elem_size);
        for (d, interval) in bounds.iter().enumerate() {
            let di = d as i64;
            substitutions.push((buffer_min(alloc_var.clone(), di), interval.min.clone()));
            substitutions.push((buffer_max(alloc_var.clone(), di), interval.max.clone()));
            substitutions.push((slinky_ir::buffer_stride(alloc_var.clone(), di), stride.clone()));
            let extent = simplify(&interval.extent());
            substitutions.push((slinky_ir::buffer_extent(alloc_var.clone(), di), extent.clone()));
            stride = simplify(&Expr::mul(
                stride,
                Expr::min(extent, buffer_fold_factor(alloc_var.clone(), di)),
            ));
        }

        let dims = match recursive_substitute(op.dims.clone(), &substitutions, op.sym) {
            Ok(dims) => dims,
            Err(error) => {
                self.fail(error);
                op.dims.clone()
            }
        };

        // The user may have overridden the dims with something smaller than
        // what consumers need; these catch that at runtime. When the dims are
        // the untouched placeholders they fold away to nothing.
        let mut checks = Vec::new();
        if !self.no_checks {
            for (d, dim) in dims.iter().enumerate() {
                if let Some(interval) = bounds.get(d) {
                    checks.push(Check::make(Expr::le(dim.bounds.min.clone(), interval.min.clone())));
                    checks.push(Check::make(Expr::ge(dim.bounds.max.clone(), interval.max.clone())));
                }
            }
        }

        // Other in-flight inferred regions may reference this allocation's
        // metadata; resolve them now.
        for buffer in self.infer.keys() {
            let Some(mut inferring) = self.infer.get(buffer).cloned() else { continue };
            for interval in &mut inferring {
                for (target, replacement) in &substitutions {
                    if interval.min.defined() {
                        interval.min = substitute_expr(&interval.min, target, replacement);
                    }
                    if interval.max.defined() {
                        interval.max = substitute_expr(&interval.max, target, replacement);
                    }
                }
            }
            self.infer.set(buffer, inferring);
        }

        let alloc = Allocate::make(op.sym, op.storage, op.elem_size, dims, body);
        Block::make(Stmt::block(checks), alloc)
    }
}

/// The default crop applied to a freshly declared buffer: every dimension
/// bounded by the buffer's own metadata.
pub fn buffer_meta_dims(sym: SymbolId, rank: usize) -> Vec<DimExpr> {
    let var = Expr::var(sym);
    (0..rank)
        .map(|d| {
            let d = d as i64;
            DimExpr {
                bounds: IntervalExpr::new(buffer_min(var.clone(), d), buffer_max(var.clone(), d)),
                stride: slinky_ir::buffer_stride(var.clone(), d),
                fold_factor: buffer_fold_factor(var.clone(), d),
            }
        })
        .collect()
}

/// A box covering a whole buffer, in terms of its own metadata.
pub fn buffer_meta_box(sym: SymbolId, rank: usize) -> BoxExpr {
    let var = Expr::var(sym);
    let mut result: BoxExpr = smallvec![];
    for d in 0..rank {
        let d = d as i64;
        result.push(IntervalExpr::new(buffer_min(var.clone(), d), buffer_max(var.clone(), d)));
    }
    result
}
