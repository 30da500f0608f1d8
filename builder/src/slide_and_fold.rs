//! Sliding-window and storage-folding.
//!
//! When a producer is computed inside a serial loop and the region its
//! consumer demands moves monotonically with the loop variable, each
//! iteration only needs to compute the part not covered by the previous
//! iteration, and the storage only needs to hold one window's worth of data,
//! addressed modulo a fold factor.

use tracing::debug;

use slinky_ir::depends_on::{depends_on, interval_depends_on, stmt_depends_on};
use slinky_ir::expr::positive_infinity;
use slinky_ir::substitute::{substitute, substitute_buffer_bounds, substitute_expr};
use slinky_ir::{
    merge_crop, merge_crop_box, Allocate, Block, BoxExpr, CropBuffer, CropDim, Expr, IntervalExpr,
    LetStmt, Loop, LoopMode, NodeContext, NodeMutator, Stmt, SymbolId, SymbolMap, Var,
};

use crate::bounds::{align_up, bounds_of, prove_true, where_true};
use crate::error::{Error, Result};
use crate::infer_bounds::recursive_substitute;
use crate::simplify::simplify;

pub fn slide_and_fold_storage(s: &Stmt, ctx: &mut NodeContext) -> Result<Stmt> {
    let x = Var::from_sym(ctx.insert_unique("_x"));
    let mut pass = SlideAndFold {
        ctx,
        buffer_bounds: SymbolMap::new(),
        fold_factors: SymbolMap::new(),
        loops: Vec::new(),
        x,
        error: None,
    };
    let result = pass.mutate_stmt(s);
    match pass.error {
        Some(error) => Err(error),
        None => Ok(result),
    }
}

struct LoopInfo {
    sym: SymbolId,
    /// Fresh variable standing for the loop's original min while the body is
    /// being rewritten; bound by a `let` if anything ends up using it.
    orig_min: Var,
    bounds: IntervalExpr,
    step: Expr,
}

struct SlideAndFold<'a> {
    ctx: &'a mut NodeContext,
    buffer_bounds: SymbolMap<BoxExpr>,
    fold_factors: SymbolMap<(usize, Expr)>,
    loops: Vec<LoopInfo>,
    /// Unknown used to solve for new loop bounds.
    x: Var,
    error: Option<Error>,
}

impl SlideAndFold<'_> {
    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Substitute other buffers' current bounds into a crop region, so
    /// bounds phrased in terms of producer metadata stay comparable.
    fn resolve_buffer_meta(&self, bounds: &mut BoxExpr) {
        for interval in bounds.iter_mut() {
            for (sym, known) in self.buffer_bounds.iter() {
                if interval.min.defined() {
                    interval.min = substitute_buffer_bounds(&interval.min, sym, known);
                }
                if interval.max.defined() {
                    interval.max = substitute_buffer_bounds(&interval.max, sym, known);
                }
            }
        }
    }

    fn slide_output(&mut self, output: SymbolId) {
        let Some(mut bounds) = self.buffer_bounds.get(output).cloned() else { return };
        let env = SymbolMap::new();

        for l in 0..self.loops.len() {
            let loop_sym = self.loops[l].sym;
            let loop_var = Expr::var(loop_sym);
            let loop_max = self.loops[l].bounds.max.clone();
            let loop_step = self.loops[l].step.clone();

            for d in 0..bounds.len() {
                let cur = bounds[d].clone();
                if !cur.defined() || !interval_depends_on(&cur, loop_sym) {
                    // The region is the same every iteration; nothing to
                    // slide and nothing to fold.
                    continue;
                }

                let prev_var = simplify(&(loop_var.clone() - loop_step.clone()));
                let prev = IntervalExpr::new(
                    substitute(&cur.min, loop_sym, &prev_var),
                    substitute(&cur.max, loop_sym, &prev_var),
                );

                // Expressions like min(loop_max, e) resist the monotonicity
                // proofs even though e is bounded by the loop range, so
                // discharge them by substituting infinity for the loop max.
                // The extent is never larger than the loop allows, so this
                // only weakens the bound.
                let ignore_loop_max =
                    |e: &Expr| substitute_expr(e, &loop_max, &positive_infinity());

                let overlap = prev.clone().intersect(&cur);
                if prove_true(&ignore_loop_max(&overlap.empty()), &env) {
                    // Iterations touch disjoint regions: no work to reuse,
                    // but the storage can wrap around.
                    let fold = simplify(&bounds_of(&ignore_loop_max(&cur.extent()), &env).max);
                    if !depends_on(&fold, loop_sym) {
                        debug!(sym = output, dim = d, %fold, "folding non-overlapping dimension");
                        self.fold_factors.set(output, (d, fold));
                    }
                    continue;
                }

                let monotone_increasing = Expr::and(
                    Expr::le(prev.min.clone(), cur.min.clone()),
                    Expr::le(prev.max.clone(), cur.max.clone()),
                );
                let monotone_decreasing = Expr::and(
                    Expr::ge(prev.min.clone(), cur.min.clone()),
                    Expr::ge(prev.max.clone(), cur.max.clone()),
                );

                if prove_true(&ignore_loop_max(&monotone_increasing), &env) {
                    // Overlapping and marching forward: compute only the
                    // leading edge each iteration.
                    let old_min = cur.min.clone();
                    let new_min = simplify(&(prev.max.clone() + 1));

                    let fold = simplify(&bounds_of(&ignore_loop_max(&cur.extent()), &env).max);
                    if !depends_on(&fold, loop_sym) {
                        // Align so a crop never straddles the wrap boundary.
                        let fold = simplify(&align_up(fold, loop_step.clone()));
                        debug!(sym = output, dim = d, %fold, "folding slid dimension");
                        self.fold_factors.set(output, (d, fold));
                    }

                    // Computing only the leading edge means earlier points
                    // must come from earlier iterations, so the loop has to
                    // start early enough to warm up. Find the largest start
                    // that still covers the original first region.
                    let new_min_at_x = substitute(&new_min, loop_sym, &Expr::var(self.x.sym()));
                    let old_min_at_loop_min =
                        substitute(&old_min, loop_sym, &self.loops[l].bounds.min);
                    let solved = where_true(
                        &ignore_loop_max(&Expr::le(new_min_at_x, old_min_at_loop_min)),
                        self.x.sym(),
                        &env,
                    );
                    if !solved.max.is_negative_infinity() {
                        debug!(sym = output, dim = d, new_min = %solved.max, "moving loop min for warm-up");
                        self.loops[l].bounds.min = solved.max;
                        bounds[d].min = new_min;
                    } else {
                        // No finite start exists; warm up on the first
                        // iteration instead.
                        let orig_min = Expr::var(self.loops[l].orig_min.sym());
                        bounds[d].min = Expr::select(
                            Expr::eq(loop_var.clone(), orig_min),
                            old_min,
                            new_min,
                        );
                    }
                    self.buffer_bounds.set(output, bounds.clone());
                    break;
                } else if prove_true(&ignore_loop_max(&monotone_decreasing), &env) {
                    // Marching backward is rare; leave it untransformed.
                }
            }
        }
    }
}

impl NodeMutator for SlideAndFold<'_> {
    fn visit_call(&mut self, s: &Stmt, op: &slinky_ir::CallStmt) -> Stmt {
        for &output in &op.outputs {
            self.slide_output(output);
        }
        s.clone()
    }

    fn visit_copy(&mut self, s: &Stmt, op: &slinky_ir::CopyStmt) -> Stmt {
        self.slide_output(op.dst);
        s.clone()
    }

    fn visit_allocate(&mut self, _s: &Stmt, op: &Allocate) -> Stmt {
        let bounds: BoxExpr = op.dims.iter().map(|d| d.bounds.clone()).collect();
        let saved = self.buffer_bounds.replace(op.sym, Some(bounds));
        let body = self.mutate_stmt(&op.body);
        self.buffer_bounds.replace(op.sym, saved);

        // Resolve the fold factor placeholders: the recorded factor where we
        // found one, infinity (erased to undefined) everywhere else.
        let fold_info = self.fold_factors.get(op.sym).cloned();
        let alloc_var = Expr::var(op.sym);
        let mut replacements: Vec<(Expr, Expr)> = Vec::new();
        for d in 0..op.dims.len() {
            let placeholder = slinky_ir::buffer_fold_factor(alloc_var.clone(), d as i64);
            match &fold_info {
                Some((fold_dim, factor)) if *fold_dim == d => {
                    replacements.push((placeholder, factor.clone()));
                }
                _ => replacements.push((placeholder, positive_infinity())),
            }
        }
        let mut dims = match recursive_substitute(op.dims.clone(), &replacements, op.sym) {
            Ok(dims) => dims,
            Err(error) => {
                self.fail(error);
                op.dims.clone()
            }
        };
        for dim in &mut dims {
            dim.fold_factor = simplify(&dim.fold_factor);
            if dim.fold_factor.is_positive_infinity() {
                dim.fold_factor = Expr::undefined();
            }
            dim.stride = simplify(&dim.stride);
        }

        Allocate::make(op.sym, op.storage, op.elem_size, dims, body)
    }

    fn visit_crop_buffer(&mut self, _s: &Stmt, op: &CropBuffer) -> Stmt {
        let mut bounds = self.buffer_bounds.get(op.sym).cloned();
        merge_crop_box(&mut bounds, &op.bounds);
        if let Some(bounds) = bounds.as_mut() {
            self.resolve_buffer_meta(bounds);
        }
        let saved = self.buffer_bounds.replace(op.sym, bounds);
        let body = self.mutate_stmt(&op.body);
        // The sliding rewrite updates the produced region in place; write the
        // updated bounds back into this crop.
        let new_bounds = self.buffer_bounds.replace(op.sym, saved);
        match new_bounds {
            Some(new_bounds) => CropBuffer::make(op.sym, new_bounds, body),
            None => CropBuffer::make(op.sym, op.bounds.clone(), body),
        }
    }

    fn visit_crop_dim(&mut self, s: &Stmt, op: &CropDim) -> Stmt {
        let mut bounds = self.buffer_bounds.get(op.sym).cloned();
        merge_crop(&mut bounds, op.dim, &op.bounds);
        if let Some(bounds) = bounds.as_mut() {
            self.resolve_buffer_meta(bounds);
        }
        let saved = self.buffer_bounds.replace(op.sym, bounds);
        let body = self.mutate_stmt(&op.body);
        let new_bounds = self.buffer_bounds.replace(op.sym, saved);
        let new_interval = new_bounds.and_then(|b| b.get(op.dim).cloned());
        match new_interval {
            Some(interval) => {
                if interval.same_as(&op.bounds) && body.same_as(&op.body) {
                    s.clone()
                } else {
                    CropDim::make(op.sym, op.dim, interval, body)
                }
            }
            None => CropDim::make(op.sym, op.dim, op.bounds.clone(), body),
        }
    }

    fn visit_slice_buffer(&mut self, s: &Stmt, _op: &slinky_ir::SliceBuffer) -> Stmt {
        self.fail(Error::UnsupportedStmt { pass: "slide and fold", stmt: "slice_buffer" });
        s.clone()
    }

    fn visit_slice_dim(&mut self, s: &Stmt, _op: &slinky_ir::SliceDim) -> Stmt {
        self.fail(Error::UnsupportedStmt { pass: "slide and fold", stmt: "slice_dim" });
        s.clone()
    }

    fn visit_truncate_rank(&mut self, s: &Stmt, _op: &slinky_ir::TruncateRank) -> Stmt {
        self.fail(Error::UnsupportedStmt { pass: "slide and fold", stmt: "truncate_rank" });
        s.clone()
    }

    fn visit_loop(&mut self, s: &Stmt, op: &Loop) -> Stmt {
        if op.mode == LoopMode::Parallel {
            // Concurrent iterations share no storage; never slide or fold.
            let body = self.mutate_stmt(&op.body);
            return if body.same_as(&op.body) {
                s.clone()
            } else {
                Loop::make(op.sym, op.mode, op.bounds.clone(), op.step.clone(), body)
            };
        }

        let orig_min_name = format!("{}.min_orig", self.ctx.name(op.sym));
        let orig_min = Var::from_sym(self.ctx.insert_unique(&orig_min_name));
        self.loops.push(LoopInfo {
            sym: op.sym,
            orig_min,
            bounds: IntervalExpr::new(Expr::var(orig_min.sym()), op.bounds.max.clone()),
            step: op.step.clone(),
        });
        let body = self.mutate_stmt(&op.body);
        let info = self.loops.pop().expect("loop stack imbalance");

        let mut loop_min = info.bounds.min;
        let min_unchanged = loop_min.as_variable() == Some(orig_min.sym());
        if min_unchanged {
            loop_min = op.bounds.min.clone();
        }

        if !min_unchanged || stmt_depends_on(&body, orig_min.sym()) {
            // The min was rewritten or a warm-up guard references it; keep
            // the original min available under its own name.
            let result = Loop::make(
                op.sym,
                op.mode,
                IntervalExpr::new(loop_min, op.bounds.max.clone()),
                op.step.clone(),
                body,
            );
            return LetStmt::make(orig_min.sym(), op.bounds.min.clone(), result);
        }

        if body.same_as(&op.body) {
            s.clone()
        } else {
            Loop::make(op.sym, op.mode, op.bounds.clone(), op.step.clone(), body)
        }
    }

    fn visit_block(&mut self, s: &Stmt, op: &Block) -> Stmt {
        // Consumers appear after producers; visit in reverse so the demand
        // rewrites are known before the producers are seen.
        let b = self.mutate_stmt(&op.b);
        let a = self.mutate_stmt(&op.a);
        if a.same_as(&op.a) && b.same_as(&op.b) { s.clone() } else { Block::make(a, b) }
    }
}
