//! Graph to initial IR.
//!
//! Walks the graph consumers-first and emits the naive statement tree the
//! lowering passes refine: loops over output coordinates, per-iteration
//! output crops, input crops carrying each consumer's declared demand, and
//! root allocations for every intermediate. A producer is emitted inside its
//! first consumer's input crop, wrapped in a crop of its own carrying the
//! same demand: the consumer's crop records what is read there, the
//! producer's crop is the one the sliding rewrite narrows. Shapes are left
//! as metadata placeholders for bounds inference.

use std::collections::HashSet;

use slinky_builder::error::{Error, Result};
use slinky_ir::expr::{buffer_max, buffer_min};
use slinky_ir::substitute::substitute;
use slinky_ir::{
    Allocate, Block, BoxExpr, CallStmt, CallTarget, CropBuffer, CropDim, Expr, IntervalExpr, Loop,
    Stmt, SymbolId, Var,
};

use crate::graph::{BufferId, Func, FuncBody, FuncId, FuncInput, LoopId, PipelineGraph};

pub(crate) fn build(graph: &PipelineGraph, outputs: &[BufferId]) -> Result<Stmt> {
    let order = topo_order(graph, outputs)?;

    let mut produced = HashSet::new();
    let mut stmts = Vec::new();
    for &out in outputs {
        if let Some(producer) = graph.buffer_ref(out).producer {
            if !produced.contains(&producer) {
                stmts.push(produce_one(graph, producer, &mut produced)?);
            }
        }
    }
    let mut result = Stmt::block(stmts);

    // Allocate every intermediate at the root, later producers outermost so
    // a buffer aliased to a downstream output resolves in scope. Scope
    // reduction tightens these afterwards.
    for &f in &order {
        for output in &graph.funcs[f.0].outputs {
            if outputs.contains(&output.buffer) {
                continue;
            }
            if allocated_at_compute_site(graph, f, output.buffer) {
                continue;
            }
            let buffer = graph.buffer_ref(output.buffer);
            result =
                Allocate::make(buffer.sym, buffer.storage, buffer.elem_size, buffer.dims.clone(), result);
        }
    }
    Ok(result)
}

/// True when `f`'s `compute_at` names an actual loop of an actual consumer.
fn is_embedded(graph: &PipelineGraph, f: FuncId) -> bool {
    match graph.funcs[f.0].compute_at {
        Some(at) => {
            let consumer = &graph.funcs[at.func.0];
            consumer.loops.iter().any(|l| l.var == at.var)
                && consumer.inputs.iter().any(|i| graph.buffer_ref(i.buffer).producer == Some(f))
        }
        None => false,
    }
}

fn allocated_at_compute_site(graph: &PipelineGraph, producer: FuncId, buffer: BufferId) -> bool {
    let b = graph.buffer_ref(buffer);
    match (b.store_at, graph.funcs[producer.0].compute_at) {
        (Some(store), Some(compute)) => store == compute && is_embedded(graph, producer),
        _ => false,
    }
}

/// Producers-before-consumers order over the funcs reachable from the
/// pipeline outputs. Fails on cycles.
fn topo_order(graph: &PipelineGraph, outputs: &[BufferId]) -> Result<Vec<FuncId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        OnStack,
        Done,
    }

    fn visit(
        graph: &PipelineGraph,
        f: FuncId,
        state: &mut [State],
        order: &mut Vec<FuncId>,
    ) -> Result<()> {
        match state[f.0] {
            State::Done => return Ok(()),
            State::OnStack => {
                let symbol = graph.funcs[f.0]
                    .outputs
                    .first()
                    .map(|o| graph.buffer_ref(o.buffer).sym)
                    .unwrap_or_default();
                return Err(Error::GraphCycle { symbol });
            }
            State::Unvisited => {}
        }
        state[f.0] = State::OnStack;
        for input in &graph.funcs[f.0].inputs {
            if let Some(producer) = graph.buffer_ref(input.buffer).producer {
                visit(graph, producer, state, order)?;
            }
        }
        state[f.0] = State::Done;
        order.push(f);
        Ok(())
    }

    let mut state = vec![State::Unvisited; graph.funcs.len()];
    let mut order = Vec::new();
    for &out in outputs {
        if let Some(producer) = graph.buffer_ref(out).producer {
            visit(graph, producer, &mut state, &mut order)?;
        }
    }
    Ok(order)
}

/// Where an output coordinate variable of `f` lives: `(buffer sym, dim,
/// alignment)`.
fn coordinate_of(graph: &PipelineGraph, f: &Func, var: Var) -> Option<(SymbolId, usize, i64)> {
    for output in &f.outputs {
        if let Some(d) = output.dims.iter().position(|&w| w == var) {
            let align = output.alignment.get(d).copied().unwrap_or(1).max(1);
            return Some((graph.buffer_ref(output.buffer).sym, d, align));
        }
    }
    None
}

/// Substitute the output coordinates of `f` that are *not* in `live` with
/// the whole range of the corresponding output dimension: mins get
/// `buffer_min`, maxes `buffer_max`.
fn widen_bounds(graph: &PipelineGraph, f: &Func, input: &FuncInput, live: &[Var]) -> BoxExpr {
    let mut result = BoxExpr::new();
    for interval in &input.bounds {
        let mut min = interval.min.clone();
        let mut max = interval.max.clone();
        for output in &f.outputs {
            let out_sym = graph.buffer_ref(output.buffer).sym;
            for (d, &var) in output.dims.iter().enumerate() {
                if live.contains(&var) {
                    continue;
                }
                if min.defined() {
                    min = substitute(&min, var.sym(), &buffer_min(Expr::var(out_sym), d as i64));
                }
                if max.defined() {
                    max = substitute(&max, var.sym(), &buffer_max(Expr::var(out_sym), d as i64));
                }
            }
        }
        result.push(IntervalExpr::new(min, max));
    }
    result
}

fn produce_one(
    graph: &PipelineGraph,
    f_id: FuncId,
    produced: &mut HashSet<FuncId>,
) -> Result<Stmt> {
    produced.insert(f_id);
    let f = &graph.funcs[f_id.0];
    let looped: Vec<Var> = f.loops.iter().map(|l| l.var).collect();

    let input_syms: Vec<SymbolId> =
        f.inputs.iter().map(|i| graph.buffer_ref(i.buffer).sym).collect();
    let output_syms: Vec<SymbolId> =
        f.outputs.iter().map(|o| graph.buffer_ref(o.buffer).sym).collect();

    let target = match &f.body {
        FuncBody::Callback(callback) => CallTarget::Callback(callback.clone()),
        FuncBody::Copy { padding } => CallTarget::Copy {
            src_x: f.inputs[0].bounds.iter().map(|i| i.min.clone()).collect(),
            dst_x: f.outputs[0].dims.iter().map(|v| v.sym()).collect(),
            padding: padding.clone(),
        },
    };
    let mut s = CallStmt::make(target, input_syms, output_syms);

    // Crop each looped output dimension to the current iteration's points.
    for output in &f.outputs {
        let out_sym = graph.buffer_ref(output.buffer).sym;
        for (d, &var) in output.dims.iter().enumerate() {
            if !looped.contains(&var) {
                continue;
            }
            let align = output.alignment.get(d).copied().unwrap_or(1).max(1);
            let v = Expr::var(var.sym());
            let hi = if align == 1 { v.clone() } else { v.clone() + (align - 1) };
            s = CropDim::make(out_sym, d, IntervalExpr::new(v, hi), s);
        }
    }

    // Input crops carry the declared demand. A producer that belongs at this
    // point (unscheduled, or computed at our innermost loop) is emitted
    // inside the crop, wrapped in its own identical crop.
    for input in f.inputs.iter().rev() {
        let bounds = widen_bounds(graph, f, input, &looped);
        let buffer = graph.buffer_ref(input.buffer);
        let mut inner = s;

        if let Some(producer) = buffer.producer {
            let innermost = looped.first().copied();
            let here = match graph.funcs[producer.0].compute_at {
                Some(at) => at.func == f_id && Some(at.var) == innermost,
                None => true,
            };
            // A compute_at that names no real loop falls back to here.
            let here = here || !is_embedded(graph, producer);
            if here && !produced.contains(&producer) {
                let prod = CropBuffer::make(
                    buffer.sym,
                    bounds.clone(),
                    produce_one(graph, producer, produced)?,
                );
                if allocated_at_compute_site(graph, producer, input.buffer) {
                    inner = Allocate::make(
                        buffer.sym,
                        buffer.storage,
                        buffer.elem_size,
                        buffer.dims.clone(),
                        Block::make(prod, inner),
                    );
                } else {
                    inner = Block::make(prod, inner);
                }
            }
        }
        s = CropBuffer::make(buffer.sym, bounds, inner);
    }

    // Loops, innermost first. Producers computed at an outer loop are
    // emitted just inside it with their demand widened to the inner
    // coordinates they span.
    for (li, fl) in f.loops.iter().enumerate() {
        if li > 0 {
            let at = LoopId { func: f_id, var: fl.var };
            for input in &f.inputs {
                let buffer = graph.buffer_ref(input.buffer);
                let Some(producer) = buffer.producer else { continue };
                if graph.funcs[producer.0].compute_at != Some(at) || produced.contains(&producer) {
                    continue;
                }
                let demand = widen_bounds(graph, f, input, &looped[li..]);
                let prod = CropBuffer::make(
                    buffer.sym,
                    demand,
                    produce_one(graph, producer, produced)?,
                );
                if allocated_at_compute_site(graph, producer, input.buffer) {
                    s = Allocate::make(
                        buffer.sym,
                        buffer.storage,
                        buffer.elem_size,
                        buffer.dims.clone(),
                        Block::make(prod, s),
                    );
                } else {
                    s = Block::make(prod, s);
                }
            }
        }

        let (out_sym, d, align) = coordinate_of(graph, f, fl.var)
            .expect("loop variables name an output coordinate");
        let min = buffer_min(Expr::var(out_sym), d as i64);
        let min = if align == 1 {
            min
        } else {
            slinky_builder::bounds::align_down(min, Expr::constant(align))
        };
        let bounds = IntervalExpr::new(min, buffer_max(Expr::var(out_sym), d as i64));
        s = Loop::make(fl.var.sym(), fl.mode, bounds, Expr::constant(align), s);
    }

    Ok(s)
}
