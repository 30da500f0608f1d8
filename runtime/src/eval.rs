//! The statement evaluator.
//!
//! Interprets lowered IR against concrete buffers. Failures are return
//! codes, never panics: `-1` for failed checks, `-2` for failed allocations,
//! and any nonzero value a callback returns is propagated as-is.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use slinky_ir::eval::{floor_div, floor_mod};
use slinky_ir::{
    BufDim, CallTarget, Expr, ExprNode, Index, Intrinsic, RawBuffer, Stmt, StmtNode, SymbolId,
    SymbolMap,
};

use crate::allocator::{Allocator, HeapAllocator};
use crate::pool::{StdThreadPool, ThreadPool};

/// A `check` statement evaluated to zero.
pub const CHECK_FAILED: Index = -1;
/// The allocator returned no memory.
pub const ALLOCATION_FAILED: Index = -2;

/// A value bound to a symbol during evaluation.
#[derive(Debug, Clone)]
pub enum EvalValue {
    Scalar(Index),
    Buffer(RawBuffer),
}

/// Per-invocation evaluation state. Parallel loops fork a child context per
/// iteration with a copy of the scope map.
#[derive(Clone)]
pub struct EvalContext {
    pub values: SymbolMap<EvalValue>,
    pub allocator: Arc<dyn Allocator>,
    pub pool: Arc<dyn ThreadPool>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            values: SymbolMap::new(),
            allocator: Arc::new(HeapAllocator),
            pool: Arc::new(StdThreadPool::default()),
        }
    }
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&mut self, sym: SymbolId, value: Index) {
        self.values.set(sym, EvalValue::Scalar(value));
    }

    pub fn set_buffer(&mut self, sym: SymbolId, buffer: RawBuffer) {
        self.values.set(sym, EvalValue::Buffer(buffer));
    }

    fn scalar(&self, sym: SymbolId) -> Result<Index, Stop> {
        match self.values.get(sym) {
            Some(EvalValue::Scalar(v)) => Ok(*v),
            // A buffer in scalar position reads as its base address.
            Some(EvalValue::Buffer(b)) => Ok(b.base as Index),
            None => Err(Stop { code: CHECK_FAILED }),
        }
    }

    fn buffer(&self, sym: SymbolId) -> Result<&RawBuffer, Stop> {
        match self.values.get(sym) {
            Some(EvalValue::Buffer(b)) => Ok(b),
            _ => Err(Stop { code: CHECK_FAILED }),
        }
    }
}

/// Run a lowered statement. Zero is success.
pub fn evaluate(s: &Stmt, ctx: &mut EvalContext) -> Index {
    match exec(s, ctx) {
        Ok(()) => 0,
        Err(stop) => stop.code,
    }
}

#[derive(Debug, Clone, Copy)]
struct Stop {
    code: Index,
}

type ExecResult = Result<(), Stop>;

fn eval_expr(e: &Expr, ctx: &EvalContext) -> Result<Index, Stop> {
    let Some(node) = e.node() else { return Err(Stop { code: CHECK_FAILED }) };
    match node {
        ExprNode::Variable(sym) => ctx.scalar(*sym),
        ExprNode::Constant(c) => Ok(*c),
        ExprNode::Wildcard(_) => Err(Stop { code: CHECK_FAILED }),
        ExprNode::Let { sym, value, body } => {
            // Expression lets are scalar only.
            let value = eval_expr(value, ctx)?;
            let mut inner = ctx.clone();
            inner.set_scalar(*sym, value);
            eval_expr(body, &inner)
        }
        ExprNode::Add(a, b) => Ok(eval_expr(a, ctx)?.wrapping_add(eval_expr(b, ctx)?)),
        ExprNode::Sub(a, b) => Ok(eval_expr(a, ctx)?.wrapping_sub(eval_expr(b, ctx)?)),
        ExprNode::Mul(a, b) => Ok(eval_expr(a, ctx)?.wrapping_mul(eval_expr(b, ctx)?)),
        ExprNode::Div(a, b) => Ok(floor_div(eval_expr(a, ctx)?, eval_expr(b, ctx)?)),
        ExprNode::Mod(a, b) => Ok(floor_mod(eval_expr(a, ctx)?, eval_expr(b, ctx)?)),
        ExprNode::Min(a, b) => Ok(eval_expr(a, ctx)?.min(eval_expr(b, ctx)?)),
        ExprNode::Max(a, b) => Ok(eval_expr(a, ctx)?.max(eval_expr(b, ctx)?)),
        ExprNode::Eq(a, b) => Ok((eval_expr(a, ctx)? == eval_expr(b, ctx)?) as Index),
        ExprNode::Ne(a, b) => Ok((eval_expr(a, ctx)? != eval_expr(b, ctx)?) as Index),
        ExprNode::Lt(a, b) => Ok((eval_expr(a, ctx)? < eval_expr(b, ctx)?) as Index),
        ExprNode::Le(a, b) => Ok((eval_expr(a, ctx)? <= eval_expr(b, ctx)?) as Index),
        ExprNode::And(a, b) => Ok((eval_expr(a, ctx)? != 0 && eval_expr(b, ctx)? != 0) as Index),
        ExprNode::Or(a, b) => Ok((eval_expr(a, ctx)? != 0 || eval_expr(b, ctx)? != 0) as Index),
        ExprNode::Not(a) => Ok((eval_expr(a, ctx)? == 0) as Index),
        ExprNode::Select { cond, true_value, false_value } => {
            if eval_expr(cond, ctx)? != 0 {
                eval_expr(true_value, ctx)
            } else {
                eval_expr(false_value, ctx)
            }
        }
        ExprNode::Call { intrinsic, args } => eval_call(*intrinsic, args, ctx),
    }
}

fn eval_call(intrinsic: Intrinsic, args: &[Expr], ctx: &EvalContext) -> Result<Index, Stop> {
    let buffer_arg = |ctx: &EvalContext| -> Result<RawBuffer, Stop> {
        let sym = args
            .first()
            .and_then(Expr::as_variable)
            .ok_or(Stop { code: CHECK_FAILED })?;
        ctx.buffer(sym).cloned()
    };
    let dim_arg = |d: &Expr, ctx: &EvalContext| -> Result<usize, Stop> {
        Ok(eval_expr(d, ctx)? as usize)
    };
    let dim_of = |ctx: &EvalContext| -> Result<BufDim, Stop> {
        let buf = buffer_arg(ctx)?;
        let d = dim_arg(args.get(1).ok_or(Stop { code: CHECK_FAILED })?, ctx)?;
        buf.dims.get(d).copied().ok_or(Stop { code: CHECK_FAILED })
    };

    match intrinsic {
        // Infinities only survive into crop bounds, where saturating to the
        // index extremes makes the clamp a no-op.
        Intrinsic::PositiveInfinity => Ok(Index::MAX),
        Intrinsic::NegativeInfinity => Ok(Index::MIN),
        Intrinsic::Indeterminate => Err(Stop { code: CHECK_FAILED }),
        Intrinsic::Abs => {
            let x = eval_expr(args.first().ok_or(Stop { code: CHECK_FAILED })?, ctx)?;
            Ok(x.wrapping_abs())
        }
        Intrinsic::BufferRank => Ok(buffer_arg(ctx)?.rank() as Index),
        Intrinsic::BufferBase => Ok(buffer_arg(ctx)?.base as Index),
        Intrinsic::BufferElemSize => Ok(buffer_arg(ctx)?.elem_size),
        Intrinsic::BufferSizeBytes => Ok(buffer_arg(ctx)?.size_bytes()),
        Intrinsic::BufferMin => Ok(dim_of(ctx)?.min),
        Intrinsic::BufferMax => Ok(dim_of(ctx)?.max()),
        Intrinsic::BufferStride => Ok(dim_of(ctx)?.stride),
        Intrinsic::BufferExtent => Ok(dim_of(ctx)?.extent),
        Intrinsic::BufferFoldFactor => {
            // Unfolded reads as unbounded so extent checks pass.
            let dim = dim_of(ctx)?;
            Ok(if dim.fold_factor == 0 { Index::MAX } else { dim.fold_factor })
        }
        Intrinsic::BufferAt => {
            let buf = buffer_arg(ctx)?;
            let mut coords: SmallVec<[Index; 4]> = SmallVec::new();
            for a in &args[1..] {
                coords.push(eval_expr(a, ctx)?);
            }
            Ok(buf.address_of(&coords) as Index)
        }
    }
}

fn exec(s: &Stmt, ctx: &mut EvalContext) -> ExecResult {
    let Some(node) = s.node() else { return Ok(()) };
    match node {
        StmtNode::Block(op) => {
            exec(&op.a, ctx)?;
            exec(&op.b, ctx)
        }
        StmtNode::LetStmt(op) => {
            // A let of another buffer symbol aliases the buffer; anything
            // else binds a scalar.
            let value = match op.value.as_variable() {
                Some(src) if matches!(ctx.values.get(src), Some(EvalValue::Buffer(_))) => {
                    EvalValue::Buffer(ctx.buffer(src)?.clone())
                }
                _ => EvalValue::Scalar(eval_expr(&op.value, ctx)?),
            };
            let saved = ctx.values.replace(op.sym, Some(value));
            let result = exec(&op.body, ctx);
            ctx.values.replace(op.sym, saved);
            result
        }
        StmtNode::Loop(op) => exec_loop(op, ctx),
        StmtNode::IfThenElse(op) => {
            if eval_expr(&op.condition, ctx)? != 0 {
                exec(&op.then_body, ctx)
            } else {
                exec(&op.else_body, ctx)
            }
        }
        StmtNode::CallStmt(op) => match &op.target {
            CallTarget::Callback(callback) => {
                let mut inputs = Vec::with_capacity(op.inputs.len());
                for &sym in &op.inputs {
                    inputs.push(ctx.buffer(sym)?.clone());
                }
                let mut outputs = Vec::with_capacity(op.outputs.len());
                for &sym in &op.outputs {
                    outputs.push(ctx.buffer(sym)?.clone());
                }
                trace!(inputs = op.inputs.len(), outputs = op.outputs.len(), "invoking callback");
                let code = callback(&inputs, &mut outputs);
                if code != 0 { Err(Stop { code }) } else { Ok(()) }
            }
            CallTarget::Copy { src_x, dst_x, padding } => {
                let src = *op.inputs.first().ok_or(Stop { code: CHECK_FAILED })?;
                let dst = *op.outputs.first().ok_or(Stop { code: CHECK_FAILED })?;
                exec_copy(src, src_x, dst, dst_x, padding.as_deref(), ctx)
            }
        },
        StmtNode::CopyStmt(op) => {
            exec_copy(op.src, &op.src_x, op.dst, &op.dst_x, op.padding.as_deref(), ctx)
        }
        StmtNode::Allocate(op) => {
            let mut dims: SmallVec<[BufDim; 4]> = SmallVec::new();
            for dim in &op.dims {
                let min = eval_expr(&dim.bounds.min, ctx)?;
                let max = eval_expr(&dim.bounds.max, ctx)?;
                let stride = eval_expr(&dim.stride, ctx)?;
                let fold_factor =
                    if dim.fold_factor.defined() { eval_expr(&dim.fold_factor, ctx)? } else { 0 };
                dims.push(BufDim { min, extent: max - min + 1, stride, fold_factor });
            }
            let mut buffer = RawBuffer::new(std::ptr::null_mut(), op.elem_size, dims);
            let size = buffer.size_bytes().max(0) as usize;
            trace!(sym = op.sym, size, storage = ?op.storage, "allocating");
            let Some(ptr) = ctx.allocator.alloc(size) else {
                return Err(Stop { code: ALLOCATION_FAILED });
            };
            buffer.base = ptr.as_ptr();

            let saved = ctx.values.replace(op.sym, Some(EvalValue::Buffer(buffer)));
            let result = exec(&op.body, ctx);
            ctx.values.replace(op.sym, saved);
            ctx.allocator.free(ptr, size);
            result
        }
        StmtNode::MakeBuffer(op) => {
            let base = eval_expr(&op.base, ctx)? as *mut u8;
            let elem_size = eval_expr(&op.elem_size, ctx)?;
            let mut dims: SmallVec<[BufDim; 4]> = SmallVec::new();
            for dim in &op.dims {
                let min = eval_expr(&dim.bounds.min, ctx)?;
                let max = eval_expr(&dim.bounds.max, ctx)?;
                let stride = eval_expr(&dim.stride, ctx)?;
                let fold_factor =
                    if dim.fold_factor.defined() { eval_expr(&dim.fold_factor, ctx)? } else { 0 };
                dims.push(BufDim { min, extent: max - min + 1, stride, fold_factor });
            }
            let buffer = RawBuffer::new(base, elem_size, dims);
            let saved = ctx.values.replace(op.sym, Some(EvalValue::Buffer(buffer)));
            let result = exec(&op.body, ctx);
            ctx.values.replace(op.sym, saved);
            result
        }
        StmtNode::CropBuffer(op) => {
            let mut buffer = ctx.buffer(op.sym)?.clone();
            for (d, interval) in op.bounds.iter().enumerate() {
                if d >= buffer.rank() {
                    break;
                }
                let cur = buffer.dims[d];
                let min =
                    if interval.min.defined() { eval_expr(&interval.min, ctx)? } else { cur.min };
                let max =
                    if interval.max.defined() { eval_expr(&interval.max, ctx)? } else { cur.max() };
                buffer.crop_dim(d, min, max);
            }
            with_buffer(op.sym, buffer, &op.body, ctx)
        }
        StmtNode::CropDim(op) => {
            let mut buffer = ctx.buffer(op.sym)?.clone();
            let cur = buffer.dims.get(op.dim).copied().ok_or(Stop { code: CHECK_FAILED })?;
            let min =
                if op.bounds.min.defined() { eval_expr(&op.bounds.min, ctx)? } else { cur.min };
            let max =
                if op.bounds.max.defined() { eval_expr(&op.bounds.max, ctx)? } else { cur.max() };
            buffer.crop_dim(op.dim, min, max);
            with_buffer(op.sym, buffer, &op.body, ctx)
        }
        StmtNode::SliceBuffer(op) => {
            let mut buffer = ctx.buffer(op.sym)?.clone();
            // Slice from the outermost specified dim down so indices stay
            // valid as dims are removed.
            for d in (0..op.at.len().min(buffer.rank())).rev() {
                if op.at[d].defined() {
                    let at = eval_expr(&op.at[d], ctx)?;
                    buffer.slice_dim(d, at);
                }
            }
            with_buffer(op.sym, buffer, &op.body, ctx)
        }
        StmtNode::SliceDim(op) => {
            let mut buffer = ctx.buffer(op.sym)?.clone();
            if op.dim >= buffer.rank() {
                return Err(Stop { code: CHECK_FAILED });
            }
            let at = eval_expr(&op.at, ctx)?;
            buffer.slice_dim(op.dim, at);
            with_buffer(op.sym, buffer, &op.body, ctx)
        }
        StmtNode::TruncateRank(op) => {
            let mut buffer = ctx.buffer(op.sym)?.clone();
            buffer.truncate_rank(op.rank);
            with_buffer(op.sym, buffer, &op.body, ctx)
        }
        StmtNode::Check(op) => {
            if eval_expr(&op.condition, ctx)? == 0 {
                trace!("check failed");
                return Err(Stop { code: CHECK_FAILED });
            }
            Ok(())
        }
    }
}

fn with_buffer(sym: SymbolId, buffer: RawBuffer, body: &Stmt, ctx: &mut EvalContext) -> ExecResult {
    let saved = ctx.values.replace(sym, Some(EvalValue::Buffer(buffer)));
    let result = exec(body, ctx);
    ctx.values.replace(sym, saved);
    result
}

fn exec_loop(op: &slinky_ir::Loop, ctx: &mut EvalContext) -> ExecResult {
    let min = eval_expr(&op.bounds.min, ctx)?;
    let max = eval_expr(&op.bounds.max, ctx)?;
    let step = eval_expr(&op.step, ctx)?;
    if step <= 0 {
        return Err(Stop { code: CHECK_FAILED });
    }
    if max < min {
        return Ok(());
    }

    match op.mode {
        slinky_ir::LoopMode::Serial => {
            let saved = ctx.values.replace(op.sym, None);
            let mut result = Ok(());
            let mut i = min;
            while i <= max {
                ctx.set_scalar(op.sym, i);
                if let Err(stop) = exec(&op.body, ctx) {
                    result = Err(stop);
                    break;
                }
                i += step;
            }
            ctx.values.replace(op.sym, saved);
            result
        }
        slinky_ir::LoopMode::Parallel => {
            let iterations = (floor_div(max - min, step) + 1) as usize;
            let first_error = AtomicI64::new(0);
            let cancelled = AtomicBool::new(false);
            let shared: &EvalContext = ctx;
            trace!(sym = op.sym, iterations, "dispatching parallel loop");
            ctx.pool.parallel_for(iterations, &|i| {
                // Cooperative cancellation: started iterations finish, new
                // ones do not begin.
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                let mut child = shared.clone();
                child.set_scalar(op.sym, min + i as Index * step);
                if let Err(stop) = exec(&op.body, &mut child) {
                    cancelled.store(true, Ordering::Release);
                    let _ = first_error.compare_exchange(
                        0,
                        stop.code,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
            });
            match first_error.load(Ordering::Acquire) {
                0 => Ok(()),
                code => Err(Stop { code }),
            }
        }
    }
}

fn exec_copy(
    src_sym: SymbolId,
    src_x: &[Expr],
    dst_sym: SymbolId,
    dst_x: &[SymbolId],
    padding: Option<&[u8]>,
    ctx: &mut EvalContext,
) -> ExecResult {
    let src = ctx.buffer(src_sym)?.clone();
    let dst = ctx.buffer(dst_sym)?.clone();
    let elem = dst.elem_size as usize;

    if dst.dims.iter().any(|d| d.extent <= 0) {
        return Ok(());
    }

    // Walk the destination region, binding its coordinates so the source
    // coordinate expressions can be evaluated per point.
    let saved: Vec<_> = dst_x.iter().map(|&s| ctx.values.replace(s, None)).collect();
    let mut coords: SmallVec<[Index; 4]> = dst.dims.iter().map(|d| d.min).collect();
    let result = 'walk: loop {
        for (&sym, &c) in dst_x.iter().zip(&coords) {
            ctx.set_scalar(sym, c);
        }
        let mut src_coords: SmallVec<[Index; 4]> = SmallVec::new();
        for e in src_x {
            match eval_expr(e, ctx) {
                Ok(c) => src_coords.push(c),
                Err(stop) => break 'walk Err(stop),
            }
        }

        let dst_ptr = dst.address_of(&coords);
        if src.contains(&src_coords) {
            unsafe {
                std::ptr::copy_nonoverlapping(src.address_of(&src_coords), dst_ptr, elem);
            }
        } else if let Some(padding) = padding {
            let n = elem.min(padding.len());
            unsafe {
                std::ptr::copy_nonoverlapping(padding.as_ptr(), dst_ptr, n);
            }
        }

        // Advance the odometer, innermost dimension first.
        let mut d = 0;
        loop {
            if d == dst.rank() {
                break 'walk Ok(());
            }
            coords[d] += 1;
            if coords[d] <= dst.dims[d].max() {
                break;
            }
            coords[d] = dst.dims[d].min;
            d += 1;
        }
    };
    for (&sym, old) in dst_x.iter().zip(saved) {
        ctx.values.replace(sym, old);
    }
    result
}
