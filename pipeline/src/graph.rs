//! The user-facing pipeline graph.
//!
//! Buffers and funcs reference each other both ways (a func knows its inputs
//! and outputs, a buffer knows its producer and consumers), so both live in
//! arenas owned by [`PipelineGraph`] and cross-reference by index.

use slinky_builder::error::{Error, Result};
use slinky_ir::{
    BoxExpr, Callback, DimExpr, Index, IntervalExpr, LoopMode, MemoryType, NodeContext, SymbolId,
    Var,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub(crate) usize);

/// Names one explicit loop of a func, for `compute_at`/`store_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopId {
    pub func: FuncId,
    pub var: Var,
}

/// A symbolic n-dimensional buffer.
#[derive(Debug)]
pub struct BufferExpr {
    pub sym: SymbolId,
    pub elem_size: Index,
    /// Dimension descriptors, initialized to the buffer's own metadata
    /// placeholders; bounds inference resolves them for intermediates.
    pub dims: Vec<DimExpr>,
    pub producer: Option<FuncId>,
    pub consumers: Vec<FuncId>,
    pub storage: MemoryType,
    /// Where the allocation lives. `None` allocates at the root (and scope
    /// reduction tightens it); naming the producer's `compute_at` loop
    /// allocates fresh storage inside that loop.
    pub store_at: Option<LoopId>,
}

impl BufferExpr {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// One declared input access: the region of `buffer` the callback reads to
/// produce a single point of the outputs, as expressions over the output
/// coordinate variables.
#[derive(Debug, Clone)]
pub struct FuncInput {
    pub buffer: BufferId,
    pub bounds: BoxExpr,
}

impl FuncInput {
    pub fn new(buffer: BufferId, bounds: impl IntoIterator<Item = IntervalExpr>) -> Self {
        Self { buffer, bounds: bounds.into_iter().collect() }
    }
}

#[derive(Debug, Clone)]
pub struct FuncOutput {
    pub buffer: BufferId,
    /// The coordinate variable for each output dimension.
    pub dims: Vec<Var>,
    /// Iteration alignment per dimension; 1 means every point.
    pub alignment: Vec<Index>,
}

impl FuncOutput {
    pub fn new(buffer: BufferId, dims: impl IntoIterator<Item = Var>) -> Self {
        let dims: Vec<Var> = dims.into_iter().collect();
        let alignment = vec![1; dims.len()];
        Self { buffer, dims, alignment }
    }

    pub fn aligned(mut self, alignment: Vec<Index>) -> Self {
        self.alignment = alignment;
        self
    }
}

/// An explicit loop over one output coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncLoop {
    pub var: Var,
    pub mode: LoopMode,
}

impl FuncLoop {
    pub fn serial(var: Var) -> Self {
        Self { var, mode: LoopMode::Serial }
    }

    pub fn parallel(var: Var) -> Self {
        Self { var, mode: LoopMode::Parallel }
    }
}

#[derive(Clone)]
pub enum FuncBody {
    Callback(Callback),
    /// An identity copy; lowered to a native copy by the builder.
    Copy { padding: Option<Vec<u8>> },
}

impl std::fmt::Debug for FuncBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncBody::Callback(_) => f.write_str("Callback(..)"),
            FuncBody::Copy { padding } => f.debug_struct("Copy").field("padding", padding).finish(),
        }
    }
}

/// A unit of computation: a callback plus its declared access patterns.
#[derive(Debug)]
pub struct Func {
    pub body: FuncBody,
    pub inputs: Vec<FuncInput>,
    pub outputs: Vec<FuncOutput>,
    /// Explicit loops over output coordinates, innermost first. Coordinates
    /// without a loop are computed whole-extent per call.
    pub loops: Vec<FuncLoop>,
    /// Compute inside this loop of a consumer instead of ahead of it.
    pub compute_at: Option<LoopId>,
}

/// Arena of buffers and funcs forming a pipeline DAG. Cycles are rejected
/// when the pipeline is built.
#[derive(Debug, Default)]
pub struct PipelineGraph {
    pub(crate) buffers: Vec<BufferExpr>,
    pub(crate) funcs: Vec<Func>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a buffer of the given rank. Its dims start as metadata
    /// placeholders on its own symbol.
    pub fn buffer(
        &mut self,
        ctx: &mut NodeContext,
        name: &str,
        elem_size: Index,
        rank: usize,
    ) -> BufferId {
        let sym = ctx.insert(name);
        let dims = slinky_builder::infer_bounds::buffer_meta_dims(sym, rank);
        self.buffers.push(BufferExpr {
            sym,
            elem_size,
            dims,
            producer: None,
            consumers: Vec::new(),
            storage: MemoryType::Heap,
            store_at: None,
        });
        BufferId(self.buffers.len() - 1)
    }

    /// Add a func. Its outputs must not already have a producer.
    pub fn func(
        &mut self,
        callback: Callback,
        inputs: Vec<FuncInput>,
        outputs: Vec<FuncOutput>,
    ) -> Result<FuncId> {
        self.add_func(FuncBody::Callback(callback), inputs, outputs)
    }

    /// Add an identity copy stage.
    pub fn copy_func(
        &mut self,
        input: FuncInput,
        output: FuncOutput,
        padding: Option<Vec<u8>>,
    ) -> Result<FuncId> {
        self.add_func(FuncBody::Copy { padding }, vec![input], vec![output])
    }

    fn add_func(
        &mut self,
        body: FuncBody,
        inputs: Vec<FuncInput>,
        outputs: Vec<FuncOutput>,
    ) -> Result<FuncId> {
        let id = FuncId(self.funcs.len());
        for output in &outputs {
            let buffer = &mut self.buffers[output.buffer.0];
            if buffer.producer.is_some() {
                return Err(Error::MultipleProducers { symbol: buffer.sym });
            }
            buffer.producer = Some(id);
        }
        for input in &inputs {
            self.buffers[input.buffer.0].consumers.push(id);
        }
        self.funcs.push(Func { body, inputs, outputs, loops: Vec::new(), compute_at: None });
        Ok(id)
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Func {
        &mut self.funcs[id.0]
    }

    pub fn func_ref(&self, id: FuncId) -> &Func {
        &self.funcs[id.0]
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut BufferExpr {
        &mut self.buffers[id.0]
    }

    pub fn buffer_ref(&self, id: BufferId) -> &BufferExpr {
        &self.buffers[id.0]
    }
}
