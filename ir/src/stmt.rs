//! Statement nodes.
//!
//! Statements form the imperative IR the builder lowers pipelines into:
//! loops, allocations, crops, and callback invocations. Like expressions they
//! are immutable reference-counted trees, and a [`Stmt`] handle may be
//! undefined — the empty statement, elided by [`Stmt::block`].

use std::sync::Arc;

use crate::buffer::RawBuffer;
use crate::expr::Expr;
use crate::interval::{BoxExpr, DimExpr, IntervalExpr};
use crate::symbol::{Index, SymbolId};

/// User callback: consumes the cropped input buffers, writes exactly the
/// declared region of the cropped outputs. Zero is success; any nonzero value
/// aborts evaluation and propagates out of `evaluate`.
pub type Callback = Arc<dyn Fn(&[RawBuffer], &mut [RawBuffer]) -> Index + Send + Sync>;

/// What a [`CallStmt`] invokes.
#[derive(Clone)]
pub enum CallTarget {
    Callback(Callback),
    /// The identity-over-the-cropped-region marker planted when a pipeline
    /// stage is a copy. The copy optimizer rewrites these to [`CopyStmt`];
    /// the evaluator also executes them directly so unoptimized IR still
    /// runs. `src_x[d]` gives the source coordinate as a function of the
    /// destination coordinates named by `dst_x`.
    Copy { src_x: Vec<Expr>, dst_x: Vec<SymbolId>, padding: Option<Vec<u8>> },
}

impl std::fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallTarget::Callback(_) => f.write_str("Callback(..)"),
            CallTarget::Copy { src_x, dst_x, padding } => f
                .debug_struct("Copy")
                .field("src_x", src_x)
                .field("dst_x", dst_x)
                .field("padding", padding)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Serial,
    /// Iterations are dispatched to the thread pool and may run
    /// concurrently. The builder never applies storage transformations to
    /// parallel loops, so iterations write disjoint regions.
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Stack,
    Heap,
}

#[derive(Debug)]
pub struct Block {
    pub a: Stmt,
    pub b: Stmt,
}

#[derive(Debug)]
pub struct LetStmt {
    pub sym: SymbolId,
    pub value: Expr,
    pub body: Stmt,
}

#[derive(Debug)]
pub struct Loop {
    pub sym: SymbolId,
    pub mode: LoopMode,
    /// Inclusive iteration bounds.
    pub bounds: IntervalExpr,
    pub step: Expr,
    pub body: Stmt,
}

#[derive(Debug)]
pub struct IfThenElse {
    pub condition: Expr,
    pub then_body: Stmt,
    /// May be undefined.
    pub else_body: Stmt,
}

#[derive(Debug)]
pub struct CallStmt {
    pub target: CallTarget,
    pub inputs: Vec<SymbolId>,
    pub outputs: Vec<SymbolId>,
}

/// Bulk copy of `src` into the current cropped region of `dst`, reading
/// `src` at the coordinates `src_x` (expressions over the `dst_x` symbols).
/// Out-of-range source points are filled with `padding` bytes if provided,
/// otherwise left untouched.
#[derive(Debug)]
pub struct CopyStmt {
    pub src: SymbolId,
    pub src_x: Vec<Expr>,
    pub dst: SymbolId,
    pub dst_x: Vec<SymbolId>,
    pub padding: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct Allocate {
    pub sym: SymbolId,
    pub storage: MemoryType,
    pub elem_size: Index,
    pub dims: Vec<DimExpr>,
    pub body: Stmt,
}

/// Wrap an existing raw pointer as a buffer within `body`.
#[derive(Debug)]
pub struct MakeBuffer {
    pub sym: SymbolId,
    pub base: Expr,
    pub elem_size: Expr,
    pub dims: Vec<DimExpr>,
    pub body: Stmt,
}

/// Within `body`, `sym` refers to the intersection of its current region
/// with `bounds`. Crops never expand a region.
#[derive(Debug)]
pub struct CropBuffer {
    pub sym: SymbolId,
    pub bounds: BoxExpr,
    pub body: Stmt,
}

#[derive(Debug)]
pub struct CropDim {
    pub sym: SymbolId,
    pub dim: usize,
    pub bounds: IntervalExpr,
    pub body: Stmt,
}

/// Reduce rank by fixing the defined coordinates of `at`.
#[derive(Debug)]
pub struct SliceBuffer {
    pub sym: SymbolId,
    pub at: Vec<Expr>,
    pub body: Stmt,
}

#[derive(Debug)]
pub struct SliceDim {
    pub sym: SymbolId,
    pub dim: usize,
    pub at: Expr,
    pub body: Stmt,
}

#[derive(Debug)]
pub struct TruncateRank {
    pub sym: SymbolId,
    pub rank: usize,
    pub body: Stmt,
}

/// Runtime assertion; evaluation stops with a check-failure code when the
/// condition is zero.
#[derive(Debug)]
pub struct Check {
    pub condition: Expr,
}

#[derive(Debug)]
pub enum StmtNode {
    Block(Block),
    LetStmt(LetStmt),
    Loop(Loop),
    IfThenElse(IfThenElse),
    CallStmt(CallStmt),
    CopyStmt(CopyStmt),
    Allocate(Allocate),
    MakeBuffer(MakeBuffer),
    CropBuffer(CropBuffer),
    CropDim(CropDim),
    SliceBuffer(SliceBuffer),
    SliceDim(SliceDim),
    TruncateRank(TruncateRank),
    Check(Check),
}

/// A possibly-undefined handle to a [`StmtNode`].
#[derive(Debug, Clone, Default)]
pub struct Stmt {
    node: Option<Arc<StmtNode>>,
}

impl Stmt {
    fn new(node: StmtNode) -> Stmt {
        Stmt { node: Some(Arc::new(node)) }
    }

    pub fn undefined() -> Stmt {
        Stmt { node: None }
    }

    pub fn defined(&self) -> bool {
        self.node.is_some()
    }

    pub fn node(&self) -> Option<&StmtNode> {
        self.node.as_deref()
    }

    pub fn same_as(&self, other: &Stmt) -> bool {
        match (&self.node, &other.node) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Fold a sequence into right-associated [`Block`]s, eliding undefined
    /// statements. An empty sequence is the undefined statement.
    pub fn block(stmts: Vec<Stmt>) -> Stmt {
        let mut result = Stmt::undefined();
        for s in stmts.into_iter().rev() {
            result = Block::make(s, result);
        }
        result
    }
}

impl Block {
    pub fn make(a: Stmt, b: Stmt) -> Stmt {
        match (a.defined(), b.defined()) {
            (true, true) => Stmt::new(StmtNode::Block(Block { a, b })),
            (true, false) => a,
            (false, _) => b,
        }
    }
}

impl LetStmt {
    pub fn make(sym: SymbolId, value: Expr, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::LetStmt(LetStmt { sym, value, body }))
    }
}

impl Loop {
    pub fn make(sym: SymbolId, mode: LoopMode, bounds: IntervalExpr, step: Expr, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::Loop(Loop { sym, mode, bounds, step, body }))
    }
}

impl IfThenElse {
    pub fn make(condition: Expr, then_body: Stmt, else_body: Stmt) -> Stmt {
        Stmt::new(StmtNode::IfThenElse(IfThenElse { condition, then_body, else_body }))
    }
}

impl CallStmt {
    pub fn make(target: CallTarget, inputs: Vec<SymbolId>, outputs: Vec<SymbolId>) -> Stmt {
        Stmt::new(StmtNode::CallStmt(CallStmt { target, inputs, outputs }))
    }
}

impl CopyStmt {
    pub fn make(
        src: SymbolId,
        src_x: Vec<Expr>,
        dst: SymbolId,
        dst_x: Vec<SymbolId>,
        padding: Option<Vec<u8>>,
    ) -> Stmt {
        Stmt::new(StmtNode::CopyStmt(CopyStmt { src, src_x, dst, dst_x, padding }))
    }
}

impl Allocate {
    pub fn make(sym: SymbolId, storage: MemoryType, elem_size: Index, dims: Vec<DimExpr>, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::Allocate(Allocate { sym, storage, elem_size, dims, body }))
    }
}

impl MakeBuffer {
    pub fn make(sym: SymbolId, base: Expr, elem_size: Expr, dims: Vec<DimExpr>, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::MakeBuffer(MakeBuffer { sym, base, elem_size, dims, body }))
    }
}

impl CropBuffer {
    pub fn make(sym: SymbolId, bounds: BoxExpr, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::CropBuffer(CropBuffer { sym, bounds, body }))
    }
}

impl CropDim {
    pub fn make(sym: SymbolId, dim: usize, bounds: IntervalExpr, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::CropDim(CropDim { sym, dim, bounds, body }))
    }
}

impl SliceBuffer {
    pub fn make(sym: SymbolId, at: Vec<Expr>, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::SliceBuffer(SliceBuffer { sym, at, body }))
    }
}

impl SliceDim {
    pub fn make(sym: SymbolId, dim: usize, at: Expr, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::SliceDim(SliceDim { sym, dim, at, body }))
    }
}

impl TruncateRank {
    pub fn make(sym: SymbolId, rank: usize, body: Stmt) -> Stmt {
        Stmt::new(StmtNode::TruncateRank(TruncateRank { sym, rank, body }))
    }
}

impl Check {
    pub fn make(condition: Expr) -> Stmt {
        Stmt::new(StmtNode::Check(Check { condition }))
    }
}
