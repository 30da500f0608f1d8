//! Intermediate representation for buffer pipelines.
//!
//! The IR has two layers: expressions ([`Expr`]) over a signed index type,
//! and statements ([`Stmt`]) describing loops, allocations, crops, and
//! callback invocations over symbolic buffers. Both are immutable trees of
//! reference-counted nodes; passes rewrite them through the [`NodeMutator`]
//! trait and rely on pointer identity to keep untouched subtrees shared.

pub mod buffer;
pub mod depends_on;
pub mod eval;
pub mod expr;
pub mod interval;
pub mod mutator;
pub mod print;
pub mod stmt;
pub mod substitute;
pub mod symbol;
pub mod symbol_map;

#[cfg(test)]
mod test;

pub use buffer::{BufDim, RawBuffer};
pub use expr::{
    abs, buffer_at, buffer_base, buffer_elem_size, buffer_extent, buffer_fold_factor, buffer_max,
    buffer_min, buffer_rank, buffer_size_bytes, buffer_stride, indeterminate, negative_infinity,
    positive_infinity, Expr, ExprNode, Intrinsic,
};
pub use interval::{box_union, merge_crop, merge_crop_box, BoxExpr, DimExpr, IntervalExpr};
pub use mutator::NodeMutator;
pub use stmt::{
    Allocate, Block, CallStmt, CallTarget, Callback, Check, CopyStmt, CropBuffer, CropDim,
    IfThenElse, LetStmt, Loop, LoopMode, MakeBuffer, MemoryType, SliceBuffer, SliceDim, Stmt,
    StmtNode, TruncateRank,
};
pub use symbol::{Index, NodeContext, SymbolId, Var};
pub use symbol_map::SymbolMap;
