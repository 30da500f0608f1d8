//! Runtime support for lowered pipelines: buffer allocation, owned buffers,
//! the worker pool, and the statement evaluator.

pub mod allocator;
pub mod buffer;
pub mod eval;
pub mod pool;

#[cfg(test)]
mod test;

pub use allocator::{Allocator, HeapAllocator};
pub use buffer::OwnedBuffer;
pub use eval::{evaluate, EvalContext, EvalValue, ALLOCATION_FAILED, CHECK_FAILED};
pub use pool::{StdThreadPool, ThreadPool};
