//! User-facing pipeline construction and execution.
//!
//! A pipeline is described as a graph of symbolic buffers and funcs, built
//! into an optimized statement tree once, then evaluated any number of times
//! against concrete buffers.

mod build;
pub mod graph;

#[cfg(test)]
mod test;

use tracing::debug;

use slinky_builder::error::Result;
use slinky_ir::{Index, NodeContext, RawBuffer, Stmt, SymbolId, Var};
use slinky_runtime::{evaluate, EvalContext};

pub use graph::{
    BufferExpr, BufferId, Func, FuncBody, FuncId, FuncInput, FuncLoop, FuncOutput, LoopId,
    PipelineGraph,
};
pub use slinky_builder::BuildOptions;

/// A built pipeline: the lowered statement plus its formal parameters.
#[derive(Debug)]
pub struct Pipeline {
    args: Vec<SymbolId>,
    inputs: Vec<SymbolId>,
    outputs: Vec<SymbolId>,
    body: Stmt,
}

impl Pipeline {
    /// Build and lower a pipeline computing `outputs` from `inputs`.
    pub fn new(
        ctx: &mut NodeContext,
        args: Vec<Var>,
        graph: &PipelineGraph,
        inputs: Vec<BufferId>,
        outputs: Vec<BufferId>,
        options: &BuildOptions,
    ) -> Result<Self> {
        let body = build::build(graph, &outputs)?;
        debug!(stmt = %slinky_ir::print::print_stmt(&body, ctx), "built initial statement");

        let input_syms: Vec<SymbolId> = inputs.iter().map(|&b| graph.buffer_ref(b).sym).collect();
        let output_syms: Vec<SymbolId> = outputs.iter().map(|&b| graph.buffer_ref(b).sym).collect();
        let body = slinky_builder::lower(&body, ctx, &input_syms, options)?;
        debug!(stmt = %slinky_ir::print::print_stmt(&body, ctx), "lowered statement");

        Ok(Self {
            args: args.into_iter().map(Var::sym).collect(),
            inputs: input_syms,
            outputs: output_syms,
            body,
        })
    }

    /// The lowered statement, for inspection.
    pub fn body(&self) -> &Stmt {
        &self.body
    }

    /// Run against concrete buffers. Zero on success; negative codes are
    /// builtin failures, positive codes come from callbacks.
    pub fn evaluate(
        &self,
        args: &[Index],
        inputs: &[&RawBuffer],
        outputs: &[&RawBuffer],
        ctx: &mut EvalContext,
    ) -> Index {
        assert_eq!(args.len(), self.args.len(), "scalar argument count mismatch");
        assert_eq!(inputs.len(), self.inputs.len(), "input buffer count mismatch");
        assert_eq!(outputs.len(), self.outputs.len(), "output buffer count mismatch");

        for (&sym, &value) in self.args.iter().zip(args) {
            ctx.set_scalar(sym, value);
        }
        for (&sym, &buffer) in self.inputs.iter().zip(inputs) {
            ctx.set_buffer(sym, buffer.clone());
        }
        for (&sym, &buffer) in self.outputs.iter().zip(outputs) {
            ctx.set_buffer(sym, buffer.clone());
        }
        evaluate(&self.body, ctx)
    }

    /// [`Pipeline::evaluate`] with a fresh default context and no scalar
    /// arguments.
    pub fn run(&self, inputs: &[&RawBuffer], outputs: &[&RawBuffer]) -> Index {
        self.evaluate(&[], inputs, outputs, &mut EvalContext::new())
    }
}
