//! The pipeline builder: lowering passes over the statement IR.
//!
//! [`lower`] takes the naively-built statement tree for a pipeline and runs
//! the pass chain that turns it into the executable form: bounds inference,
//! sliding-window and storage folding, input crop removal, simplification,
//! scope reduction, buffer aliasing, and copy lowering.

use tracing::debug;

use slinky_ir::{NodeContext, Stmt, SymbolId};

pub mod bounds;
pub mod error;
pub mod infer_bounds;
pub mod optimizations;
pub mod simplify;
pub mod slide_and_fold;

#[cfg(test)]
mod test;

pub use error::{Error, Result};

/// Options controlling lowering.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Omit the runtime bounds checks on supplied buffers.
    pub no_checks: bool,
}

/// Lower a built pipeline body to its optimized executable form.
pub fn lower(
    s: &Stmt,
    ctx: &mut NodeContext,
    inputs: &[SymbolId],
    options: &BuildOptions,
) -> Result<Stmt> {
    let result = infer_bounds::infer_bounds(s, inputs, options.no_checks)?;
    debug!("bounds inference complete");

    // Simplifying here would erase the crop structure that records which
    // stage produces for which consumer, so folding runs on the raw tree.
    let result = slide_and_fold::slide_and_fold_storage(&result, ctx)?;
    debug!("slide and fold complete");

    // Crops of buffers nothing writes were only needed to express demands
    // for inference; drop them before simplification.
    let result = optimizations::remove_input_crops(&result);

    let result = simplify::simplify_stmt(&result);
    let result = optimizations::reduce_scopes(&result);

    let result = optimizations::alias_buffers(&result)?;
    let result = optimizations::optimize_copies(&result);
    debug!("aliasing and copy lowering complete");

    let result = simplify::simplify_stmt(&result);
    Ok(optimizations::reduce_scopes(&result))
}
