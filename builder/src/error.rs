use slinky_ir::SymbolId;
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Build-time failures. Runtime failures are return codes, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The pipeline graph is not a DAG.
    #[snafu(display("pipeline graph contains a cycle through buffer {symbol}"))]
    GraphCycle { symbol: SymbolId },

    /// A buffer already has a producer.
    #[snafu(display("buffer {symbol} has more than one producer"))]
    MultipleProducers { symbol: SymbolId },

    /// No consumer demand reached an allocation, so its shape is unknown.
    #[snafu(display("bounds of allocation {symbol} could not be inferred from any consumer"))]
    UnboundedAllocation { symbol: SymbolId },

    /// Buffer metadata substitution did not reach a fixed point.
    #[snafu(display("bounds of allocation {symbol} depend cyclically on themselves"))]
    UnresolvedBounds { symbol: SymbolId },

    /// A statement kind the analysis passes do not handle. The pipeline
    /// builder never emits these; hand-built IR must not contain them.
    #[snafu(display("{pass} does not support {stmt} statements"))]
    UnsupportedStmt { pass: &'static str, stmt: &'static str },
}
