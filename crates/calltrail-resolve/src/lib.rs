//! Staged call-graph resolution: a local pass and an import pass run over
//! every file in a single walk, unresolved sites flow through
//! class-hierarchy and rapid-type analysis, and runtime traces optionally
//! confirm what the static stages proposed. The output is an ordered edge
//! list with per-edge confidence, bit-stable across runs on the same
//! input.

pub mod coordinator;
pub mod index;
pub mod ledger;
mod passes;

pub use coordinator::{
    AnalysisInput, AnalysisOutcome, CancelHandle, Coordinator, Phase, ResolveError, ResolveFlags,
};
pub use index::FunctionIndex;
pub use ledger::EdgeLedger;
