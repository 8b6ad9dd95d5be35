use crate::ledger::EdgeLedger;
use calltrail_core::{AnalysisStats, ConfidencePolicy, FunctionId, ResolutionSource};
use tracing::trace;

/// Overlay externally witnessed `(caller, callee)` pairs onto the graph.
/// Confirmation boosts existing edges to full confidence and latches the
/// runtime bit; pairs without a matching edge are ignored, since traces
/// lack static context and would produce spurious edges.
pub(crate) struct RuntimePass;

impl RuntimePass {
    pub(crate) fn run(
        pairs: &[(FunctionId, FunctionId)],
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        stats: &mut AnalysisStats,
    ) -> anyhow::Result<()> {
        for (caller, callee) in pairs {
            stats.runtime.sites_seen += 1;
            if ledger.confirm_edge(caller, callee, policy) {
                stats.runtime.edges_added += 1;
                stats.strategies.record(ResolutionSource::TraceOverlay);
            } else {
                trace!(%caller, %callee, "trace pair without a static edge");
                stats.runtime.dropped += 1;
            }
        }
        Ok(())
    }
}
