use crate::index::FunctionIndex;
use crate::ledger::EdgeLedger;
use crate::passes::cha::CandidateMap;
use crate::passes::make_edge;
use calltrail_core::{
    AnalysisStats, CallKind, ConfidencePolicy, FunctionId, MethodReduction, ResolutionLevel,
    ResolutionSource, UnresolvedCall,
};
use calltrail_oracle::ClassHierarchy;
use std::collections::HashSet;
use tracing::trace;

/// Rapid type analysis: restrict each CHA candidate set to classes proven
/// instantiated somewhere in the program. Instantiated classes count for
/// every interface they declare, so interface-typed receivers refine too.
///
/// Edges are only emitted when the refinement is a strict, non-empty
/// subset; otherwise the CHA edges already are the best answer.
pub(crate) struct RtaPass;

impl RtaPass {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run(
        queue: &[UnresolvedCall],
        candidate_map: &CandidateMap,
        index: &FunctionIndex,
        hierarchy: &ClassHierarchy,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
    ) -> anyhow::Result<()> {
        let mut instantiated: HashSet<String> = ledger
            .instantiations()
            .iter()
            .map(|event| event.type_name.clone())
            .collect();
        for class in instantiated.clone() {
            for interface in hierarchy.interfaces_of(&class) {
                instantiated.insert(interface);
            }
        }

        for (method, candidates) in candidate_map {
            let after = candidates
                .iter()
                .filter(|(class, _)| instantiated.contains(class))
                .count();
            stats.rta_reduction.push(MethodReduction {
                method: method.clone(),
                candidates_before: candidates.len(),
                candidates_after: after,
            });
        }

        for entry in queue {
            stats.rta.sites_seen += 1;
            let Some(candidates) = candidate_map.get(&entry.method_name) else {
                continue;
            };

            // Re-apply the receiver filter so the per-site refinement is
            // always a subset of what CHA enumerated for this site, even
            // though the candidate map is keyed by method name alone.
            let site_candidates: Vec<&(String, FunctionId)> = candidates
                .iter()
                .filter(|(class, _)| match entry.receiver_type.as_deref() {
                    Some(receiver) => hierarchy.is_subtype_of(class, receiver),
                    None => true,
                })
                .collect();
            let refined: Vec<&(String, FunctionId)> = site_candidates
                .iter()
                .copied()
                .filter(|(class, _)| instantiated.contains(class))
                .collect();

            if refined.is_empty() || refined.len() == site_candidates.len() {
                trace!(
                    method = %entry.method_name,
                    before = site_candidates.len(),
                    after = refined.len(),
                    "rta refinement not strict; keeping hierarchy edges"
                );
                continue;
            }

            let Some(caller) = index.by_id(&entry.caller_id).cloned() else {
                stats.rta.dropped += 1;
                continue;
            };

            let refined_ids: Vec<FunctionId> =
                refined.iter().map(|(_, id)| id.clone()).collect();
            for (_, target_id) in &refined {
                let Some(callee) = index.by_id(target_id) else {
                    continue;
                };
                let mut candidates = vec![target_id.clone()];
                candidates.extend(refined_ids.iter().filter(|id| *id != target_id).cloned());
                let edge = make_edge(
                    &caller,
                    callee,
                    candidates,
                    CallKind::Virtual,
                    ResolutionSource::InstantiatedReceiver,
                    policy.score(ResolutionLevel::RtaResolved, false),
                    entry.line,
                    entry.column,
                    false,
                    snapshot,
                );
                if ledger.add_edge(index, edge) {
                    stats.rta.edges_added += 1;
                    stats
                        .strategies
                        .record(ResolutionSource::InstantiatedReceiver);
                }
            }
        }

        Ok(())
    }
}
