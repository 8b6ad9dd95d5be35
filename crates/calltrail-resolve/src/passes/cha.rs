use crate::index::FunctionIndex;
use crate::ledger::EdgeLedger;
use crate::passes::make_edge;
use calltrail_core::{
    AnalysisStats, CallKind, ConfidencePolicy, FunctionId, ResolutionSource, UnresolvedCall,
};
use calltrail_oracle::ClassHierarchy;
use indexmap::IndexMap;
use tracing::trace;

/// Candidate map built by CHA and consumed read-only by RTA:
/// method name → ordered `(class, function id)` pairs.
pub(crate) type CandidateMap = IndexMap<String, Vec<(String, FunctionId)>>;

pub(crate) struct ChaOutcome {
    pub candidate_map: CandidateMap,
    /// The queue is copied, not consumed: RTA refines the same sites.
    pub queue: Vec<UnresolvedCall>,
}

/// Class-hierarchy analysis: for each unresolved call, enumerate every
/// method body with the right name on the receiver type or any of its
/// subtypes/implementers. A direct method on the receiver type does not
/// suppress descendants — polymorphism is preserved.
pub(crate) struct ChaPass;

impl ChaPass {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run(
        queue: Vec<UnresolvedCall>,
        index: &FunctionIndex,
        hierarchy: &ClassHierarchy,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
    ) -> anyhow::Result<ChaOutcome> {
        let mut candidate_map: CandidateMap = IndexMap::new();

        for entry in &queue {
            stats.cha.sites_seen += 1;
            let receiver = entry.receiver_type.as_deref();

            let mut targets: Vec<(String, FunctionId)> = index
                .functions_named(&entry.method_name)
                .iter()
                .filter_map(|id| {
                    let record = index.by_id(id)?;
                    match receiver {
                        Some(receiver_type) => {
                            let class = record.class_name.as_ref()?;
                            hierarchy
                                .is_subtype_of(class, receiver_type)
                                .then(|| (class.clone(), id.clone()))
                        }
                        None => Some((
                            record.class_name.clone().unwrap_or_default(),
                            id.clone(),
                        )),
                    }
                })
                .collect();

            if targets.is_empty() {
                trace!(method = %entry.method_name, ?receiver, "no hierarchy candidates");
                stats.cha.dropped += 1;
                continue;
            }

            targets.sort_by(|a, b| {
                let file_a = index.by_id(&a.1).map(|r| r.file_path.clone());
                let file_b = index.by_id(&b.1).map(|r| r.file_path.clone());
                (&a.0, file_a).cmp(&(&b.0, file_b))
            });

            let Some(caller) = index.by_id(&entry.caller_id).cloned() else {
                stats.cha.dropped += 1;
                continue;
            };

            let receiver_is_abstract = receiver.is_some_and(|r| hierarchy.is_abstract(r));
            let receiver_is_class = receiver.is_some_and(|r| hierarchy.is_class(r));
            let confidence = policy.cha_score(receiver_is_abstract, receiver_is_class);
            let source = if receiver.is_some() {
                ResolutionSource::HierarchyReceiver
            } else {
                ResolutionSource::HierarchyNameOnly
            };

            let all_ids: Vec<FunctionId> = targets.iter().map(|(_, id)| id.clone()).collect();
            for (_, target_id) in &targets {
                let Some(callee) = index.by_id(target_id) else {
                    continue;
                };
                // Every edge of the set carries the full enumeration, with
                // its own callee rotated to the front.
                let mut candidates = vec![target_id.clone()];
                candidates.extend(all_ids.iter().filter(|id| *id != target_id).cloned());
                let edge = make_edge(
                    &caller,
                    callee,
                    candidates,
                    CallKind::Virtual,
                    source,
                    confidence,
                    entry.line,
                    entry.column,
                    false,
                    snapshot,
                );
                if ledger.add_edge(index, edge) {
                    stats.cha.edges_added += 1;
                    stats.strategies.record(source);
                }
            }

            let merged = candidate_map.entry(entry.method_name.clone()).or_default();
            for pair in targets {
                if !merged.contains(&pair) {
                    merged.push(pair);
                }
            }
        }

        Ok(ChaOutcome {
            candidate_map,
            queue,
        })
    }
}
