use crate::index::FunctionIndex;
use crate::ledger::EdgeLedger;
use crate::passes::make_edge;
use calltrail_core::{
    AnalysisStats, CallKind, ConfidencePolicy, FunctionRecord, InstantiationEvent,
    InstantiationKind, ResolutionLevel, ResolutionSource, SyntaxNodeId,
};
use calltrail_oracle::{CalleeShape, SyntaxKind, SyntaxOracle};
use std::path::Path;
use tracing::trace;

/// Intra-file resolution: identifier calls, `this.method` calls, and
/// same-file constructors. Instantiation events are recorded here for
/// every `new T(...)`, resolved or not, so the rapid-type pass sees the
/// whole program's allocations.
///
/// Property-access calls through any other receiver are deliberately
/// skipped — not resolved, not enqueued. The import pass is the sole
/// enqueuer for those, with the receiver's declared type attached.
pub(crate) struct LocalPass;

impl LocalPass {
    /// Returns the call/new nodes this pass did not resolve; the import
    /// pass retries exactly those in the same file walk.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run(
        file: &Path,
        sites: &[SyntaxNodeId],
        syntax: &dyn SyntaxOracle,
        index: &FunctionIndex,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
    ) -> anyhow::Result<Vec<SyntaxNodeId>> {
        let mut pending = Vec::new();

        for &site in sites {
            let (line, column) = syntax.start_position(site);
            match syntax.classify(site) {
                SyntaxKind::New => {
                    let Some(target) = syntax.new_target(site) else {
                        stats.local.dropped += 1;
                        continue;
                    };
                    stats.local.sites_seen += 1;
                    ledger.record_instantiation(InstantiationEvent {
                        type_name: target.name.clone(),
                        file_path: file.to_path_buf(),
                        line,
                        kind: InstantiationKind::Constructor,
                        node: target.node,
                    });
                    stats.instantiation_events += 1;

                    let Some(caller) = caller_at(index, file, line) else {
                        stats.missing_caller += 1;
                        continue;
                    };
                    let same_file_ctor = index
                        .constructor_of(&target.name)
                        .and_then(|id| index.by_id(id))
                        .filter(|ctor| ctor.file_path == caller.file_path);
                    match same_file_ctor {
                        Some(ctor) => {
                            let edge = make_edge(
                                &caller,
                                ctor,
                                Vec::new(),
                                CallKind::Constructor,
                                ResolutionSource::SameFileConstructor,
                                policy.score(ResolutionLevel::LocalExact, false),
                                line,
                                column,
                                false,
                                snapshot,
                            );
                            if ledger.add_edge(index, edge) {
                                stats.local.edges_added += 1;
                                stats.strategies.record(ResolutionSource::SameFileConstructor);
                            }
                        }
                        None => pending.push(site),
                    }
                }
                SyntaxKind::Call => {
                    stats.local.sites_seen += 1;
                    match syntax.call_callee(site) {
                        Some(CalleeShape::Identifier { name, .. }) => {
                            let ids = index.by_name(file, &name);
                            if ids.is_empty() {
                                pending.push(site);
                                continue;
                            }
                            let Some(caller) = caller_at(index, file, line) else {
                                stats.missing_caller += 1;
                                continue;
                            };
                            // Prefer a candidate sharing the caller's
                            // class, then first in source order.
                            let chosen = ids
                                .iter()
                                .find(|id| {
                                    index.by_id(id).is_some_and(|r| {
                                        r.class_name.is_some()
                                            && r.class_name == caller.class_name
                                    })
                                })
                                .unwrap_or(&ids[0])
                                .clone();
                            let mut candidates = vec![chosen.clone()];
                            candidates
                                .extend(ids.iter().filter(|id| **id != chosen).cloned());

                            let Some(callee) = index.by_id(&chosen) else {
                                stats.local.dropped += 1;
                                continue;
                            };
                            let edge = make_edge(
                                &caller,
                                callee,
                                candidates,
                                CallKind::Direct,
                                ResolutionSource::SameFileFunction,
                                policy.score(ResolutionLevel::LocalExact, false),
                                line,
                                column,
                                false,
                                snapshot,
                            );
                            if ledger.add_edge(index, edge) {
                                stats.local.edges_added += 1;
                                stats.strategies.record(ResolutionSource::SameFileFunction);
                            }
                        }
                        Some(CalleeShape::Member {
                            property,
                            optional_chain,
                            is_this: true,
                            ..
                        }) => {
                            let Some(caller) = caller_at(index, file, line) else {
                                stats.missing_caller += 1;
                                continue;
                            };
                            let same_class_method = caller.class_name.as_ref().and_then(|class| {
                                index
                                    .by_name(file, &property)
                                    .iter()
                                    .find(|id| {
                                        index.by_id(id).is_some_and(|r| {
                                            r.class_name.as_ref() == Some(class)
                                        })
                                    })
                                    .and_then(|id| index.by_id(id))
                            });
                            match same_class_method {
                                Some(callee) => {
                                    let edge = make_edge(
                                        &caller,
                                        callee,
                                        Vec::new(),
                                        CallKind::Direct,
                                        ResolutionSource::SameClassThis,
                                        policy.score(ResolutionLevel::LocalExact, optional_chain),
                                        line,
                                        column,
                                        optional_chain,
                                        snapshot,
                                    );
                                    if ledger.add_edge(index, edge) {
                                        stats.local.edges_added += 1;
                                        stats.strategies.record(ResolutionSource::SameClassThis);
                                    }
                                }
                                None => pending.push(site),
                            }
                        }
                        Some(CalleeShape::Member { .. }) => {
                            trace!(line, "property-access call left for the import pass");
                            pending.push(site);
                        }
                        None => {
                            stats.local.dropped += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(pending)
    }
}

fn caller_at(index: &FunctionIndex, file: &Path, line: u32) -> Option<FunctionRecord> {
    index
        .by_file_line(file, line)
        .and_then(|id| index.by_id(id))
        .cloned()
}
