use crate::index::FunctionIndex;
use crate::ledger::EdgeLedger;
use crate::passes::{ChaOutcome, ChaPass, ImportPass, LocalPass, RtaPass, RuntimePass};
use calltrail_core::{
    AnalysisStats, CallEdge, ConfidencePolicy, CoreError, FunctionId, FunctionRecord, PassId,
};
use calltrail_events::{AnalysisEvent, ProgressTx};
use calltrail_oracle::{ClassHierarchy, SyntaxKind, SyntaxOracle, TypeOracle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("function index rejected the catalog: {0}")]
    Index(#[from] CoreError),
}

/// Environment toggles honored by the coordinator. Programmatic settings
/// always win; `from_env` only reads the documented variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveFlags {
    /// Per-stage site-level logs.
    pub debug_trace: bool,
    /// Force a second resolution pass when the first yields an empty graph
    /// despite non-trivial input.
    pub retry_on_empty: bool,
}

impl ResolveFlags {
    pub fn from_env() -> Self {
        Self {
            debug_trace: env_flag("CALLTRAIL_DEBUG_TRACE"),
            retry_on_empty: env_flag("CALLTRAIL_RETRY_ON_EMPTY"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Indexing,
    Walking,
    Cha,
    Rta,
    Runtime,
    Done,
}

/// Host-side handle for stopping a run early. The coordinator polls the
/// underlying flag between files and between stages; whatever is in
/// flight finishes, and the partial result comes back labelled
/// `cancelled` in its statistics.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Everything one analysis run consumes. The coordinator holds read
/// references only; oracles and hierarchy stay owned by the host.
pub struct AnalysisInput<'a> {
    pub functions: Vec<FunctionRecord>,
    pub syntax: &'a dyn SyntaxOracle,
    pub types: &'a dyn TypeOracle,
    pub hierarchy: &'a ClassHierarchy,
    /// Externally witnessed `(caller, callee)` pairs, optional.
    pub runtime_pairs: Vec<(FunctionId, FunctionId)>,
}

pub struct AnalysisOutcome {
    /// Ordered, bit-stable across runs on the same input.
    pub edges: Vec<CallEdge>,
    pub stats: AnalysisStats,
}

/// Drives the staged pipeline `Idle → Indexing → Walking → Cha → Rta →
/// Runtime → Done`. Transitions are linear and total; a stage failure is
/// caught and logged, and the stage simply contributes no edges. All
/// mutable state lives for one run and is rebuilt by the next.
pub struct Coordinator {
    snapshot: String,
    flags: ResolveFlags,
    policy: ConfidencePolicy,
    phase: Phase,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressTx>,
}

impl Coordinator {
    pub fn new(snapshot: impl Into<String>, flags: ResolveFlags) -> Self {
        Self {
            snapshot: snapshot.into(),
            flags,
            policy: ConfidencePolicy::default(),
            phase: Phase::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_policy(mut self, policy: ConfidencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach the sending half of a progress channel; the host keeps the
    /// receiving half.
    pub fn with_progress(mut self, progress: ProgressTx) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Handle for the host to stop this run between files or stages.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Return to `Idle` with a fresh cancellation flag. No state survives
    /// into the next run.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.cancel = Arc::new(AtomicBool::new(false));
    }

    fn stop_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn run(&mut self, input: &AnalysisInput<'_>) -> Result<AnalysisOutcome, ResolveError> {
        let started = Instant::now();

        self.phase = Phase::Indexing;
        let index = FunctionIndex::build(input.functions.clone())?;
        input.types.clear_cache();

        let files = {
            let mut files = input.syntax.files();
            files.sort();
            files
        };
        self.report(AnalysisEvent::AnalysisStarted {
            file_count: files.len(),
        });

        // Each attempt starts from a fresh ledger and fresh counters, so
        // the reported statistics always describe the attempt whose graph
        // is returned. The first attempt only arms a retry when it ends
        // empty, so discarding its ledger loses nothing. Total wall time
        // still spans the whole run.
        let mut attempt = 0;
        let mut second_pass_taken = false;
        let (mut ledger, mut stats) = loop {
            attempt += 1;
            let mut ledger = EdgeLedger::new();
            let mut stats = AnalysisStats::default();
            self.resolve_once(input, &index, &files, &mut ledger, &mut stats);

            let retry = self.flags.retry_on_empty
                && attempt == 1
                && ledger.edge_count() == 0
                && stats.local.sites_seen > 0
                && !stats.cancelled;
            if !retry {
                break (ledger, stats);
            }
            second_pass_taken = true;
            debug!("first pass produced no edges over non-trivial input; forcing a second pass");
        };
        stats.second_pass_taken = second_pass_taken;

        self.phase = Phase::Runtime;
        if !stats.cancelled && !input.runtime_pairs.is_empty() {
            self.report(AnalysisEvent::PassStarted {
                pass: PassId::Runtime,
            });
            let before = stats.runtime.edges_added;
            if let Err(error) =
                RuntimePass::run(&input.runtime_pairs, &mut ledger, &self.policy, &mut stats)
            {
                warn!(%error, "runtime pass failed; no confirmations applied");
            }
            self.report(AnalysisEvent::PassFinished {
                pass: PassId::Runtime,
                edges_added: stats.runtime.edges_added - before,
            });
        }

        self.phase = Phase::Done;
        stats.dropped_caller_unknown = ledger.dropped_caller_unknown();
        stats.total_duration_ms = started.elapsed().as_millis() as u64;

        if stats.cancelled {
            self.report(AnalysisEvent::AnalysisCancelled);
        } else {
            self.report(AnalysisEvent::AnalysisFinished {
                duration_ms: stats.total_duration_ms,
            });
        }
        info!(
            edges = ledger.edge_count(),
            files = stats.files_walked,
            cancelled = stats.cancelled,
            "analysis finished"
        );

        Ok(AnalysisOutcome {
            edges: ledger.into_edges(),
            stats,
        })
    }

    /// One Walking → Cha → Rta sweep. Per-file work feeds the local pass
    /// and then the import pass inside a single AST walk, so instantiation
    /// events collected locally are complete before RTA starts.
    fn resolve_once(
        &mut self,
        input: &AnalysisInput<'_>,
        index: &FunctionIndex,
        files: &[std::path::PathBuf],
        ledger: &mut EdgeLedger,
        stats: &mut AnalysisStats,
    ) {
        self.phase = Phase::Walking;
        let total = files.len();
        for (position, file) in files.iter().enumerate() {
            if self.stop_requested() {
                stats.cancelled = true;
                return;
            }

            let sites: Vec<_> = input
                .syntax
                .nodes(file)
                .into_iter()
                .filter(|&node| {
                    matches!(
                        input.syntax.classify(node),
                        SyntaxKind::Call | SyntaxKind::New
                    )
                })
                .collect();

            let local_started = Instant::now();
            let pending = match LocalPass::run(
                file,
                &sites,
                input.syntax,
                index,
                ledger,
                &self.policy,
                &self.snapshot,
                stats,
            ) {
                Ok(pending) => pending,
                Err(error) => {
                    warn!(%error, file = %file.display(), "local pass failed for file");
                    Vec::new()
                }
            };
            stats.local.duration_ms += elapsed_ms(local_started);

            let import_started = Instant::now();
            if let Err(error) = ImportPass::run(
                file,
                &pending,
                input.syntax,
                input.types,
                input.hierarchy,
                index,
                ledger,
                &self.policy,
                &self.snapshot,
                stats,
            ) {
                warn!(%error, file = %file.display(), "import pass failed for file");
            }
            stats.import.duration_ms += elapsed_ms(import_started);

            stats.files_walked += 1;
            if self.flags.debug_trace {
                debug!(
                    file = %file.display(),
                    sites = sites.len(),
                    pending = pending.len(),
                    "file walked"
                );
            }
            self.report(AnalysisEvent::FileWalked {
                current: position + 1,
                total,
            });
        }

        if self.stop_requested() {
            stats.cancelled = true;
            return;
        }

        self.phase = Phase::Cha;
        self.report(AnalysisEvent::PassStarted { pass: PassId::Cha });
        let cha_started = Instant::now();
        let queue = ledger.take_queue();
        let outcome = match ChaPass::run(
            queue,
            index,
            input.hierarchy,
            ledger,
            &self.policy,
            &self.snapshot,
            stats,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "hierarchy pass failed; no candidates produced");
                ChaOutcome {
                    candidate_map: Default::default(),
                    queue: Vec::new(),
                }
            }
        };
        stats.cha.duration_ms += elapsed_ms(cha_started);
        self.report(AnalysisEvent::PassFinished {
            pass: PassId::Cha,
            edges_added: stats.cha.edges_added,
        });

        if self.stop_requested() {
            stats.cancelled = true;
            return;
        }

        self.phase = Phase::Rta;
        self.report(AnalysisEvent::PassStarted { pass: PassId::Rta });
        let rta_started = Instant::now();
        if let Err(error) = RtaPass::run(
            &outcome.queue,
            &outcome.candidate_map,
            index,
            input.hierarchy,
            ledger,
            &self.policy,
            &self.snapshot,
            stats,
        ) {
            warn!(%error, "rapid-type pass failed; hierarchy edges stand");
        }
        stats.rta.duration_ms += elapsed_ms(rta_started);
        self.report(AnalysisEvent::PassFinished {
            pass: PassId::Rta,
            edges_added: stats.rta.edges_added,
        });
    }

    fn report(&self, event: AnalysisEvent) {
        if let Some(progress) = &self.progress {
            progress.report(event);
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use calltrail_oracle::{
        DeclaredTypeOracle, TreeSitterSyntaxOracle, harvest_functions, harvest_hierarchy,
    };
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct Fixture {
        syntax: Arc<TreeSitterSyntaxOracle>,
        types: DeclaredTypeOracle,
        hierarchy: ClassHierarchy,
        functions: Vec<FunctionRecord>,
    }

    impl Fixture {
        fn new(source: &str) -> Self {
            let syntax = Arc::new(
                TreeSitterSyntaxOracle::parse(vec![(
                    PathBuf::from("/fixture.ts"),
                    source.to_string(),
                )])
                .expect("fixture parses"),
            );
            let types = DeclaredTypeOracle::build(Arc::clone(&syntax), HashSet::new());
            let hierarchy = harvest_hierarchy(&syntax);
            let functions = harvest_functions(&syntax, "snap-unit");
            Self {
                syntax,
                types,
                hierarchy,
                functions,
            }
        }

        fn input(&self) -> AnalysisInput<'_> {
            AnalysisInput {
                functions: self.functions.clone(),
                syntax: &*self.syntax,
                types: &self.types,
                hierarchy: &self.hierarchy,
                runtime_pairs: Vec::new(),
            }
        }
    }

    #[test]
    fn test_phases_progress_to_done_and_reset() {
        let fixture = Fixture::new("function a() { a(); }\n");
        let mut coordinator = Coordinator::new("snap-unit", ResolveFlags::default());
        assert_eq!(coordinator.phase(), Phase::Idle);

        coordinator.run(&fixture.input()).expect("run");
        assert_eq!(coordinator.phase(), Phase::Done);

        coordinator.reset();
        assert_eq!(coordinator.phase(), Phase::Idle);
        assert!(!coordinator.cancel_handle().stop_requested());
    }

    #[test]
    fn test_retry_on_empty_takes_a_second_pass() {
        // One call site that nothing can resolve: the first pass ends with
        // zero edges over non-trivial input, which arms the retry.
        let fixture = Fixture::new("function a() { mystery(); }\n");
        let flags = ResolveFlags {
            debug_trace: false,
            retry_on_empty: true,
        };
        let outcome = Coordinator::new("snap-unit", flags)
            .run(&fixture.input())
            .expect("run");

        assert!(outcome.edges.is_empty());
        assert!(outcome.stats.second_pass_taken);

        // Counters describe the deciding attempt, not the sum of both:
        // one file, one call site, one enqueue, nothing double-counted.
        assert_eq!(outcome.stats.files_walked, 1);
        assert_eq!(outcome.stats.local.sites_seen, 1);
        assert_eq!(outcome.stats.import.sites_seen, 1);
        assert_eq!(outcome.stats.unresolved_enqueued, 1);
        assert_eq!(outcome.stats.cha.sites_seen, 1);
        assert_eq!(outcome.stats.instantiation_events, 0);
    }

    #[test]
    fn test_no_retry_when_graph_is_non_empty() {
        let fixture = Fixture::new("function a() { b(); }\nfunction b() {}\n");
        let flags = ResolveFlags {
            debug_trace: false,
            retry_on_empty: true,
        };
        let outcome = Coordinator::new("snap-unit", flags)
            .run(&fixture.input())
            .expect("run");

        assert_eq!(outcome.edges.len(), 1);
        assert!(!outcome.stats.second_pass_taken);
    }

    #[test]
    fn test_malformed_catalog_fails_the_run() {
        let fixture = Fixture::new("function a() {}\n");
        let mut functions = fixture.functions.clone();
        functions[0].end_line = 0;

        let input = AnalysisInput {
            functions,
            syntax: &*fixture.syntax,
            types: &fixture.types,
            hierarchy: &fixture.hierarchy,
            runtime_pairs: Vec::new(),
        };
        let result = Coordinator::new("snap-unit", ResolveFlags::default()).run(&input);
        assert!(matches!(result, Err(ResolveError::Index(_))));
    }
}
