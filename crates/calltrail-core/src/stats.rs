use crate::ResolutionSource;
use serde::{Deserialize, Serialize};

/// Per-stage counters, reported in the statistics block of every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassTelemetry {
    pub sites_seen: usize,
    pub edges_added: usize,
    pub dropped: usize,
    pub duration_ms: u64,
}

/// How many edges each resolution rule produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCounters {
    pub same_file_function: usize,
    pub same_file_constructor: usize,
    pub same_class_this: usize,
    pub imported_function: usize,
    pub imported_constructor: usize,
    pub imported_property: usize,
    pub hierarchy_receiver: usize,
    pub hierarchy_name_only: usize,
    pub instantiated_receiver: usize,
    pub trace_overlay: usize,
}

impl StrategyCounters {
    pub fn record(&mut self, source: ResolutionSource) {
        match source {
            ResolutionSource::SameFileFunction => self.same_file_function += 1,
            ResolutionSource::SameFileConstructor => self.same_file_constructor += 1,
            ResolutionSource::SameClassThis => self.same_class_this += 1,
            ResolutionSource::ImportedFunction => self.imported_function += 1,
            ResolutionSource::ImportedConstructor => self.imported_constructor += 1,
            ResolutionSource::ImportedProperty => self.imported_property += 1,
            ResolutionSource::HierarchyReceiver => self.hierarchy_receiver += 1,
            ResolutionSource::HierarchyNameOnly => self.hierarchy_name_only += 1,
            ResolutionSource::InstantiatedReceiver => self.instantiated_receiver += 1,
            ResolutionSource::TraceOverlay => self.trace_overlay += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.same_file_function
            + self.same_file_constructor
            + self.same_class_this
            + self.imported_function
            + self.imported_constructor
            + self.imported_property
            + self.hierarchy_receiver
            + self.hierarchy_name_only
            + self.instantiated_receiver
            + self.trace_overlay
    }
}

/// RTA candidate-set shrinkage for one method name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodReduction {
    pub method: String,
    pub candidates_before: usize,
    pub candidates_after: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub files_walked: usize,
    pub local: PassTelemetry,
    pub import: PassTelemetry,
    pub cha: PassTelemetry,
    pub rta: PassTelemetry,
    pub runtime: PassTelemetry,
    pub strategies: StrategyCounters,
    pub rta_reduction: Vec<MethodReduction>,
    /// Edges dropped because the caller id was absent from the index.
    pub dropped_caller_unknown: usize,
    /// Sites dropped because no containing function was found.
    pub missing_caller: usize,
    pub oracle_failures: usize,
    pub external_sites: usize,
    pub instantiation_events: usize,
    pub unresolved_enqueued: usize,
    pub second_pass_taken: bool,
    pub cancelled: bool,
    pub total_duration_ms: u64,
}
