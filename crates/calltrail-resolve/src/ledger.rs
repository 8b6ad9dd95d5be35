use crate::index::FunctionIndex;
use calltrail_core::{
    CallEdge, ConfidencePolicy, FunctionId, InstantiationEvent, ResolutionLevel,
    ResolutionSource, SyntaxNodeId, UnresolvedCall,
};
use indexmap::IndexMap;
use indexmap::map::Entry;
use std::collections::HashSet;
use tracing::trace;

/// Append-once store of everything a run produces: the edge map, the
/// unresolved-call queue that flows between stages, and the
/// instantiation-event log that fuels rapid-type filtering.
///
/// Edges dedup by `(caller, callee, site line)`. Re-insertion replaces an
/// edge only when the newcomer's confidence is strictly greater; the
/// `runtime_confirmed` bit latches across replacements. Insertion order is
/// preserved so two runs over the same input produce identical edge lists.
#[derive(Default)]
pub struct EdgeLedger {
    edges: IndexMap<String, CallEdge>,
    queue: Vec<UnresolvedCall>,
    queued: HashSet<(FunctionId, String, u32)>,
    external_sites: HashSet<SyntaxNodeId>,
    instantiations: Vec<InstantiationEvent>,
    dropped_caller_unknown: usize,
}

impl EdgeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the edge was inserted or replaced a
    /// lower-confidence resolution of the same site. An edge whose caller
    /// is unknown to the index is silently dropped and counted.
    pub fn add_edge(&mut self, index: &FunctionIndex, edge: CallEdge) -> bool {
        if !index.contains(&edge.caller_id) {
            self.dropped_caller_unknown += 1;
            return false;
        }
        match self.edges.entry(edge.dedup_key()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                if edge.confidence > existing.confidence {
                    let confirmed = existing.runtime_confirmed;
                    let mut replacement = edge;
                    replacement.runtime_confirmed |= confirmed;
                    occupied.insert(replacement);
                    true
                } else {
                    trace!(key = %occupied.key(), "edge kept at higher confidence");
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(edge);
                true
            }
        }
    }

    /// Queue an unresolved call for the hierarchy passes, deduped by
    /// `(caller, method, line)`.
    pub fn enqueue_unresolved(&mut self, call: UnresolvedCall) -> bool {
        if self.queued.insert(call.site_key()) {
            self.queue.push(call);
            true
        } else {
            false
        }
    }

    /// Suppress future enqueues for a site classified as external.
    pub fn mark_external(&mut self, node: SyntaxNodeId) {
        self.external_sites.insert(node);
    }

    pub fn is_external(&self, node: SyntaxNodeId) -> bool {
        self.external_sites.contains(&node)
    }

    pub fn record_instantiation(&mut self, event: InstantiationEvent) {
        self.instantiations.push(event);
    }

    pub fn instantiations(&self) -> &[InstantiationEvent] {
        &self.instantiations
    }

    /// Drain the queue for CHA, releasing the dedup keys so a forced
    /// second pass can enqueue the same sites again.
    pub fn take_queue(&mut self) -> Vec<UnresolvedCall> {
        self.queued.clear();
        std::mem::take(&mut self.queue)
    }

    /// Latch the runtime-confirmed bit on every edge with the given
    /// caller/callee key. Pairs without a matching edge are ignored; the
    /// ledger never synthesizes edges from traces.
    pub fn confirm_edge(
        &mut self,
        caller: &FunctionId,
        callee: &FunctionId,
        policy: &ConfidencePolicy,
    ) -> bool {
        let mut confirmed = false;
        for edge in self.edges.values_mut() {
            if &edge.caller_id == caller && &edge.callee_id == callee {
                edge.confidence = policy.runtime_confirmed;
                edge.runtime_confirmed = true;
                edge.level = ResolutionLevel::RuntimeConfirmed;
                edge.source = ResolutionSource::TraceOverlay;
                confirmed = true;
            }
        }
        confirmed
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn dropped_caller_unknown(&self) -> usize {
        self.dropped_caller_unknown
    }

    pub fn edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.edges.values()
    }

    pub fn into_edges(self) -> Vec<CallEdge> {
        self.edges.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calltrail_core::{CallKind, FunctionRecord};

    fn index_with(names: &[&str]) -> FunctionIndex {
        let records = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                FunctionRecord::new(
                    *name,
                    None,
                    "/zoo.ts",
                    (i as u32) * 10 + 1,
                    (i as u32) * 10 + 5,
                    *name,
                    "snap-1",
                )
            })
            .collect();
        FunctionIndex::build(records).unwrap()
    }

    fn edge_between(index: &FunctionIndex, caller: &str, callee: &str, conf: f32) -> CallEdge {
        let caller = index.functions_named(caller)[0].clone();
        let callee_id = index.functions_named(callee)[0].clone();
        CallEdge {
            id: CallEdge::stable_id(&caller, &callee_id, 3),
            caller_id: caller,
            callee_id: callee_id.clone(),
            callee_name: callee.to_string(),
            callee_class: None,
            kind: CallKind::Direct,
            line: 3,
            column: 5,
            optional_chaining: false,
            confidence: conf,
            level: ResolutionLevel::LocalExact,
            source: ResolutionSource::SameFileFunction,
            candidates: vec![callee_id],
            runtime_confirmed: false,
            origin_file_hash: "hash".to_string(),
        }
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let index = index_with(&["a", "b"]);
        let mut ledger = EdgeLedger::new();
        let edge = edge_between(&index, "a", "b", 1.0);

        assert!(ledger.add_edge(&index, edge.clone()));
        assert!(!ledger.add_edge(&index, edge));
        assert_eq!(ledger.edge_count(), 1);
    }

    #[test]
    fn test_higher_confidence_replaces() {
        let index = index_with(&["a", "b"]);
        let mut ledger = EdgeLedger::new();
        ledger.add_edge(&index, edge_between(&index, "a", "b", 0.8));
        assert!(ledger.add_edge(&index, edge_between(&index, "a", "b", 0.9)));

        let edges: Vec<_> = ledger.edges().collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].confidence, 0.9);
    }

    #[test]
    fn test_lower_confidence_is_ignored() {
        let index = index_with(&["a", "b"]);
        let mut ledger = EdgeLedger::new();
        ledger.add_edge(&index, edge_between(&index, "a", "b", 0.95));
        assert!(!ledger.add_edge(&index, edge_between(&index, "a", "b", 0.9)));
        assert_eq!(ledger.edges().next().unwrap().confidence, 0.95);
    }

    #[test]
    fn test_runtime_bit_latches_across_replacement() {
        let index = index_with(&["a", "b"]);
        let mut ledger = EdgeLedger::new();
        let policy = ConfidencePolicy::default();

        ledger.add_edge(&index, edge_between(&index, "a", "b", 0.8));
        let caller = index.functions_named("a")[0].clone();
        let callee = index.functions_named("b")[0].clone();
        assert!(ledger.confirm_edge(&caller, &callee, &policy));

        // Replacement at confidence 1.0 cannot beat the confirmed 1.0, so
        // the confirmed edge persists...
        assert!(!ledger.add_edge(&index, edge_between(&index, "a", "b", 1.0)));
        assert!(ledger.edges().next().unwrap().runtime_confirmed);
    }

    #[test]
    fn test_confirm_unknown_pair_is_ignored() {
        let index = index_with(&["a", "b", "c"]);
        let mut ledger = EdgeLedger::new();
        let policy = ConfidencePolicy::default();
        ledger.add_edge(&index, edge_between(&index, "a", "b", 1.0));

        let caller = index.functions_named("a")[0].clone();
        let other = index.functions_named("c")[0].clone();
        assert!(!ledger.confirm_edge(&caller, &other, &policy));
        assert_eq!(ledger.edge_count(), 1);
    }

    #[test]
    fn test_unknown_caller_is_dropped_and_counted() {
        let index = index_with(&["a", "b"]);
        let ghost_index = index_with(&["ghost", "b"]);
        let mut ledger = EdgeLedger::new();
        let edge = edge_between(&ghost_index, "ghost", "b", 1.0);

        assert!(!ledger.add_edge(&index, edge));
        assert_eq!(ledger.edge_count(), 0);
        assert_eq!(ledger.dropped_caller_unknown(), 1);
    }

    #[test]
    fn test_enqueue_dedups_by_site() {
        let index = index_with(&["a"]);
        let caller = index.functions_named("a")[0].clone();
        let mut ledger = EdgeLedger::new();
        let call = UnresolvedCall {
            caller_id: caller,
            method_name: "speak".to_string(),
            receiver_type: Some("Dog".to_string()),
            line: 4,
            column: 2,
        };
        assert!(ledger.enqueue_unresolved(call.clone()));
        assert!(!ledger.enqueue_unresolved(call));
        assert_eq!(ledger.take_queue().len(), 1);
    }

    #[test]
    fn test_take_queue_releases_dedup_keys() {
        let index = index_with(&["a"]);
        let caller = index.functions_named("a")[0].clone();
        let mut ledger = EdgeLedger::new();
        let call = UnresolvedCall {
            caller_id: caller,
            method_name: "speak".to_string(),
            receiver_type: None,
            line: 4,
            column: 2,
        };
        ledger.enqueue_unresolved(call.clone());
        assert_eq!(ledger.take_queue().len(), 1);
        assert!(ledger.enqueue_unresolved(call));
    }

    #[test]
    fn test_external_site_suppression() {
        let mut ledger = EdgeLedger::new();
        let node = SyntaxNodeId { file: 0, index: 7 };
        assert!(!ledger.is_external(node));
        ledger.mark_external(node);
        assert!(ledger.is_external(node));
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let index = index_with(&["a", "b", "c"]);
        let mut ledger = EdgeLedger::new();
        ledger.add_edge(&index, edge_between(&index, "a", "b", 1.0));
        ledger.add_edge(&index, edge_between(&index, "a", "c", 1.0));
        ledger.add_edge(&index, edge_between(&index, "b", "c", 1.0));

        let callees: Vec<_> = ledger
            .edges()
            .map(|e| e.callee_name.clone())
            .collect();
        assert_eq!(callees, vec!["b", "c", "c"]);
    }
}
