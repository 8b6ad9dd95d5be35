use calltrail_core::{
    CallEdge, CallKind, ConfidencePolicy, FunctionId, FunctionRecord, ResolutionLevel,
    ResolutionSource,
};
use calltrail_resolve::{EdgeLedger, FunctionIndex};
use proptest::prelude::*;
use std::collections::HashMap;

const FUNCTIONS: usize = 4;

fn catalog() -> FunctionIndex {
    let records = (0..FUNCTIONS)
        .map(|i| {
            FunctionRecord::new(
                format!("f{i}"),
                None,
                "/props.ts",
                (i as u32) * 10 + 1,
                (i as u32) * 10 + 8,
                format!("f{i}"),
                "snap-prop",
            )
        })
        .collect();
    FunctionIndex::build(records).expect("catalog builds")
}

fn id_of(index: &FunctionIndex, i: usize) -> FunctionId {
    index.functions_named(&format!("f{i}"))[0].clone()
}

fn edge(index: &FunctionIndex, caller: usize, callee: usize, line: u32, conf: f32) -> CallEdge {
    let caller = id_of(index, caller);
    let callee = id_of(index, callee);
    CallEdge {
        id: CallEdge::stable_id(&caller, &callee, line),
        caller_id: caller,
        callee_id: callee.clone(),
        callee_name: "f".to_string(),
        callee_class: None,
        kind: CallKind::Direct,
        line,
        column: 1,
        optional_chaining: false,
        confidence: conf,
        level: ResolutionLevel::LocalExact,
        source: ResolutionSource::SameFileFunction,
        candidates: vec![callee],
        runtime_confirmed: false,
        origin_file_hash: "hash".to_string(),
    }
}

type Op = (usize, usize, u32, f32);

fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        (0..FUNCTIONS, 0..FUNCTIONS, 1u32..12, 0.0f32..=1.0f32),
        0..48,
    )
}

proptest! {
    /// Inserting every edge twice leaves the ledger exactly as inserting
    /// it once does.
    #[test]
    fn insertion_is_idempotent(ops in op_strategy()) {
        let index = catalog();

        let mut once = EdgeLedger::new();
        for &(caller, callee, line, conf) in &ops {
            once.add_edge(&index, edge(&index, caller, callee, line, conf));
        }

        let mut twice = EdgeLedger::new();
        for &(caller, callee, line, conf) in &ops {
            let e = edge(&index, caller, callee, line, conf);
            twice.add_edge(&index, e.clone());
            twice.add_edge(&index, e);
        }

        prop_assert_eq!(once.into_edges(), twice.into_edges());
    }

    /// For every dedup key the retained confidence is the maximum ever
    /// offered for that key.
    #[test]
    fn retained_confidence_is_the_maximum(ops in op_strategy()) {
        let index = catalog();
        let mut ledger = EdgeLedger::new();
        let mut expected: HashMap<String, f32> = HashMap::new();

        for &(caller, callee, line, conf) in &ops {
            let e = edge(&index, caller, callee, line, conf);
            let key = e.dedup_key();
            ledger.add_edge(&index, e);
            expected
                .entry(key)
                .and_modify(|max| *max = max.max(conf))
                .or_insert(conf);
        }

        for e in ledger.into_edges() {
            prop_assert_eq!(e.confidence, expected[&e.dedup_key()]);
        }
    }

    /// Once a caller/callee pair is confirmed, no later insertion clears
    /// the runtime bit.
    #[test]
    fn runtime_confirmation_latches(
        before in op_strategy(),
        after in op_strategy(),
        pair in (0..FUNCTIONS, 0..FUNCTIONS),
    ) {
        let index = catalog();
        let policy = ConfidencePolicy::default();
        let mut ledger = EdgeLedger::new();

        for &(caller, callee, line, conf) in &before {
            ledger.add_edge(&index, edge(&index, caller, callee, line, conf));
        }

        let caller = id_of(&index, pair.0);
        let callee = id_of(&index, pair.1);
        let confirmed = ledger.confirm_edge(&caller, &callee, &policy);

        for &(c0, c1, line, conf) in &after {
            ledger.add_edge(&index, edge(&index, c0, c1, line, conf));
        }

        if confirmed {
            let still_confirmed = ledger
                .into_edges()
                .into_iter()
                .filter(|e| e.caller_id == caller && e.callee_id == callee)
                .all(|e| e.runtime_confirmed && e.confidence == policy.runtime_confirmed);
            prop_assert!(still_confirmed);
        }
    }

    /// Dropped-caller accounting: edges whose caller the index has never
    /// seen do not enter the ledger.
    #[test]
    fn unknown_callers_never_enter_the_ledger(ops in op_strategy()) {
        let index = catalog();
        let ghost_records = vec![FunctionRecord::new(
            "ghost",
            None,
            "/elsewhere.ts",
            1,
            2,
            "ghost",
            "snap-prop",
        )];
        let ghost_index = FunctionIndex::build(ghost_records).expect("ghost catalog");
        let ghost = ghost_index.functions_named("ghost")[0].clone();

        let mut ledger = EdgeLedger::new();
        for &(_, callee, line, conf) in &ops {
            let mut e = edge(&index, 0, callee, line, conf);
            e.caller_id = ghost.clone();
            ledger.add_edge(&index, e);
        }

        prop_assert_eq!(ledger.edge_count(), 0);
        prop_assert_eq!(ledger.dropped_caller_unknown(), ops.len());
    }
}
