use calltrail_core::{
    CallEdge, CallKind, FunctionId, FunctionRecord, ResolutionSource, origin_file_hash,
};

pub(crate) mod cha;
pub(crate) mod import;
pub(crate) mod local;
pub(crate) mod rta;
pub(crate) mod runtime;

pub(crate) use cha::{ChaOutcome, ChaPass};
pub(crate) use import::ImportPass;
pub(crate) use local::LocalPass;
pub(crate) use rta::RtaPass;
pub(crate) use runtime::RuntimePass;

/// Assemble an edge. The primary callee is always `candidates[0]`; callers
/// either pass an explicit candidate ordering or leave it empty for a
/// unique resolution.
#[allow(clippy::too_many_arguments)]
pub(crate) fn make_edge(
    caller: &FunctionRecord,
    callee: &FunctionRecord,
    mut candidates: Vec<FunctionId>,
    kind: CallKind,
    source: ResolutionSource,
    confidence: f32,
    line: u32,
    column: u32,
    optional_chaining: bool,
    snapshot: &str,
) -> CallEdge {
    if candidates.is_empty() {
        candidates.push(callee.id.clone());
    }
    debug_assert_eq!(candidates[0], callee.id);
    CallEdge {
        id: CallEdge::stable_id(&caller.id, &callee.id, line),
        caller_id: caller.id.clone(),
        callee_id: callee.id.clone(),
        callee_name: callee.name.clone(),
        callee_class: callee.class_name.clone(),
        kind,
        line,
        column,
        optional_chaining,
        confidence,
        level: source.level(),
        source,
        candidates,
        runtime_confirmed: false,
        origin_file_hash: origin_file_hash(&caller.file_path, snapshot),
    }
}
