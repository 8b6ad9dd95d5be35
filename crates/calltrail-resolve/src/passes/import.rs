use crate::index::FunctionIndex;
use crate::ledger::EdgeLedger;
use crate::passes::make_edge;
use calltrail_core::{
    AnalysisStats, CallKind, ConfidencePolicy, FunctionId, FunctionRecord, ResolutionLevel,
    ResolutionSource, SyntaxNodeId, UnresolvedCall,
};
use calltrail_oracle::{
    CalleeShape, ClassHierarchy, SymbolInfo, SyntaxKind, SyntaxOracle, TypeOracle,
    receiver_type_name,
};
use std::path::Path;
use tracing::{trace, warn};

/// Cross-file resolution through the type oracle: imported identifiers,
/// imported constructors, and property-access calls. Sites that reach a
/// builtin module are marked external and never enqueued; everything this
/// pass cannot pin to a function id flows to CHA as an unresolved call
/// carrying the receiver's *declared class name*, never the receiver's
/// variable spelling.
pub(crate) struct ImportPass;

impl ImportPass {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run(
        file: &Path,
        pending: &[SyntaxNodeId],
        syntax: &dyn SyntaxOracle,
        types: &dyn TypeOracle,
        hierarchy: &ClassHierarchy,
        index: &FunctionIndex,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
    ) -> anyhow::Result<()> {
        for &site in pending {
            if ledger.is_external(site) {
                continue;
            }
            let (line, column) = syntax.start_position(site);
            stats.import.sites_seen += 1;

            let Some(caller) = index
                .by_file_line(file, line)
                .and_then(|id| index.by_id(id))
                .cloned()
            else {
                stats.missing_caller += 1;
                continue;
            };

            match syntax.classify(site) {
                SyntaxKind::New => {
                    Self::resolve_new(
                        site, syntax, types, index, ledger, policy, snapshot, stats, &caller,
                        line, column,
                    );
                }
                SyntaxKind::Call => match syntax.call_callee(site) {
                    Some(CalleeShape::Identifier { name, node }) => {
                        Self::resolve_identifier(
                            site, &name, node, types, hierarchy, index, ledger, policy,
                            snapshot, stats, &caller, line, column,
                        );
                    }
                    Some(CalleeShape::Member {
                        property,
                        is_this: true,
                        ..
                    }) => {
                        // `this.m()` the local pass could not satisfy:
                        // the declared receiver is the caller's own class.
                        let receiver_type = caller
                            .class_name
                            .clone()
                            .filter(|class| hierarchy.known_type(class));
                        enqueue(
                            ledger,
                            stats,
                            UnresolvedCall {
                                caller_id: caller.id.clone(),
                                method_name: property,
                                receiver_type,
                                line,
                                column,
                            },
                        );
                    }
                    Some(CalleeShape::Member {
                        receiver,
                        receiver_text,
                        property,
                        optional_chain,
                        is_this: false,
                    }) => {
                        Self::resolve_member(
                            site,
                            receiver,
                            &receiver_text,
                            &property,
                            optional_chain,
                            types,
                            hierarchy,
                            index,
                            ledger,
                            policy,
                            snapshot,
                            stats,
                            &caller,
                            line,
                            column,
                        );
                    }
                    None => {
                        stats.import.dropped += 1;
                    }
                },
                _ => {}
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_new(
        site: SyntaxNodeId,
        syntax: &dyn SyntaxOracle,
        types: &dyn TypeOracle,
        index: &FunctionIndex,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
        caller: &FunctionRecord,
        line: u32,
        column: u32,
    ) {
        let Some(target) = syntax.new_target(site) else {
            stats.import.dropped += 1;
            return;
        };
        let symbol = lookup(types, target.node, stats);
        if let Some(symbol) = &symbol
            && let Some(specifier) = &symbol.module_specifier
            && types.is_builtin_module(specifier)
        {
            ledger.mark_external(site);
            stats.external_sites += 1;
            return;
        }
        // The declaration resolves to a class; its constructor is the
        // callee.
        let constructor = index
            .constructor_of(&target.name)
            .and_then(|id| index.by_id(id));
        match constructor {
            Some(ctor) if symbol.is_some() => {
                let edge = make_edge(
                    caller,
                    ctor,
                    Vec::new(),
                    CallKind::Constructor,
                    ResolutionSource::ImportedConstructor,
                    policy.score(ResolutionLevel::ImportExact, false),
                    line,
                    column,
                    false,
                    snapshot,
                );
                if ledger.add_edge(index, edge) {
                    stats.import.edges_added += 1;
                    stats
                        .strategies
                        .record(ResolutionSource::ImportedConstructor);
                }
            }
            _ => {
                trace!(class = %target.name, line, "constructor not in catalog");
                stats.import.dropped += 1;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_identifier(
        site: SyntaxNodeId,
        name: &str,
        node: SyntaxNodeId,
        types: &dyn TypeOracle,
        hierarchy: &ClassHierarchy,
        index: &FunctionIndex,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
        caller: &FunctionRecord,
        line: u32,
        column: u32,
    ) {
        let Some(symbol) = lookup(types, node, stats) else {
            // Unknown identifier: CHA may still match by name alone.
            enqueue(
                ledger,
                stats,
                UnresolvedCall {
                    caller_id: caller.id.clone(),
                    method_name: name.to_string(),
                    receiver_type: None,
                    line,
                    column,
                },
            );
            return;
        };
        if let Some(specifier) = &symbol.module_specifier
            && types.is_builtin_module(specifier)
        {
            ledger.mark_external(site);
            stats.external_sites += 1;
            return;
        }

        let mut resolved: Option<FunctionId> = None;
        for decl in &symbol.declarations {
            if let Some(id) = index.by_file_line(&decl.file, decl.line) {
                resolved = Some(id.clone());
                break;
            }
        }
        if resolved.is_none() {
            // Fall back to a name match within the declaring file.
            for decl in &symbol.declarations {
                if let Some(id) = index.by_name(&decl.file, name).first() {
                    resolved = Some(id.clone());
                    break;
                }
            }
        }

        match resolved.as_ref().and_then(|id| index.by_id(id)) {
            Some(callee) => {
                let edge = make_edge(
                    caller,
                    callee,
                    Vec::new(),
                    CallKind::Direct,
                    ResolutionSource::ImportedFunction,
                    policy.score(ResolutionLevel::ImportExact, false),
                    line,
                    column,
                    false,
                    snapshot,
                );
                if ledger.add_edge(index, edge) {
                    stats.import.edges_added += 1;
                    stats.strategies.record(ResolutionSource::ImportedFunction);
                }
            }
            None if symbol.declarations.is_empty() => {
                // Known symbol without a declaration we can see (e.g. an
                // import from an unanalyzed package): stays unresolved.
                stats.import.dropped += 1;
            }
            None => {
                // Index miss: the declaration exists but the catalog has
                // no entry for it.
                let receiver_type = declared_class(types, hierarchy, node, stats);
                enqueue(
                    ledger,
                    stats,
                    UnresolvedCall {
                        caller_id: caller.id.clone(),
                        method_name: name.to_string(),
                        receiver_type,
                        line,
                        column,
                    },
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_member(
        site: SyntaxNodeId,
        receiver: SyntaxNodeId,
        receiver_text: &str,
        property: &str,
        optional_chain: bool,
        types: &dyn TypeOracle,
        hierarchy: &ClassHierarchy,
        index: &FunctionIndex,
        ledger: &mut EdgeLedger,
        policy: &ConfidencePolicy,
        snapshot: &str,
        stats: &mut AnalysisStats,
        caller: &FunctionRecord,
        line: u32,
        column: u32,
    ) {
        let symbol = lookup(types, receiver, stats);

        if let Some(symbol) = symbol.as_ref().filter(|s| s.is_imported()) {
            if let Some(specifier) = &symbol.module_specifier
                && types.is_builtin_module(specifier)
            {
                ledger.mark_external(site);
                stats.external_sites += 1;
                return;
            }

            let mut resolved: Option<FunctionId> = None;
            for decl in &symbol.declarations {
                if let Some(id) = index.by_file_line(&decl.file, decl.line) {
                    resolved = Some(id.clone());
                    break;
                }
            }
            if resolved.is_none() {
                // A method of the imported class, matched by name in the
                // declaring file.
                for decl in &symbol.declarations {
                    if let Some(id) = index.by_name(&decl.file, property).iter().find(|id| {
                        index
                            .by_id(id)
                            .is_some_and(|r| r.class_name.as_deref() == Some(receiver_text))
                    }) {
                        resolved = Some((*id).clone());
                        break;
                    }
                }
            }

            if let Some(callee) = resolved.as_ref().and_then(|id| index.by_id(id)) {
                let edge = make_edge(
                    caller,
                    callee,
                    Vec::new(),
                    CallKind::Direct,
                    ResolutionSource::ImportedProperty,
                    policy.score(ResolutionLevel::ImportExact, optional_chain),
                    line,
                    column,
                    optional_chain,
                    snapshot,
                );
                if ledger.add_edge(index, edge) {
                    stats.import.edges_added += 1;
                    stats.strategies.record(ResolutionSource::ImportedProperty);
                }
                return;
            }
        }

        // Local variable, unresolved import target, or unknown receiver:
        // CHA decides, keyed by the declared class name.
        let receiver_type = declared_class(types, hierarchy, receiver, stats).or_else(|| {
            // Static calls spell the class directly.
            Some(receiver_text.to_string()).filter(|name| hierarchy.known_type(name))
        });
        enqueue(
            ledger,
            stats,
            UnresolvedCall {
                caller_id: caller.id.clone(),
                method_name: property.to_string(),
                receiver_type,
                line,
                column,
            },
        );
    }
}

fn lookup(
    types: &dyn TypeOracle,
    node: SyntaxNodeId,
    stats: &mut AnalysisStats,
) -> Option<SymbolInfo> {
    match types.lookup_symbol(node) {
        Ok(symbol) => symbol,
        Err(error) => {
            warn!(%error, "type oracle failed; treating symbol as unknown");
            stats.oracle_failures += 1;
            None
        }
    }
}

/// Declared class name of an expression, filtered against the hierarchy so
/// an enqueued receiver type is always a real type name.
fn declared_class(
    types: &dyn TypeOracle,
    hierarchy: &ClassHierarchy,
    node: SyntaxNodeId,
    stats: &mut AnalysisStats,
) -> Option<String> {
    let declared = match types.declared_type_text(node) {
        Ok(declared) => declared,
        Err(error) => {
            warn!(%error, "type oracle failed; treating receiver type as absent");
            stats.oracle_failures += 1;
            None
        }
    };
    declared
        .as_deref()
        .and_then(receiver_type_name)
        .filter(|name| hierarchy.known_type(name))
}

fn enqueue(ledger: &mut EdgeLedger, stats: &mut AnalysisStats, call: UnresolvedCall) {
    if ledger.enqueue_unresolved(call) {
        stats.unresolved_enqueued += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::LocalPass;
    use calltrail_oracle::{
        DeclaredTypeOracle, TreeSitterSyntaxOracle, harvest_functions, harvest_hierarchy,
    };
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn walk_file(
        source: &str,
    ) -> (EdgeLedger, AnalysisStats) {
        let path = PathBuf::from("/fixture.ts");
        let syntax = Arc::new(
            TreeSitterSyntaxOracle::parse(vec![(path.clone(), source.to_string())])
                .expect("fixture parses"),
        );
        let types = DeclaredTypeOracle::build(Arc::clone(&syntax), HashSet::new());
        let hierarchy = harvest_hierarchy(&syntax);
        let index = FunctionIndex::build(harvest_functions(&syntax, "snap-unit"))
            .expect("catalog builds");

        let mut ledger = EdgeLedger::new();
        let mut stats = AnalysisStats::default();
        let policy = ConfidencePolicy::default();

        let sites: Vec<SyntaxNodeId> = syntax
            .nodes(&path)
            .into_iter()
            .filter(|&n| matches!(syntax.classify(n), SyntaxKind::Call | SyntaxKind::New))
            .collect();
        let pending = LocalPass::run(
            &path, &sites, &*syntax, &index, &mut ledger, &policy, "snap-unit", &mut stats,
        )
        .expect("local pass");
        ImportPass::run(
            &path, &pending, &*syntax, &types, &hierarchy, &index, &mut ledger, &policy,
            "snap-unit", &mut stats,
        )
        .expect("import pass");

        (ledger, stats)
    }

    #[test]
    fn test_enqueued_receiver_is_declared_class_never_variable_name() {
        let (mut ledger, _stats) = walk_file(
            "class Dog {\n  speak() {}\n}\n\
             class Cat {\n  speak() {}\n}\n\
             function zoo() {\n\
               const d = new Dog();\n\
               const c = new Cat();\n\
               d.speak();\n\
               c.speak();\n\
             }\n",
        );

        let queue = ledger.take_queue();
        let receivers: Vec<_> = queue
            .iter()
            .map(|call| call.receiver_type.clone().expect("receiver present"))
            .collect();
        assert_eq!(receivers, vec!["Dog".to_string(), "Cat".to_string()]);
        for receiver in &receivers {
            assert!(receiver.chars().next().is_some_and(char::is_uppercase));
        }
    }

    #[test]
    fn test_local_pass_never_enqueues_property_access() {
        let (mut ledger, stats) = walk_file(
            "class Dog {\n  speak() {}\n}\n\
             function zoo() {\n\
               const d = new Dog();\n\
               d.speak();\n\
             }\n",
        );

        // Exactly one queue entry for the one property-access site: the
        // import pass is the sole enqueuer.
        assert_eq!(ledger.take_queue().len(), 1);
        assert_eq!(stats.unresolved_enqueued, 1);
    }

    #[test]
    fn test_this_call_outside_own_class_gets_class_receiver() {
        let (mut ledger, _stats) = walk_file(
            "class Base {\n  helper() {}\n}\n\
             class Widget extends Base {\n  render() {\n    this.helper();\n  }\n}\n",
        );

        // `helper` is not defined on Widget in this file, so the local
        // pass leaves the site and the import pass enqueues it with the
        // caller's own class as the declared receiver.
        let queue = ledger.take_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].method_name, "helper");
        assert_eq!(queue[0].receiver_type.as_deref(), Some("Widget"));
    }
}
