use crate::{FunctionId, SyntaxNodeId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A call site known to exist but not yet tied to a callee id. Produced by
/// the local/import passes, consumed by CHA, copied to RTA, then dropped.
///
/// `receiver_type` is the *declared* class or interface name of the
/// receiver (`Dog`), never the spelling of the receiver expression (`d`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedCall {
    pub caller_id: FunctionId,
    pub method_name: String,
    pub receiver_type: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl UnresolvedCall {
    /// Queue dedup key.
    pub fn site_key(&self) -> (FunctionId, String, u32) {
        (self.caller_id.clone(), self.method_name.clone(), self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstantiationKind {
    Constructor,
    Factory,
}

/// Witness that some type was constructed at a program point. The RTA pass
/// reads the whole log once at the start of its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiationEvent {
    pub type_name: String,
    pub file_path: PathBuf,
    pub line: u32,
    pub kind: InstantiationKind,
    pub node: SyntaxNodeId,
}
