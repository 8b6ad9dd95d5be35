use crate::{EdgeId, FunctionId, ResolutionLevel, ResolutionSource, stable_digest};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    Direct,
    Virtual,
    Constructor,
    External,
    Callback,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Virtual => "virtual",
            Self::Constructor => "constructor",
            Self::External => "external",
            Self::Callback => "callback",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(Self::Direct),
            "virtual" => Some(Self::Virtual),
            "constructor" => Some(Self::Constructor),
            "external" => Some(Self::External),
            "callback" => Some(Self::Callback),
            _ => None,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed caller → callee relation tied to a source line.
///
/// Edges are append-once. The ledger's dedup key is
/// `caller_id -> callee_id @ line`; within one key the highest-confidence
/// resolution wins and the `runtime_confirmed` bit only ever latches from
/// false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEdge {
    pub id: EdgeId,
    pub caller_id: FunctionId,
    pub callee_id: FunctionId,
    pub callee_name: String,
    pub callee_class: Option<String>,
    pub kind: CallKind,
    pub line: u32,
    pub column: u32,
    pub optional_chaining: bool,
    pub confidence: f32,
    pub level: ResolutionLevel,
    pub source: ResolutionSource,
    /// All plausible callee ids, ordered deterministically; the primary
    /// callee above is always `candidates[0]`. A single entry means the
    /// resolution was unique.
    pub candidates: Vec<FunctionId>,
    pub runtime_confirmed: bool,
    pub origin_file_hash: String,
}

impl CallEdge {
    pub fn stable_id(caller: &FunctionId, callee: &FunctionId, line: u32) -> EdgeId {
        let line = line.to_string();
        EdgeId(stable_digest(&[
            caller.0.as_bytes(),
            callee.0.as_bytes(),
            line.as_bytes(),
        ]))
    }

    /// Ledger dedup key: one edge per caller/callee/site triple.
    pub fn dedup_key(&self) -> String {
        format!("{}->{}@{}", self.caller_id, self.callee_id, self.line)
    }

    pub fn is_unique(&self) -> bool {
        self.candidates.len() == 1
    }
}
