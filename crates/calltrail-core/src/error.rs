use crate::FunctionId;
use std::path::PathBuf;
use thiserror::Error;

/// Fail-fast errors raised while building the function index. Per-site
/// anomalies during resolution never surface here; those are counted in
/// [`crate::AnalysisStats`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("function {id} ends on line {end_line} before its start line {start_line}")]
    EndBeforeStart {
        id: FunctionId,
        start_line: u32,
        end_line: u32,
    },

    #[error("duplicate function id {0}")]
    DuplicateFunctionId(FunctionId),

    #[error("two functions start at {file}:{line}")]
    DuplicateFileLine { file: PathBuf, line: u32 },
}
