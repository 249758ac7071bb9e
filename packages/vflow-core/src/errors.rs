//! Error taxonomy for the value-flow engine.
//!
//! Three error types, one per failure class: `EngineError` never escapes the
//! per-function analysis guard (it becomes an `internalError` diagnostic),
//! `CtuError` never escapes the join step (it becomes a `ctuinfo-invalid`
//! diagnostic), and `ConfigError` escapes to the caller directly since it
//! happens before any analysis starts.

use thiserror::Error;

/// Fatal, engine-internal failure during per-function value-flow analysis
/// (an I1-I4 invariant violation: a dangling token reference, a malformed
/// declare/assign node, a variable the scope table never recorded).
///
/// Constructed by `valueflow::rules` at the point the invariant is
/// observed broken, recorded on `FlowResult` against the function and
/// location it happened at, and turned into an `internalError` diagnostic
/// by `analyze_one` — the one place that both runs the engine and has a
/// file name to attach. The function whose analysis hit the error is
/// abandoned at that statement; other functions and other translation
/// units continue untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("token arena index {0:?} out of bounds")]
    DanglingTokenRef(crate::model::TokenId),

    #[error("variable id {0:?} has no scope entry")]
    UnknownVariable(crate::model::VarId),

    #[error("loop fixed-point did not converge within the iteration budget")]
    LoopDidNotConverge,

    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

/// Input-format fatal failure while decoding or joining a CTU summary.
///
/// A malformed summary is rejected outright rather than analyzed partially;
/// the offending translation unit's CTU contribution is dropped, everything
/// else proceeds.
#[derive(Debug, Error)]
pub enum CtuError {
    #[error("failed to decode CTU summary: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("failed to encode CTU summary: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("CTU frame header truncated or length prefix exceeds buffer")]
    TruncatedFrame,

    #[error("CTU join recursion depth bound ({bound}) exceeded")]
    DepthExceeded { bound: u32 },

    #[error("io error while streaming CTU summaries: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render CTU summary as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings validation failure, reported before any analysis begins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("widening_bound must be >= 1, got {0}")]
    WideningBoundTooSmall(u32),

    #[error("loop_iteration_budget must be >= 1, got {0}")]
    LoopBudgetTooSmall(u32),

    #[error("ctu_depth_bound must be >= 1, got {0}")]
    CtuDepthTooSmall(u32),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
pub type CtuResult<T> = std::result::Result<T, CtuError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
