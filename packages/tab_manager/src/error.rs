use thiserror::Error;

/// Errors from parsing tab inputs supplied as text, and from invalid
/// registry configuration.
///
/// Registry operations themselves never fail; unknown tab ids are no-ops.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TabError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
    #[error("tab message limit must be greater than zero")]
    ZeroMessageLimit,
}
