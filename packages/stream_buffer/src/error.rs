use thiserror::Error;

/// Errors raised by buffer configuration and name parsing.
///
/// Ingestion, flushing and filtering have no failure modes; these only cover
/// values handed in from outside (config files, CLI flags).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Capacity must hold at least one message
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,
    /// Unrecognized message direction name
    #[error("unknown message direction: {0}")]
    UnknownDirection(String),
}
