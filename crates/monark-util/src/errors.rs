use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Monark operations.
///
/// These are *fatal* failures: structural invariant violations, malformed
/// engine input, broken session files. Configuration-shaped problems found
/// during resolution never surface here; they accumulate in a diagnostics
/// report so a single run reports every problem.
#[derive(Debug, Error, Diagnostic)]
pub enum MonarkError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed session/graph input.
    #[error("Session error: {message}")]
    #[diagnostic(help("Check the module graph session file for syntax errors"))]
    Session { message: String },

    /// The module graph violates a structural precondition (e.g. a peer
    /// edge to an unknown module, or a cycle the host failed to break).
    #[error("Graph error: {message}")]
    Graph { message: String },

    /// An internal engine invariant was violated.
    #[error("Internal invariant violated: {message}")]
    Invariant { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type MonarkResult<T> = miette::Result<T>;
