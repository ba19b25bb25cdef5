//! Error types for the container and the ignition orchestrator.

use thiserror::Error;

/// Boxed error returned by lifecycle handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Dependency injection errors
///
/// Structural errors (registration, resolution, misuse) indicate a programming
/// error and terminate the offending call chain. `Lifecycle` is only surfaced for
/// the init phase; steady-state handler failures are logged instead.
///
/// # Examples
///
/// ```rust
/// use ignite_di::DiError;
///
/// let circular = DiError::Circular(vec!["A".into(), "B".into(), "A".into()]);
/// assert_eq!(circular.to_string(), "Circular dependency: A <=> B <=> A");
///
/// let missing = DiError::Unresolved {
///     identifier: "game/Missing".into(),
///     requested_by: "game/Game".into(),
/// };
/// assert!(missing.to_string().contains("game/Missing"));
/// ```
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiError {
    /// Identifier assigned twice to a type, or reused by a second type
    #[error("Registration conflict for '{identifier}': {reason}")]
    RegistrationConflict { identifier: String, reason: String },

    /// Construction cycle, ordered from the first repeated entry back to itself
    #[error("Circular dependency: {}", .0.join(" <=> "))]
    Circular(Vec<String>),

    /// No override, primitive or type matched a dependency identifier
    #[error("Could not resolve dependency '{identifier}' for '{requested_by}'")]
    Unresolved { identifier: String, requested_by: String },

    /// A type was reached but has no constructor
    #[error("Type has no constructor: {0}")]
    NotConstructible(String),

    /// A resolved value did not have the type the consumer asked for
    #[error("Type mismatch for '{owner}' at position {position}: expected {expected}")]
    TypeMismatch { owner: String, position: usize, expected: &'static str },

    /// Maximum construction depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),

    /// A lifecycle handler failed or panicked
    #[error("{phase} failed for '{identifier}': {message}")]
    Lifecycle { identifier: String, phase: &'static str, message: String },

    /// API used out of order or on invalid targets
    #[error("Misuse: {0}")]
    Misuse(String),
}

impl DiError {
    pub(crate) fn misuse(message: impl Into<String>) -> Self {
        DiError::Misuse(message.into())
    }
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_chain_is_joined() {
        let err = DiError::Circular(vec!["A".into(), "B".into(), "C".into(), "A".into()]);
        assert_eq!(err.to_string(), "Circular dependency: A <=> B <=> C <=> A");
    }

    #[test]
    fn lifecycle_names_phase_and_identifier() {
        let err = DiError::Lifecycle {
            identifier: "game/Game".into(),
            phase: "OnInit",
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "OnInit failed for 'game/Game': boom");
    }
}
