//! Registry error types.

use thiserror::Error;

/// Errors raised while registering, querying, or composing capabilities.
///
/// Public registry operations report these through the `errors` list of their
/// result objects (via `Display`) rather than returning them directly.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// A required field is missing or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The capability id is already registered.
    #[error("Capability '{0}' already exists")]
    AlreadyExists(String),

    /// A composition with this id is already stored.
    #[error("Composition '{0}' already exists")]
    CompositionExists(String),

    /// No capability with this id is registered.
    #[error("Capability '{0}' not found")]
    NotFound(String),

    /// The capability exists but is not in the `available` state.
    #[error("Capability '{id}' is unavailable (status: {status})")]
    Unavailable { id: String, status: String },

    /// A status change that the lifecycle state machine forbids.
    #[error("Invalid status transition for '{id}': {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// A version constraint that cannot be parsed.
    #[error("Invalid version constraint: '{0}'")]
    InvalidVersionConstraint(String),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors reported by a [`CapabilityStore`](crate::capabilities::store::CapabilityStore)
/// backend. The in-memory store never produces them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The backend could not be reached or returned an I/O failure.
    #[error("Capability store unavailable: {message}")]
    Unavailable { message: String },

    /// A stored record could not be decoded.
    #[error("Capability store corrupted record '{id}': {message}")]
    Corrupted { id: String, message: String },
}

/// Errors raised while parsing module manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest structure is invalid.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Convenience alias for registry-internal results.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RegistryError::AlreadyExists("pdf.export".into()).to_string(),
            "Capability 'pdf.export' already exists"
        );
        assert_eq!(
            RegistryError::Unavailable {
                id: "pdf.export".into(),
                status: "deprecated".into()
            }
            .to_string(),
            "Capability 'pdf.export' is unavailable (status: deprecated)"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: RegistryError = StoreError::Unavailable {
            message: "connection reset".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Capability store unavailable: connection reset"
        );
    }
}
