/// Shared error taxonomy for storage backends.
///
/// Adapters translate provider-native failures (HTTP status codes, SDK error
/// kinds) into these variants so calling code stays backend-agnostic.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The target `(namespace, uuid)` does not exist.
    ///
    /// Raised by `update` and `head_file` only; `retrieve` returns `None`
    /// and `remove`/`delete_file` succeed on an absent key.
    #[error("not found: {namespace}/{uuid}")]
    NotFound { namespace: String, uuid: String },

    /// `create` against a key that already holds a record.
    #[error("conflict: {namespace}/{uuid} already exists")]
    Conflict { namespace: String, uuid: String },

    /// The adapter is not ready or its credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network or backend unavailability. Retryable by the caller; this
    /// layer performs no retry beyond an adapter's bounded transient backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed input (metadata, identifiers) caught before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn not_found(namespace: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            uuid: uuid.into(),
        }
    }

    pub fn conflict(namespace: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::Conflict {
            namespace: namespace.into(),
            uuid: uuid.into(),
        }
    }

    /// Whether the caller may reasonably retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
