//! Contract error types for the repository and its store
//!
//! These errors are transport-agnostic; the store vocabulary is wrapped, not
//! flattened, so callers can still inspect what the store reported.

/// Failure reported by a [`Store`](crate::domain::Store).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store session has been disposed")]
    Disposed,

    #[error("entity type `{entity}` is not known to the store")]
    UnknownEntity { entity: &'static str },

    #[error("entity type `{entity}` has no navigation named `{navigation}`")]
    UnknownNavigation {
        entity: &'static str,
        navigation: String,
    },

    #[error("another `{entity}` instance with key {key} is already tracked")]
    AlreadyTracked { entity: &'static str, key: String },

    #[error("`{entity}` with key {key} already exists")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("`{entity}` with key {key} was expected to exist but was not found")]
    Concurrency { entity: &'static str, key: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Store result alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A required fragment or argument was absent or unusable
    #[error("invalid argument `{argument}`: {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },

    /// A single-record lookup matched more than one record
    #[error("{operation}: more than one `{entity}` matched")]
    MultipleResults {
        operation: &'static str,
        entity: &'static str,
    },

    /// The store reported a failure
    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// The caller's cancellation signal fired
    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },
}

impl RepositoryError {
    pub(crate) fn invalid_argument(argument: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The wrapped store failure, if this error came from the store.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Repository result alias
pub type RepositoryResult<T> = Result<T, RepositoryError>;
