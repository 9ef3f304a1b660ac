//! Entity Repository
//!
//! Typed CRUD and query composition over a change-tracking record store.
//! Callers assemble optional query fragments in a [`QuerySpec`]; the
//! repository composes them into one query plan with a fixed stage order and
//! runs it against a [`Store`] session. Writes go to the session's unit of
//! work and are persisted when the caller commits the session.
//!
//! ```ignore
//! let db = MemoryDatabase::new();
//! db.register(EntityModel::<Employee>::new());
//! let session = db.session();
//! let repo = Repository::<_, Employee>::new(session.clone())?;
//!
//! let cancel = CancellationToken::new();
//! let seniors = repo
//!     .get_all(QuerySpec::untracked().filter(|e| e.salary > 10_000), &cancel)
//!     .await?;
//! ```

// Public exports
pub mod contract;
pub use contract::{
    Cardinality, EagerLoad, Entity, EntityMetadata, NavigationMetadata, OrderBy, Page, Predicate,
    ProjectedQuery, Projection, ProjectionSpec, Query, QuerySpec, ReadRepository,
    RepositoryError, RepositoryResult, Stage, StoreError, StoreResult, Tracking, WriteRepository,
};

pub mod config;
pub use config::{Config, ConfigError};

pub mod domain;
pub use domain::{Repository, Store, StoreHandle};

pub mod infra;
pub use infra::storage::{EntityModel, EntryState, MemoryDatabase, MemorySession};

/// Common imports for repository callers
pub mod prelude {
    pub use crate::contract::{
        EagerLoad, Entity, OrderBy, Predicate, Projection, ProjectionSpec, QuerySpec,
        ReadRepository, RepositoryError, RepositoryResult, Tracking, WriteRepository,
    };
    pub use crate::domain::{Repository, Store};
    pub use tokio_util::sync::CancellationToken;
}
