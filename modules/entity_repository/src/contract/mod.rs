//! Contract layer - public API for repository callers and store implementors
//!
//! This layer contains transport-agnostic models, query fragments, errors and
//! the repository traits.

pub mod client;
pub mod error;
pub mod model;
pub mod query;
pub mod spec;

pub use client::{ReadRepository, WriteRepository};
pub use error::{RepositoryError, RepositoryResult, StoreError, StoreResult};
pub use model::{Cardinality, Entity, EntityMetadata, NavigationMetadata, Tracking};
pub use query::{OrderBy, Predicate, ProjectedQuery, Projection, Query, Stage};
pub use spec::{EagerLoad, Page, ProjectionSpec, QuerySpec};
