//! Repository traits consumed by application code
//!
//! Call sites depend on these traits rather than on a concrete store, the same
//! way module clients depend on an API trait instead of its implementation.

use super::error::RepositoryResult;
use super::model::{Entity, Tracking};
use super::query::{Predicate, Projection};
use super::spec::{EagerLoad, ProjectionSpec, QuerySpec};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

/// Read operations over one entity type
#[async_trait]
pub trait ReadRepository<E: Entity>: Send + Sync {
    // ===== Quantifiers & aggregates =====

    /// True if at least one entity matches; no filter means "is the set non-empty".
    async fn any(
        &self,
        filter: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<bool>;

    /// True if every entity matches. The predicate is mandatory.
    async fn all(
        &self,
        predicate: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<bool>;

    /// Identity membership test
    async fn contains(&self, entity: &E, cancel: &CancellationToken) -> RepositoryResult<bool>;

    async fn count(
        &self,
        filter: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<u64>;

    /// Sum of the selector over the filtered set. Absent values are skipped and
    /// an empty set sums to zero.
    async fn sum(
        &self,
        selector: Projection<E, Option<Decimal>>,
        filter: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<Decimal>>;

    // ===== Single-record lookups =====

    async fn first_or_default(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>>;

    async fn last_or_default(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>>;

    /// Zero or one match; more than one is an error.
    async fn single_or_default(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>>;

    /// Lookup by identity through the general filtered pipeline
    async fn get(
        &self,
        tracking: Tracking,
        key: &E::Key,
        eager_load: EagerLoad<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>>;

    /// Lookup by identity with every single-valued relation loaded
    async fn get_with_all_navigations(
        &self,
        tracking: Tracking,
        key: &E::Key,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>>;

    /// Projected lookup by identity (always untracked)
    async fn get_projected<R: Send + 'static>(
        &self,
        key: &E::Key,
        projection: Projection<E, R>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<R>>;

    /// Unit-of-work lookup: tracked instance first, then the store
    async fn find(&self, key: &E::Key, cancel: &CancellationToken) -> RepositoryResult<Option<E>>;

    // ===== Bulk reads =====

    async fn get_all(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>>;

    /// `get_all` with every single-valued relation loaded
    async fn get_all_with_all_navigations(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>>;

    async fn get_all_projected<R: Send + 'static>(
        &self,
        spec: ProjectionSpec<E, R>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<R>>;
}

/// Write operations against the store's unit of work.
///
/// Nothing is persisted until the caller commits the store session.
#[async_trait]
pub trait WriteRepository<E: Entity>: ReadRepository<E> {
    /// Register a pending insert
    async fn add(&self, entity: E, cancel: &CancellationToken) -> RepositoryResult<()>;

    /// Register pending inserts; either all are registered or none
    async fn add_range(&self, entities: Vec<E>, cancel: &CancellationToken) -> RepositoryResult<()>;

    /// Register a pending delete
    fn remove(&self, entity: &E) -> RepositoryResult<()>;

    /// Find the entity (tracked) and remove it; a missing key is a no-op
    async fn remove_by_key(&self, key: &E::Key, cancel: &CancellationToken) -> RepositoryResult<()>;

    /// Attach and mark the whole record modified
    fn update(&self, entity: E) -> RepositoryResult<()>;

    /// Stream every entity through `action`
    async fn for_each<F>(&self, action: F, cancel: &CancellationToken) -> RepositoryResult<()>
    where
        F: FnMut(E) + Send;
}
