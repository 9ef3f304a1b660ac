//! Store trait for the backing record engine
//!
//! This trait defines what the repository needs from the store: queryable
//! views, entity metadata and a change-tracking unit of work. The reference
//! implementation is in infra/storage.

use crate::contract::{
    Entity, EntityMetadata, Predicate, ProjectedQuery, Projection, Query, StoreError, StoreResult,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;

/// One store session: queryable views plus a unit of work.
///
/// A session is single-writer. Aggregations have default implementations on
/// top of [`Store::fetch`]; stores that can push them down should override
/// them.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ===== Metadata & lifecycle =====

    /// Metadata for an entity type; `None` if the store does not know it
    fn metadata(&self, entity: &str) -> Option<EntityMetadata>;

    /// Dispose the session. Further calls are no-ops.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    // ===== Queries =====

    /// Execute a query plan and materialize the results
    async fn fetch<E: Entity>(&self, query: Query<E>) -> StoreResult<Vec<E>>;

    /// Execute a projected query plan
    async fn fetch_projected<E: Entity, R: Send + 'static>(
        &self,
        query: ProjectedQuery<E, R>,
    ) -> StoreResult<Vec<R>>;

    async fn any<E: Entity>(&self, query: Query<E>) -> StoreResult<bool> {
        Ok(!self.fetch(query.take(1)).await?.is_empty())
    }

    async fn all<E: Entity>(&self, query: Query<E>, predicate: Predicate<E>) -> StoreResult<bool> {
        let rows = self.fetch(query).await?;
        Ok(rows.iter().all(|row| predicate.matches(row)))
    }

    async fn count<E: Entity>(&self, query: Query<E>) -> StoreResult<u64> {
        Ok(self.fetch(query).await?.len() as u64)
    }

    async fn sum<E: Entity>(
        &self,
        query: Query<E>,
        selector: Projection<E, Option<Decimal>>,
    ) -> StoreResult<Option<Decimal>> {
        let rows = self.fetch(query).await?;
        // Absent values are skipped; an empty selection sums to zero.
        let mut total = Decimal::ZERO;
        for value in rows.iter().filter_map(|row| selector.apply(row)) {
            total = total.checked_add(value).ok_or_else(|| {
                StoreError::Backend(anyhow::anyhow!("decimal overflow summing `{}`", E::NAME))
            })?;
        }
        Ok(Some(total))
    }

    /// Identity membership: is there a stored entity with the same key?
    async fn contains<E: Entity>(&self, entity: &E) -> StoreResult<bool> {
        let key = entity.id().clone();
        let query = Query::new()
            .untracked()
            .filter(Predicate::new(move |row: &E| row.id() == &key));
        self.any(query).await
    }

    /// Stream the query results in batches of `batch_size`.
    ///
    /// The query must not carry its own pagination; batches are cut with
    /// appended skip/take stages.
    fn stream<E: Entity>(
        &self,
        query: Query<E>,
        batch_size: usize,
    ) -> BoxStream<'_, StoreResult<Vec<E>>> {
        let batch_size = batch_size.max(1);
        stream::unfold(Some(0usize), move |offset| {
            let query = query.clone();
            async move {
                let offset = offset?;
                match self.fetch(query.skip(offset).take(batch_size)).await {
                    Ok(batch) if batch.is_empty() => None,
                    Ok(batch) => {
                        let next = (batch.len() == batch_size).then(|| offset + batch.len());
                        Some((Ok(batch), next))
                    }
                    Err(err) => Some((Err(err), None)),
                }
            }
        })
        .boxed()
    }

    // ===== Unit of work =====

    /// Resolve by key: tracked instance first, otherwise load and track
    async fn find_by_key<E: Entity>(&self, key: &E::Key) -> StoreResult<Option<E>>;

    /// Register a pending insert
    async fn add<E: Entity>(&self, entity: E) -> StoreResult<()>;

    /// Register several pending inserts; on failure none of them is registered
    async fn add_range<E: Entity>(&self, entities: Vec<E>) -> StoreResult<()>;

    /// Register a pending delete
    fn mark_deleted<E: Entity>(&self, entity: &E) -> StoreResult<()>;

    /// Attach the entity and mark every field modified
    fn mark_modified<E: Entity>(&self, entity: E) -> StoreResult<()>;
}
