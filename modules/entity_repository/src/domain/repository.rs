//! Generic repository over one entity type
//!
//! Routes every read through the composer and every write through the store's
//! unit of work. Argument validation happens before any store call; store
//! failures are wrapped with the operation name and otherwise passed through.

use super::composer::{compose, compose_projected, paginate};
use super::lifecycle::StoreHandle;
use super::navigation::navigation_names;
use super::store::Store;
use crate::config::Config;
use crate::contract::{
    EagerLoad, Entity, Page, Predicate, Projection, ProjectionSpec, Query, QuerySpec, ReadRepository,
    RepositoryError, RepositoryResult, StoreError, StoreResult, Tracking, WriteRepository,
};
use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal::Decimal;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Repository for entities of type `E` bound to one store session.
///
/// One instance serves one logical unit of work and one caller at a time.
/// The session is released when [`Repository::release`] is called or the
/// repository is dropped.
pub struct Repository<S: Store, E: Entity> {
    handle: StoreHandle<S>,
    config: Config,
    _entity: PhantomData<fn() -> E>,
}

impl<S: Store, E: Entity> Repository<S, E> {
    /// Bind a repository to a store session with the default configuration.
    pub fn new(store: Arc<S>) -> RepositoryResult<Self> {
        Self::with_config(store, Config::default())
    }

    pub fn with_config(store: Arc<S>, config: Config) -> RepositoryResult<Self> {
        if store.is_disposed() {
            return Err(RepositoryError::invalid_argument(
                "store",
                "store session has already been disposed",
            ));
        }
        config
            .validate()
            .map_err(|err| RepositoryError::invalid_argument("config", err.to_string()))?;
        if store.metadata(E::NAME).is_none() {
            return Err(RepositoryError::invalid_argument(
                "entity",
                format!("entity type `{}` is not known to the store", E::NAME),
            ));
        }

        tracing::debug!(entity = E::NAME, "repository bound to store session");
        Ok(Self {
            handle: StoreHandle::new(store),
            config,
            _entity: PhantomData,
        })
    }

    /// Release the store session. Only the first call has an effect.
    pub fn release(&self) -> bool {
        self.handle.release()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    /// The bound session, unless released
    pub fn store(&self) -> Option<&S> {
        self.handle.get()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ===== Internals =====

    fn session(&self, operation: &'static str) -> RepositoryResult<&S> {
        self.handle.get().ok_or(RepositoryError::Store {
            operation,
            source: StoreError::Disposed,
        })
    }

    fn tracking_of(&self, spec: &QuerySpec<E>) -> Tracking {
        spec.requested_tracking().unwrap_or(self.config.default_tracking)
    }

    fn compose_spec(&self, store: &S, tracking: Tracking, spec: &QuerySpec<E>) -> Query<E> {
        compose(
            tracking,
            spec.predicate(),
            spec.eager(),
            spec.ordering(),
            || navigation_names::<S, E>(store),
        )
    }

    /// Run one store round trip, honouring the caller's cancellation signal.
    async fn execute<T, F>(
        operation: &'static str,
        cancel: &CancellationToken,
        round_trip: F,
    ) -> RepositoryResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled { operation });
        }
        tracing::debug!(entity = E::NAME, operation, "dispatching to store");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(entity = E::NAME, operation, "cancelled during store round trip");
                Err(RepositoryError::Cancelled { operation })
            }
            result = round_trip => result.map_err(|source| store_failure::<E>(operation, source)),
        }
    }

    async fn fetch_first(
        &self,
        operation: &'static str,
        query: Query<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        let store = self.session(operation)?;
        let rows = Self::execute(operation, cancel, store.fetch(query.take(1))).await?;
        Ok(rows.into_iter().next())
    }

    async fn lookup(
        &self,
        operation: &'static str,
        tracking: Tracking,
        key: &E::Key,
        eager_load: &EagerLoad<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        let store = self.session(operation)?;
        let filter = key_filter::<E>(key);
        let query = compose(tracking, Some(&filter), eager_load, None, || {
            navigation_names::<S, E>(store)
        });
        self.fetch_first(operation, query, cancel).await
    }
}

fn key_filter<E: Entity>(key: &E::Key) -> Predicate<E> {
    let key = key.clone();
    Predicate::new(move |entity: &E| entity.id() == &key)
}

fn store_failure<E: Entity>(operation: &'static str, source: StoreError) -> RepositoryError {
    tracing::warn!(entity = E::NAME, operation, error = %source, "store operation failed");
    RepositoryError::Store { operation, source }
}

/// Aggregates read without tracking; filters narrow the whole entity set.
fn aggregate_query<E: Entity>(filter: Option<Predicate<E>>) -> Query<E> {
    let query = Query::new().untracked();
    match filter {
        Some(predicate) => query.filter(predicate),
        None => query,
    }
}

#[async_trait]
impl<S: Store, E: Entity> ReadRepository<E> for Repository<S, E> {
    async fn any(
        &self,
        filter: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<bool> {
        let store = self.session("any")?;
        Self::execute("any", cancel, store.any(aggregate_query(filter))).await
    }

    async fn all(
        &self,
        predicate: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<bool> {
        let predicate = predicate.ok_or_else(|| {
            RepositoryError::invalid_argument("predicate", "`all` requires a predicate")
        })?;
        let store = self.session("all")?;
        Self::execute("all", cancel, store.all(aggregate_query(None), predicate)).await
    }

    async fn contains(&self, entity: &E, cancel: &CancellationToken) -> RepositoryResult<bool> {
        let store = self.session("contains")?;
        Self::execute("contains", cancel, store.contains(entity)).await
    }

    async fn count(
        &self,
        filter: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<u64> {
        let store = self.session("count")?;
        Self::execute("count", cancel, store.count(aggregate_query(filter))).await
    }

    async fn sum(
        &self,
        selector: Projection<E, Option<Decimal>>,
        filter: Option<Predicate<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<Decimal>> {
        let store = self.session("sum")?;
        Self::execute("sum", cancel, store.sum(aggregate_query(filter), selector)).await
    }

    async fn first_or_default(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        let store = self.session("first_or_default")?;
        let query = self.compose_spec(store, self.tracking_of(&spec), &spec);
        self.fetch_first("first_or_default", query, cancel).await
    }

    async fn last_or_default(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        let store = self.session("last_or_default")?;
        let query = self.compose_spec(store, self.tracking_of(&spec), &spec);
        let rows = Self::execute("last_or_default", cancel, store.fetch(query)).await?;
        Ok(rows.into_iter().last())
    }

    async fn single_or_default(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        let store = self.session("single_or_default")?;
        let query = self.compose_spec(store, self.tracking_of(&spec), &spec);
        // Two rows are enough to tell "one" from "more than one".
        let mut rows = Self::execute("single_or_default", cancel, store.fetch(query.take(2))).await?;
        if rows.len() > 1 {
            return Err(RepositoryError::MultipleResults {
                operation: "single_or_default",
                entity: E::NAME,
            });
        }
        Ok(rows.pop())
    }

    async fn get(
        &self,
        tracking: Tracking,
        key: &E::Key,
        eager_load: EagerLoad<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        self.lookup("get", tracking, key, &eager_load, cancel).await
    }

    async fn get_with_all_navigations(
        &self,
        tracking: Tracking,
        key: &E::Key,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        self.lookup(
            "get_with_all_navigations",
            tracking,
            key,
            &EagerLoad::AllNavigations,
            cancel,
        )
        .await
    }

    async fn get_projected<R: Send + 'static>(
        &self,
        key: &E::Key,
        projection: Projection<E, R>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<R>> {
        let store = self.session("get_projected")?;
        let filter = key_filter::<E>(key);
        let query = compose_projected(Some(&filter), projection, None, Page::new(0, 1));
        let rows = Self::execute("get_projected", cancel, store.fetch_projected(query)).await?;
        Ok(rows.into_iter().next())
    }

    async fn find(&self, key: &E::Key, cancel: &CancellationToken) -> RepositoryResult<Option<E>> {
        let store = self.session("find")?;
        Self::execute("find", cancel, store.find_by_key::<E>(key)).await
    }

    async fn get_all(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>> {
        let store = self.session("get_all")?;
        let query = self.compose_spec(store, self.tracking_of(&spec), &spec);
        let query = paginate(query, spec.pagination());
        Self::execute("get_all", cancel, store.fetch(query)).await
    }

    async fn get_all_with_all_navigations(
        &self,
        spec: QuerySpec<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>> {
        let store = self.session("get_all_with_all_navigations")?;
        let spec = spec.with_all_navigations();
        let query = self.compose_spec(store, self.tracking_of(&spec), &spec);
        let query = paginate(query, spec.pagination());
        Self::execute("get_all_with_all_navigations", cancel, store.fetch(query)).await
    }

    async fn get_all_projected<R: Send + 'static>(
        &self,
        spec: ProjectionSpec<E, R>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<R>> {
        let store = self.session("get_all_projected")?;
        let ProjectionSpec {
            projection,
            filter,
            order_by,
            page,
        } = spec;
        let query = compose_projected(filter.as_ref(), projection, order_by, page);
        Self::execute("get_all_projected", cancel, store.fetch_projected(query)).await
    }
}

#[async_trait]
impl<S: Store, E: Entity> WriteRepository<E> for Repository<S, E> {
    async fn add(&self, entity: E, cancel: &CancellationToken) -> RepositoryResult<()> {
        let store = self.session("add")?;
        Self::execute("add", cancel, store.add(entity)).await
    }

    async fn add_range(&self, entities: Vec<E>, cancel: &CancellationToken) -> RepositoryResult<()> {
        let store = self.session("add_range")?;
        Self::execute("add_range", cancel, store.add_range(entities)).await
    }

    fn remove(&self, entity: &E) -> RepositoryResult<()> {
        let store = self.session("remove")?;
        store
            .mark_deleted(entity)
            .map_err(|source| store_failure::<E>("remove", source))
    }

    async fn remove_by_key(&self, key: &E::Key, cancel: &CancellationToken) -> RepositoryResult<()> {
        let found = self
            .lookup("remove_by_key", Tracking::Tracked, key, &EagerLoad::None, cancel)
            .await?;
        match found {
            Some(entity) => self.remove(&entity),
            None => {
                tracing::debug!(entity = E::NAME, key = ?key, "remove_by_key: nothing to remove");
                Ok(())
            }
        }
    }

    fn update(&self, entity: E) -> RepositoryResult<()> {
        let store = self.session("update")?;
        store
            .mark_modified(entity)
            .map_err(|source| store_failure::<E>("update", source))
    }

    async fn for_each<F>(&self, mut action: F, cancel: &CancellationToken) -> RepositoryResult<()>
    where
        F: FnMut(E) + Send,
    {
        const OPERATION: &str = "for_each";

        let store = self.session(OPERATION)?;
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled { operation: OPERATION });
        }

        let mut batches = store.stream(Query::<E>::new(), self.config.stream_batch_size);
        let mut visited = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RepositoryError::Cancelled { operation: OPERATION });
                }
                next = batches.next() => next,
            };
            match next {
                Some(Ok(batch)) => {
                    visited += batch.len();
                    batch.into_iter().for_each(&mut action);
                }
                Some(Err(source)) => return Err(store_failure::<E>(OPERATION, source)),
                None => break,
            }
        }

        tracing::debug!(entity = E::NAME, visited, "for_each completed");
        Ok(())
    }
}

impl<S: Store, E: Entity> std::fmt::Debug for Repository<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::NAME)
            .field("handle", &self.handle)
            .field("config", &self.config)
            .finish()
    }
}
