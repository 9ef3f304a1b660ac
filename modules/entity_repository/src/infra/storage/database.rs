//! Shared in-memory database

use super::schema::{Catalog, EntityModel};
use super::session::MemorySession;
use crate::contract::{Entity, EntityMetadata, StoreError, StoreResult};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// In-process record store shared by any number of sessions.
///
/// Entity types must be registered before use. Each session opened with
/// [`MemoryDatabase::session`] is one unit of work; changes become visible to
/// other sessions on `save_changes`.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    pub(crate) catalog: Arc<RwLock<Catalog>>,
    latency: Option<Duration>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a round trip to a backing medium on every async operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register an entity type; re-registering replaces the table.
    pub fn register<E: Entity>(&self, model: EntityModel<E>) -> &Self {
        self.catalog.write().register(model);
        tracing::debug!(entity = E::NAME, "entity type registered");
        self
    }

    /// Insert rows directly, bypassing any unit of work.
    pub fn seed<E: Entity>(&self, rows: impl IntoIterator<Item = E>) -> StoreResult<()> {
        let mut catalog = self.catalog.write();
        let table = catalog
            .table_mut::<E>()
            .ok_or(StoreError::UnknownEntity { entity: E::NAME })?;
        for row in rows {
            table.rows.insert(row.id().clone(), row);
        }
        Ok(())
    }

    /// Snapshot of the committed rows of `E` in store-natural order.
    pub fn rows<E: Entity>(&self) -> Vec<E> {
        self.catalog
            .read()
            .table::<E>()
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn metadata(&self, entity: &str) -> Option<EntityMetadata> {
        self.catalog.read().metadata(entity).cloned()
    }

    /// Open a new unit of work.
    pub fn session(&self) -> Arc<MemorySession> {
        Arc::new(MemorySession::new(self.clone()))
    }

    pub(crate) async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}
