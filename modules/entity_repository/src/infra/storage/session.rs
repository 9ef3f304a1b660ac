//! Unit of work over a [`MemoryDatabase`]
//!
//! A session tracks the entities it has handed out or been given, records
//! pending inserts, updates and deletes, and applies them atomically on
//! [`MemorySession::save_changes`].

use super::database::MemoryDatabase;
use super::schema::{Catalog, IdentityScope, Table};
use crate::contract::{
    Entity, EntityMetadata, ProjectedQuery, Query, Stage, StoreError, StoreResult, Tracking,
};
use crate::domain::Store;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

/// State of a tracked entity relative to the committed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

struct Entry<E> {
    entity: E,
    state: EntryState,
}

/// Tracked entities of one type.
struct TrackedSet<E: Entity> {
    entries: IndexMap<E::Key, Entry<E>>,
    /// Inserts waiting for a generated key
    pending: Vec<E>,
}

impl<E: Entity> TrackedSet<E> {
    fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            pending: Vec::new(),
        }
    }

    fn track_unchanged(&mut self, entity: &E) {
        self.entries
            .entry(entity.id().clone())
            .or_insert_with(|| Entry {
                entity: entity.clone(),
                state: EntryState::Unchanged,
            });
    }
}

/// Type-erased view of a tracked set used by the commit.
trait ChangeSet: Send {
    fn validate(&self, catalog: &Catalog) -> StoreResult<()>;
    fn apply(&mut self, catalog: &mut Catalog) -> usize;
    fn tracked(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Entity> ChangeSet for TrackedSet<E> {
    fn validate(&self, catalog: &Catalog) -> StoreResult<()> {
        let table = catalog
            .table::<E>()
            .ok_or(StoreError::UnknownEntity { entity: E::NAME })?;
        for (key, entry) in &self.entries {
            let exists = table.rows.contains_key(key);
            match entry.state {
                EntryState::Added if exists => {
                    return Err(StoreError::DuplicateKey {
                        entity: E::NAME,
                        key: format!("{key:?}"),
                    });
                }
                EntryState::Modified | EntryState::Deleted if !exists => {
                    return Err(StoreError::Concurrency {
                        entity: E::NAME,
                        key: format!("{key:?}"),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, catalog: &mut Catalog) -> usize {
        let Some(table) = catalog.table_mut::<E>() else {
            return 0;
        };
        let mut affected = 0;

        self.entries.retain(|key, entry| match entry.state {
            EntryState::Unchanged => true,
            EntryState::Deleted => {
                table.rows.shift_remove(key);
                affected += 1;
                false
            }
            EntryState::Added | EntryState::Modified => {
                table.rows.insert(key.clone(), entry.entity.clone());
                entry.state = EntryState::Unchanged;
                affected += 1;
                true
            }
        });

        for mut entity in self.pending.drain(..) {
            table.assign_next_key(&mut entity);
            table.rows.insert(entity.id().clone(), entity.clone());
            self.entries.insert(
                entity.id().clone(),
                Entry {
                    entity,
                    state: EntryState::Unchanged,
                },
            );
            affected += 1;
        }

        affected
    }

    fn tracked(&self) -> usize {
        self.entries.len() + self.pending.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct UnitOfWork {
    sets: HashMap<TypeId, Box<dyn ChangeSet>>,
}

impl UnitOfWork {
    fn set_mut<E: Entity>(&mut self) -> StoreResult<&mut TrackedSet<E>> {
        self.sets
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(TrackedSet::<E>::new()))
            .as_any_mut()
            .downcast_mut()
            .ok_or_else(|| {
                StoreError::Backend(anyhow::anyhow!(
                    "tracked set for `{}` has an unexpected type",
                    E::NAME
                ))
            })
    }

    fn set<E: Entity>(&self) -> Option<&TrackedSet<E>> {
        self.sets.get(&TypeId::of::<E>())?.as_any().downcast_ref()
    }
}

/// One unit of work over a [`MemoryDatabase`].
pub struct MemorySession {
    id: Uuid,
    database: MemoryDatabase,
    work: Mutex<UnitOfWork>,
    disposed: AtomicBool,
    dispose_calls: AtomicUsize,
}

impl MemorySession {
    pub(crate) fn new(database: MemoryDatabase) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "store session opened");
        Self {
            id,
            database,
            work: Mutex::new(UnitOfWork::default()),
            disposed: AtomicBool::new(false),
            dispose_calls: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }

    /// Persist every pending change; either all of them apply or none.
    ///
    /// Returns the number of affected rows.
    pub async fn save_changes(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        self.database.round_trip().await;

        let mut work = self.work.lock();
        let mut catalog = self.database.catalog.write();
        for set in work.sets.values() {
            set.validate(&catalog)?;
        }
        let affected: usize = work
            .sets
            .values_mut()
            .map(|set| set.apply(&mut catalog))
            .sum();

        tracing::info!(session = %self.id, affected, "unit of work committed");
        Ok(affected)
    }

    /// Number of entities of `E` the unit of work is tracking.
    pub fn tracked_count<E: Entity>(&self) -> usize {
        let work = self.work.lock();
        work.set::<E>().map_or(0, |set| set.tracked())
    }

    /// Tracking state of the entity of `E` with `key`, if tracked.
    pub fn state_of<E: Entity>(&self, key: &E::Key) -> Option<EntryState> {
        let work = self.work.lock();
        work.set::<E>()?.entries.get(key).map(|entry| entry.state)
    }

    /// How many times `dispose` has been called.
    pub fn dispose_count(&self) -> usize {
        self.dispose_calls.load(Ordering::Acquire)
    }

    /// Whether `entity` still needs a key generated by the store.
    fn awaits_key<E: Entity>(&self, entity: &E) -> bool {
        entity.id() == &E::Key::default()
            && self
                .database
                .catalog
                .read()
                .table::<E>()
                .is_some_and(|table| table.model.generates_keys())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    /// Run a query plan against the committed rows of `E`.
    fn run_plan<E: Entity>(&self, query: &Query<E>) -> StoreResult<Vec<E>> {
        let mut work = self.work.lock();
        let catalog = self.database.catalog.read();
        let table = catalog
            .table::<E>()
            .ok_or(StoreError::UnknownEntity { entity: E::NAME })?;

        let tracked = query.tracking() == Tracking::Tracked;
        let stages = query.stages();

        // Leading stages that keep store order run over borrowed rows, so
        // only the selected rows are cloned.
        let lazy = stages
            .iter()
            .take_while(|stage| {
                matches!(
                    stage,
                    Stage::Untracked | Stage::Filter(_) | Stage::Skip(_) | Stage::Take(_)
                )
            })
            .count();
        let mut selected: Box<dyn Iterator<Item = &E> + '_> = Box::new(table.rows.values());
        for stage in &stages[..lazy] {
            selected = match stage {
                Stage::Filter(predicate) => {
                    Box::new(selected.filter(move |row| predicate.matches(row)))
                }
                Stage::Skip(count) => Box::new(selected.skip(*count)),
                Stage::Take(count) => Box::new(selected.take(*count)),
                _ => selected,
            };
        }
        let mut rows: Vec<E> = selected.cloned().collect();
        let mut scope = IdentityScope::default();
        let mut overlaid = !tracked;

        for stage in &stages[lazy..] {
            if !overlaid && !matches!(stage, Stage::Filter(_) | Stage::Untracked) {
                overlay(work.set_mut::<E>()?, &mut rows);
                overlaid = true;
            }
            match stage {
                Stage::Untracked => {}
                Stage::Filter(predicate) => rows.retain(|row| predicate.matches(row)),
                Stage::Include(name) => include(&catalog, table, &mut scope, name, &mut rows)?,
                Stage::OrderBy(order) => rows.sort_by(|a, b| order.compare(a, b)),
                Stage::Skip(count) => {
                    rows.drain(..(*count).min(rows.len()));
                }
                Stage::Take(count) => rows.truncate(*count),
            }
        }

        if tracked {
            let set = work.set_mut::<E>()?;
            if !overlaid {
                overlay(set, &mut rows);
            }
            for row in &rows {
                set.track_unchanged(row);
            }
        }

        tracing::debug!(
            session = %self.id,
            entity = E::NAME,
            stages = stages.len(),
            rows = rows.len(),
            "query executed"
        );
        Ok(rows)
    }
}

/// Replace committed rows by the instances this session already tracks.
fn overlay<E: Entity>(set: &TrackedSet<E>, rows: &mut [E]) {
    for row in rows.iter_mut() {
        if let Some(entry) = set.entries.get(row.id()) {
            *row = entry.entity.clone();
        }
    }
}

fn include<E: Entity>(
    catalog: &Catalog,
    table: &Table<E>,
    scope: &mut IdentityScope,
    name: &str,
    rows: &mut [E],
) -> StoreResult<()> {
    let load = table
        .model
        .loader(name)
        .ok_or_else(|| StoreError::UnknownNavigation {
            entity: E::NAME,
            navigation: name.to_owned(),
        })?;
    for row in rows.iter_mut() {
        load(catalog, scope, row);
    }
    Ok(())
}

#[async_trait]
impl Store for MemorySession {
    fn metadata(&self, entity: &str) -> Option<EntityMetadata> {
        self.database.metadata(entity)
    }

    fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::AcqRel);
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut work = self.work.lock();
        let abandoned: usize = work.sets.values().map(|set| set.tracked()).sum();
        work.sets.clear();
        tracing::debug!(session = %self.id, abandoned, "store session disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    async fn fetch<E: Entity>(&self, query: Query<E>) -> StoreResult<Vec<E>> {
        self.ensure_open()?;
        self.database.round_trip().await;
        self.run_plan(&query)
    }

    async fn fetch_projected<E: Entity, R: Send + 'static>(
        &self,
        query: ProjectedQuery<E, R>,
    ) -> StoreResult<Vec<R>> {
        self.ensure_open()?;
        self.database.round_trip().await;

        let ProjectedQuery {
            source,
            projection,
            order_by,
            skip,
            take,
        } = query;
        let rows = self.run_plan(&source)?;
        let mut projected: Vec<R> = rows.iter().map(|row| projection.apply(row)).collect();
        if let Some(order) = order_by {
            projected.sort_by(|a, b| order.compare(a, b));
        }
        let projected = projected.into_iter().skip(skip);
        Ok(match take {
            Some(take) => projected.take(take).collect(),
            None => projected.collect(),
        })
    }

    async fn find_by_key<E: Entity>(&self, key: &E::Key) -> StoreResult<Option<E>> {
        self.ensure_open()?;
        {
            let mut work = self.work.lock();
            if let Some(entry) = work.set_mut::<E>()?.entries.get(key) {
                return Ok((entry.state != EntryState::Deleted).then(|| entry.entity.clone()));
            }
        }

        self.database.round_trip().await;
        let mut work = self.work.lock();
        let catalog = self.database.catalog.read();
        let table = catalog
            .table::<E>()
            .ok_or(StoreError::UnknownEntity { entity: E::NAME })?;
        let found = table.rows.get(key).cloned();
        if let Some(entity) = &found {
            work.set_mut::<E>()?.track_unchanged(entity);
        }
        Ok(found)
    }

    async fn add<E: Entity>(&self, entity: E) -> StoreResult<()> {
        self.add_range(vec![entity]).await
    }

    async fn add_range<E: Entity>(&self, entities: Vec<E>) -> StoreResult<()> {
        self.ensure_open()?;
        self.database.round_trip().await;

        let mut work = self.work.lock();
        let catalog = self.database.catalog.read();
        let table = catalog
            .table::<E>()
            .ok_or(StoreError::UnknownEntity { entity: E::NAME })?;
        let generates_keys = table.model.generates_keys();
        let is_pending = |entity: &E| generates_keys && entity.id() == &E::Key::default();

        let set = work.set_mut::<E>()?;
        let mut seen = HashSet::new();
        for entity in entities.iter().filter(|e| !is_pending(*e)) {
            if set.entries.contains_key(entity.id()) || !seen.insert(entity.id()) {
                return Err(StoreError::AlreadyTracked {
                    entity: E::NAME,
                    key: format!("{:?}", entity.id()),
                });
            }
        }

        let count = entities.len();
        for entity in entities {
            if is_pending(&entity) {
                set.pending.push(entity);
            } else {
                set.entries.insert(
                    entity.id().clone(),
                    Entry {
                        entity,
                        state: EntryState::Added,
                    },
                );
            }
        }
        tracing::debug!(session = %self.id, entity = E::NAME, count, "pending inserts registered");
        Ok(())
    }

    fn mark_deleted<E: Entity>(&self, entity: &E) -> StoreResult<()> {
        self.ensure_open()?;
        let awaits_key = self.awaits_key(entity);
        let mut work = self.work.lock();
        let set = work.set_mut::<E>()?;
        if awaits_key {
            if let Some(position) = set.pending.iter().position(|pending| pending == entity) {
                set.pending.remove(position);
                return Ok(());
            }
        }
        let key = entity.id();
        if set.entries.get(key).map(|entry| entry.state) == Some(EntryState::Added) {
            // Never persisted: just forget it.
            set.entries.shift_remove(key);
            return Ok(());
        }
        set.entries
            .entry(key.clone())
            .or_insert_with(|| Entry {
                entity: entity.clone(),
                state: EntryState::Deleted,
            })
            .state = EntryState::Deleted;
        Ok(())
    }

    fn mark_modified<E: Entity>(&self, entity: E) -> StoreResult<()> {
        self.ensure_open()?;
        let awaits_key = self.awaits_key(&entity);
        let mut work = self.work.lock();
        let set = work.set_mut::<E>()?;
        if awaits_key {
            // Without a key there is no row to modify; the entity stays an insert.
            if !set.pending.contains(&entity) {
                set.pending.push(entity);
            }
            return Ok(());
        }
        let state = match set.entries.get(entity.id()).map(|entry| entry.state) {
            Some(EntryState::Added) => EntryState::Added,
            _ => EntryState::Modified,
        };
        set.entries
            .insert(entity.id().clone(), Entry { entity, state });
        Ok(())
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
