//! Entity models, typed tables and per-query identity resolution

use crate::contract::{Cardinality, Entity, EntityMetadata, NavigationMetadata};
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Loader<E> = Arc<dyn Fn(&Catalog, &mut IdentityScope, &mut E) + Send + Sync>;
type KeyGenerator<E> = Arc<dyn Fn(&mut E, u64) + Send + Sync>;

struct Navigation<E> {
    metadata: NavigationMetadata,
    load: Loader<E>,
}

/// How an entity type is stored: its relations and key generation.
///
/// # Example
///
/// ```ignore
/// let model = EntityModel::<Employee>::new()
///     .generated_key(|e, next| e.id = next as i32)
///     .reference::<Department>(
///         "department",
///         |e| Some(e.department_id),
///         |e, dept| e.department = dept,
///     )
///     .collection::<Employee>(
///         "reports",
///         |e, other| other.manager_id == Some(e.id),
///         |e, reports| e.reports = reports,
///     );
/// ```
pub struct EntityModel<E: Entity> {
    navigations: Vec<Navigation<E>>,
    key_generator: Option<KeyGenerator<E>>,
}

impl<E: Entity> EntityModel<E> {
    pub fn new() -> Self {
        Self {
            navigations: Vec::new(),
            key_generator: None,
        }
    }

    /// Assign keys from a per-table sequence when a pending insert still
    /// carries the default key.
    pub fn generated_key(mut self, assign: impl Fn(&mut E, u64) + Send + Sync + 'static) -> Self {
        self.key_generator = Some(Arc::new(assign));
        self
    }

    /// Declare a single-valued relation resolved through a foreign key.
    pub fn reference<R: Entity>(
        mut self,
        name: impl Into<String>,
        foreign_key: impl Fn(&E) -> Option<R::Key> + Send + Sync + 'static,
        assign: impl Fn(&mut E, Option<Arc<R>>) + Send + Sync + 'static,
    ) -> Self {
        let load: Loader<E> = Arc::new(
            move |catalog: &Catalog, scope: &mut IdentityScope, entity: &mut E| {
                let related = foreign_key(entity).and_then(|key| {
                    let row = catalog.table::<R>()?.rows.get(&key)?;
                    Some(scope.resolve(row))
                });
                assign(entity, related);
            },
        );
        self.navigations.push(Navigation {
            metadata: NavigationMetadata {
                name: name.into(),
                target: R::NAME,
                cardinality: Cardinality::One,
            },
            load,
        });
        self
    }

    /// Declare a collection relation resolved by a membership predicate.
    pub fn collection<R: Entity>(
        mut self,
        name: impl Into<String>,
        belongs: impl Fn(&E, &R) -> bool + Send + Sync + 'static,
        assign: impl Fn(&mut E, Vec<Arc<R>>) + Send + Sync + 'static,
    ) -> Self {
        let load: Loader<E> = Arc::new(
            move |catalog: &Catalog, scope: &mut IdentityScope, entity: &mut E| {
                let owner: &E = entity;
                let members = match catalog.table::<R>() {
                    Some(table) => table
                        .rows
                        .values()
                        .filter(|row| belongs(owner, row))
                        .map(|row| scope.resolve(row))
                        .collect(),
                    None => Vec::new(),
                };
                assign(entity, members);
            },
        );
        self.navigations.push(Navigation {
            metadata: NavigationMetadata {
                name: name.into(),
                target: R::NAME,
                cardinality: Cardinality::Many,
            },
            load,
        });
        self
    }

    pub fn metadata(&self) -> EntityMetadata {
        EntityMetadata {
            name: E::NAME,
            navigations: self.navigations.iter().map(|n| n.metadata.clone()).collect(),
        }
    }

    pub(crate) fn loader(&self, name: &str) -> Option<Loader<E>> {
        self.navigations
            .iter()
            .find(|n| n.metadata.name == name)
            .map(|n| Arc::clone(&n.load))
    }

    pub(crate) fn generates_keys(&self) -> bool {
        self.key_generator.is_some()
    }

    pub(crate) fn assign_key(&self, entity: &mut E, next: u64) {
        if let Some(generator) = &self.key_generator {
            generator(entity, next);
        }
    }
}

impl<E: Entity> Default for EntityModel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for EntityModel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("entity", &E::NAME)
            .field("navigations", &self.metadata().navigations)
            .field("generated_key", &self.generates_keys())
            .finish()
    }
}

// ===== Tables =====

pub(crate) struct Table<E: Entity> {
    /// Rows in store-natural (insertion) order
    pub rows: IndexMap<E::Key, E>,
    pub model: Arc<EntityModel<E>>,
    sequence: u64,
}

impl<E: Entity> Table<E> {
    fn new(model: EntityModel<E>) -> Self {
        Self {
            rows: IndexMap::new(),
            model: Arc::new(model),
            sequence: 0,
        }
    }

    /// Give a pending entity the next free key from the sequence.
    pub fn assign_next_key(&mut self, entity: &mut E) {
        loop {
            self.sequence += 1;
            self.model.assign_key(entity, self.sequence);
            if !self.rows.contains_key(entity.id()) {
                return;
            }
        }
    }
}

/// Typed tables and metadata of one database.
#[derive(Default)]
pub(crate) struct Catalog {
    tables: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    metadata: HashMap<&'static str, EntityMetadata>,
}

impl Catalog {
    pub fn register<E: Entity>(&mut self, model: EntityModel<E>) {
        self.metadata.insert(E::NAME, model.metadata());
        self.tables
            .insert(TypeId::of::<E>(), Box::new(Table::new(model)));
    }

    pub fn table<E: Entity>(&self) -> Option<&Table<E>> {
        self.tables.get(&TypeId::of::<E>())?.downcast_ref()
    }

    pub fn table_mut<E: Entity>(&mut self) -> Option<&mut Table<E>> {
        self.tables.get_mut(&TypeId::of::<E>())?.downcast_mut()
    }

    pub fn metadata(&self, entity: &str) -> Option<&EntityMetadata> {
        self.metadata.get(entity)
    }
}

// ===== Identity resolution =====

type Resolved<R> = HashMap<<R as Entity>::Key, Arc<R>>;

/// Per-query identity map: one shared instance per related key.
#[derive(Default)]
pub(crate) struct IdentityScope {
    resolved: HashMap<TypeId, Box<dyn Any>>,
}

impl IdentityScope {
    pub fn resolve<R: Entity>(&mut self, row: &R) -> Arc<R> {
        let slot = self
            .resolved
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(Resolved::<R>::new()));
        match slot.downcast_mut::<Resolved<R>>() {
            Some(resolved) => Arc::clone(
                resolved
                    .entry(row.id().clone())
                    .or_insert_with(|| Arc::new(row.clone())),
            ),
            None => Arc::new(row.clone()),
        }
    }
}
