//! Entity identity contract and store metadata types

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// A record type the repository can manage.
///
/// An entity exposes exactly one identity field. The identity is assigned by
/// the store when the entity is first persisted and is treated as immutable by
/// callers afterwards. Within one entity collection identity values are unique.
/// Equality tells apart instances that are still waiting for an identity.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Debug, PartialEq)]
/// struct Department {
///     id: i32,
///     name: String,
/// }
///
/// impl Entity for Department {
///     type Key = i32;
///     const NAME: &'static str = "Department";
///
///     fn id(&self) -> &i32 {
///         &self.id
///     }
/// }
/// ```
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    /// Identity type. `Key::default()` marks an identity the store has not
    /// assigned yet.
    type Key: Clone + Eq + Hash + Debug + Default + Send + Sync + 'static;

    /// Name under which the store knows this entity type.
    const NAME: &'static str;

    /// Identity of this instance.
    fn id(&self) -> &Self::Key;
}

/// Whether returned instances are registered with the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tracking {
    /// Results are registered for change detection until commit.
    #[default]
    Tracked,
    /// Results are detached; related instances are identity-resolved per query.
    Untracked,
}

/// Cardinality of a relation from one entity type to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Single-valued reference (many-to-one, one-to-one).
    One,
    /// Collection of related entities (one-to-many, many-to-many).
    Many,
}

/// Store-side description of one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationMetadata {
    /// Relation name, as accepted by an include stage
    pub name: String,
    /// Name of the related entity type
    pub target: &'static str,
    /// Relation cardinality
    pub cardinality: Cardinality,
}

impl NavigationMetadata {
    /// True for single-valued relations
    pub fn is_single_valued(&self) -> bool {
        self.cardinality == Cardinality::One
    }
}

/// Store-side description of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Entity type name
    pub name: &'static str,
    /// Relations in declaration order
    pub navigations: Vec<NavigationMetadata>,
}
