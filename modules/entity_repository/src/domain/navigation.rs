//! Navigation discovery from store metadata

use super::store::Store;
use crate::contract::{Entity, EntityMetadata};
use indexmap::IndexSet;

/// Names of every single-valued relation of `E`, in declaration order.
///
/// Collections are left out because including them changes the cardinality of
/// the base query. An entity type the store does not know yields an empty set.
pub fn navigation_names<S, E>(store: &S) -> IndexSet<String>
where
    S: Store + ?Sized,
    E: Entity,
{
    match store.metadata(E::NAME) {
        Some(metadata) => single_valued(&metadata),
        None => {
            tracing::debug!(entity = E::NAME, "no store metadata; no navigations to load");
            IndexSet::new()
        }
    }
}

pub(crate) fn single_valued(metadata: &EntityMetadata) -> IndexSet<String> {
    metadata
        .navigations
        .iter()
        .filter(|nav| nav.is_single_valued())
        .map(|nav| nav.name.clone())
        .collect()
}
