//! Query composition
//!
//! Turns independently supplied fragments into one [`Query`]. The stage order
//! is fixed: tracking, filter, eager load, ordering, then pagination. Each
//! stage changes what the next one sees, so callers cannot reorder them.

use crate::contract::{
    EagerLoad, Entity, OrderBy, Page, Predicate, ProjectedQuery, Projection, Query, Tracking,
};
use indexmap::IndexSet;

/// Compose an entity query from optional fragments.
///
/// `all_navigations` is only invoked when the eager-load fragment asks for
/// every single-valued relation.
pub fn compose<E, F>(
    tracking: Tracking,
    filter: Option<&Predicate<E>>,
    eager_load: &EagerLoad<E>,
    order_by: Option<&OrderBy<E>>,
    all_navigations: F,
) -> Query<E>
where
    E: Entity,
    F: FnOnce() -> IndexSet<String>,
{
    let mut query = Query::new();

    if tracking == Tracking::Untracked {
        query = query.untracked();
    }

    if let Some(predicate) = filter {
        query = query.filter(predicate.clone());
    }

    query = match eager_load {
        EagerLoad::None => query,
        EagerLoad::Transform(transform) => transform(query),
        EagerLoad::Names(names) => include_all(query, names),
        EagerLoad::AllNavigations => include_all(query, &all_navigations()),
    };

    if let Some(order) = order_by {
        query = query.order_by(order.clone());
    }

    query
}

/// Append the pagination window; an unbounded page adds nothing.
pub fn paginate<E: Entity>(mut query: Query<E>, page: Page) -> Query<E> {
    if page.skip > 0 {
        query = query.skip(page.skip);
    }
    if let Some(take) = page.take {
        query = query.take(take);
    }
    query
}

/// Compose a projected query.
///
/// The filter runs over entities so it may reference anything the store can
/// resolve; ordering and pagination run over the projected shape. Projected
/// reads never register with the unit of work.
pub fn compose_projected<E: Entity, R>(
    filter: Option<&Predicate<E>>,
    projection: Projection<E, R>,
    order_by: Option<OrderBy<R>>,
    page: Page,
) -> ProjectedQuery<E, R> {
    let mut source = Query::new().untracked();
    if let Some(predicate) = filter {
        source = source.filter(predicate.clone());
    }

    ProjectedQuery {
        source,
        projection,
        order_by,
        skip: page.skip,
        take: page.take,
    }
}

fn include_all<E: Entity>(query: Query<E>, names: &IndexSet<String>) -> Query<E> {
    if names.is_empty() {
        return query;
    }
    names
        .iter()
        .fold(query, |query, name| query.include(name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Order {
        id: u32,
    }

    impl Entity for Order {
        type Key = u32;
        const NAME: &'static str = "Order";

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    fn kinds(query: &Query<Order>) -> Vec<&'static str> {
        query.stages().iter().map(|s| s.kind()).collect()
    }

    fn no_navigations() -> IndexSet<String> {
        IndexSet::new()
    }

    #[test]
    fn test_compose_without_fragments_is_full_sequence() {
        let query = compose::<Order, _>(
            Tracking::Tracked,
            None,
            &EagerLoad::None,
            None,
            no_navigations,
        );
        assert!(query.stages().is_empty());
        assert_eq!(query.tracking(), Tracking::Tracked);
    }

    #[test]
    fn test_compose_keeps_fixed_stage_order() {
        let filter = Predicate::new(|o: &Order| o.id > 1);
        let order = OrderBy::descending(|o: &Order| o.id);
        let eager = EagerLoad::names(["customer", "invoice"]);

        let query = compose(
            Tracking::Untracked,
            Some(&filter),
            &eager,
            Some(&order),
            no_navigations,
        );
        let query = paginate(query, Page::new(1, 1));

        assert_eq!(
            kinds(&query),
            vec!["untracked", "filter", "include", "include", "order_by", "skip", "take"]
        );
        assert_eq!(query.includes().collect::<Vec<_>>(), vec!["customer", "invoice"]);
    }

    #[test]
    fn test_transform_runs_between_filter_and_order() {
        let filter = Predicate::new(|o: &Order| o.id > 1);
        let order = OrderBy::ascending(|o: &Order| o.id);
        let eager = EagerLoad::transform(|q: Query<Order>| q.include("lines"));

        let query = compose(Tracking::Tracked, Some(&filter), &eager, Some(&order), no_navigations);

        assert_eq!(kinds(&query), vec!["filter", "include", "order_by"]);
    }

    #[test]
    fn test_empty_name_set_adds_no_includes() {
        let eager = EagerLoad::<Order>::Names(IndexSet::new());
        let query = compose(Tracking::Tracked, None, &eager, None, no_navigations);
        assert!(query.stages().is_empty());
    }

    #[test]
    fn test_navigation_discovery_only_runs_for_all_navigations() {
        let calls = Cell::new(0);
        let discover = || {
            calls.set(calls.get() + 1);
            ["customer".to_owned()].into_iter().collect()
        };

        let _ = compose::<Order, _>(Tracking::Tracked, None, &EagerLoad::None, None, discover);
        assert_eq!(calls.get(), 0);

        let query = compose::<Order, _>(
            Tracking::Tracked,
            None,
            &EagerLoad::AllNavigations,
            None,
            discover,
        );
        assert_eq!(calls.get(), 1);
        assert_eq!(query.includes().collect::<Vec<_>>(), vec!["customer"]);
    }

    #[test]
    fn test_paginate_skips_unbounded_window() {
        let query = paginate(Query::<Order>::new(), Page::new(-3, -1));
        assert!(query.stages().is_empty());

        let query = paginate(Query::<Order>::new(), Page::new(0, 0));
        assert_eq!(kinds(&query), vec!["take"]);
    }

    #[test]
    fn test_projected_query_is_untracked_and_windowed() {
        let filter = Predicate::new(|o: &Order| o.id > 2);
        let projected = compose_projected(
            Some(&filter),
            Projection::new(|o: &Order| o.id * 10),
            Some(OrderBy::descending(|v: &u32| *v)),
            Page::new(1, 2),
        );

        assert_eq!(kinds(&projected.source), vec!["untracked", "filter"]);
        assert!(projected.order_by.is_some());
        assert_eq!(projected.skip, 1);
        assert_eq!(projected.take, Some(2));
    }
}
