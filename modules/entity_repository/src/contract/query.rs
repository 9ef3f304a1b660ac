//! Query fragments and the store-facing query plan
//!
//! A [`Query`] is an ordered list of [`Stage`]s. The repository composes the
//! stages; a [`Store`](crate::domain::Store) interprets them in order against
//! its entity sequence.

use super::model::{Entity, Tracking};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Filter predicate over an entity (or a projected shape).
pub struct Predicate<E>(Arc<dyn Fn(&E) -> bool + Send + Sync>);

impl<E> Predicate<E> {
    pub fn new(f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn matches(&self, value: &E) -> bool {
        (self.0)(value)
    }

    /// Conjunction of two predicates.
    pub fn and(self, other: Predicate<E>) -> Self
    where
        E: 'static,
    {
        Self::new(move |value| self.matches(value) && other.matches(value))
    }
}

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate")
    }
}

/// Total ordering over a sequence.
///
/// The caller is responsible for making the ordering total when the result is
/// paginated; ties keep store-natural order.
pub struct OrderBy<T>(Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>);

impl<T: 'static> OrderBy<T> {
    /// Order with an explicit comparator.
    pub fn by(compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(compare))
    }

    pub fn ascending<K: Ord>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::by(move |a, b| key(a).cmp(&key(b)))
    }

    pub fn descending<K: Ord>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::by(move |a, b| key(b).cmp(&key(a)))
    }

    /// Secondary ascending key, applied when the current ordering ties.
    pub fn then_ascending<K: Ord>(self, key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        let secondary = Self::ascending(key);
        Self::by(move |a, b| self.compare(a, b).then_with(|| secondary.compare(a, b)))
    }

    /// Secondary descending key, applied when the current ordering ties.
    pub fn then_descending<K: Ord>(self, key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        let secondary = Self::descending(key);
        Self::by(move |a, b| self.compare(a, b).then_with(|| secondary.compare(a, b)))
    }
}

impl<T> OrderBy<T> {
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.0)(a, b)
    }
}

impl<T> Clone for OrderBy<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for OrderBy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OrderBy")
    }
}

/// Mapping from an entity to a caller-defined read-only shape.
pub struct Projection<E, R>(Arc<dyn Fn(&E) -> R + Send + Sync>);

impl<E, R> Projection<E, R> {
    pub fn new(f: impl Fn(&E) -> R + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, value: &E) -> R {
        (self.0)(value)
    }
}

impl<E, R> Clone for Projection<E, R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E, R> fmt::Debug for Projection<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Projection")
    }
}

/// One step of a query plan.
pub enum Stage<E> {
    /// Detach results from the unit of work, resolving identity per query
    Untracked,
    /// Narrow the candidate set
    Filter(Predicate<E>),
    /// Eager-load the named relation
    Include(String),
    /// Sort the sequence
    OrderBy(OrderBy<E>),
    /// Drop the first `n` elements
    Skip(usize),
    /// Keep at most `n` elements
    Take(usize),
}

impl<E> Stage<E> {
    /// Short stage name used in logs and plan descriptions.
    pub fn kind(&self) -> &'static str {
        match self {
            Stage::Untracked => "untracked",
            Stage::Filter(_) => "filter",
            Stage::Include(_) => "include",
            Stage::OrderBy(_) => "order_by",
            Stage::Skip(_) => "skip",
            Stage::Take(_) => "take",
        }
    }
}

impl<E> Clone for Stage<E> {
    fn clone(&self) -> Self {
        match self {
            Stage::Untracked => Stage::Untracked,
            Stage::Filter(p) => Stage::Filter(p.clone()),
            Stage::Include(name) => Stage::Include(name.clone()),
            Stage::OrderBy(o) => Stage::OrderBy(o.clone()),
            Stage::Skip(n) => Stage::Skip(*n),
            Stage::Take(n) => Stage::Take(*n),
        }
    }
}

impl<E> fmt::Debug for Stage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Include(name) => write!(f, "include({name})"),
            Stage::Skip(n) => write!(f, "skip({n})"),
            Stage::Take(n) => write!(f, "take({n})"),
            other => f.write_str(other.kind()),
        }
    }
}

/// Query plan over the full entity sequence of `E`.
///
/// Starts from every entity of the type; each builder call appends one stage.
pub struct Query<E: Entity> {
    stages: Vec<Stage<E>>,
}

impl<E: Entity> Query<E> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Mark the query untracked (identity-resolving).
    pub fn untracked(mut self) -> Self {
        if !self.stages.iter().any(|s| matches!(s, Stage::Untracked)) {
            self.stages.push(Stage::Untracked);
        }
        self
    }

    pub fn filter(mut self, predicate: Predicate<E>) -> Self {
        self.stages.push(Stage::Filter(predicate));
        self
    }

    pub fn include(mut self, navigation: impl Into<String>) -> Self {
        self.stages.push(Stage::Include(navigation.into()));
        self
    }

    pub fn order_by(mut self, order: OrderBy<E>) -> Self {
        self.stages.push(Stage::OrderBy(order));
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.stages.push(Stage::Skip(count));
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.stages.push(Stage::Take(count));
        self
    }

    pub fn stages(&self) -> &[Stage<E>] {
        &self.stages
    }

    pub fn tracking(&self) -> Tracking {
        if self.stages.iter().any(|s| matches!(s, Stage::Untracked)) {
            Tracking::Untracked
        } else {
            Tracking::Tracked
        }
    }

    /// Names of every relation this plan includes, in stage order.
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().filter_map(|s| match s {
            Stage::Include(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity", &E::NAME)
            .field("stages", &self.stages)
            .finish()
    }
}

/// Query plan whose results are projected into `R`.
///
/// `source` is filtered over entities; `order_by`, `skip` and `take` operate on
/// the projected shape.
pub struct ProjectedQuery<E: Entity, R> {
    pub source: Query<E>,
    pub projection: Projection<E, R>,
    pub order_by: Option<OrderBy<R>>,
    pub skip: usize,
    pub take: Option<usize>,
}

impl<E: Entity, R> fmt::Debug for ProjectedQuery<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectedQuery")
            .field("source", &self.source)
            .field("ordered", &self.order_by.is_some())
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}
