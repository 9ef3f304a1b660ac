//! Caller-assembled query specifications
//!
//! A [`QuerySpec`] bundles the optional fragments of one read: filter,
//! ordering, eager loading, tracking mode and pagination. The repository turns
//! it into a single [`Query`] with a fixed composition order.

use super::model::{Entity, Tracking};
use super::query::{OrderBy, Predicate, Projection, Query};
use indexmap::IndexSet;
use std::fmt;
use std::sync::Arc;

/// Normalised pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// Elements to skip
    pub skip: usize,
    /// Elements to return; `None` is unbounded
    pub take: Option<usize>,
}

impl Page {
    /// Build a window from signed inputs.
    ///
    /// A negative `skip` becomes 0 and a negative `take` becomes unbounded.
    pub fn new(skip: i64, take: i64) -> Self {
        Self::unbounded().with_skip(skip).with_take(take)
    }

    pub fn unbounded() -> Self {
        Self { skip: 0, take: None }
    }

    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = usize::try_from(skip).unwrap_or(0);
        self
    }

    pub fn with_take(mut self, take: i64) -> Self {
        self.take = usize::try_from(take).ok();
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.skip == 0 && self.take.is_none()
    }
}

/// Eager-load fragment of a [`QuerySpec`].
pub enum EagerLoad<E: Entity> {
    /// Load no relations
    None,
    /// Caller transform that appends include stages
    Transform(Arc<dyn Fn(Query<E>) -> Query<E> + Send + Sync>),
    /// Include each named relation
    Names(IndexSet<String>),
    /// Include every single-valued relation the store knows for `E`
    AllNavigations,
}

impl<E: Entity> EagerLoad<E> {
    pub fn transform(f: impl Fn(Query<E>) -> Query<E> + Send + Sync + 'static) -> Self {
        EagerLoad::Transform(Arc::new(f))
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EagerLoad::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, EagerLoad::None)
    }
}

impl<E: Entity> Default for EagerLoad<E> {
    fn default() -> Self {
        EagerLoad::None
    }
}

impl<E: Entity> Clone for EagerLoad<E> {
    fn clone(&self) -> Self {
        match self {
            EagerLoad::None => EagerLoad::None,
            EagerLoad::Transform(f) => EagerLoad::Transform(Arc::clone(f)),
            EagerLoad::Names(names) => EagerLoad::Names(names.clone()),
            EagerLoad::AllNavigations => EagerLoad::AllNavigations,
        }
    }
}

impl<E: Entity> fmt::Debug for EagerLoad<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EagerLoad::None => f.write_str("None"),
            EagerLoad::Transform(_) => f.write_str("Transform"),
            EagerLoad::Names(names) => f.debug_tuple("Names").field(names).finish(),
            EagerLoad::AllNavigations => f.write_str("AllNavigations"),
        }
    }
}

/// Immutable bundle of optional read fragments.
///
/// Pagination only applies to bulk reads (`get_all*`); single-record lookups
/// ignore it.
///
/// # Example
///
/// ```ignore
/// let spec = QuerySpec::<Employee>::untracked()
///     .filter(|e| e.id > 1)
///     .order_by(OrderBy::descending(|e: &Employee| e.id))
///     .skip(1)
///     .take(1);
/// let page = repo.get_all(spec, &cancel).await?;
/// ```
pub struct QuerySpec<E: Entity> {
    pub(crate) tracking: Option<Tracking>,
    pub(crate) filter: Option<Predicate<E>>,
    pub(crate) order_by: Option<OrderBy<E>>,
    pub(crate) eager_load: EagerLoad<E>,
    pub(crate) page: Page,
}

impl<E: Entity> QuerySpec<E> {
    /// Empty specification; tracking falls back to the repository default.
    pub fn new() -> Self {
        Self {
            tracking: None,
            filter: None,
            order_by: None,
            eager_load: EagerLoad::None,
            page: Page::unbounded(),
        }
    }

    pub fn tracked() -> Self {
        Self::new().tracking(Tracking::Tracked)
    }

    pub fn untracked() -> Self {
        Self::new().tracking(Tracking::Untracked)
    }

    pub fn tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn filter(self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.with_predicate(Predicate::new(f))
    }

    pub fn with_predicate(mut self, predicate: Predicate<E>) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn order_by(mut self, order: OrderBy<E>) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Add one relation name; replaces a transform or "all navigations" load.
    pub fn include(mut self, navigation: impl Into<String>) -> Self {
        let navigation: String = navigation.into();
        match &mut self.eager_load {
            EagerLoad::Names(names) => {
                names.insert(navigation);
            }
            other => *other = EagerLoad::names([navigation]),
        }
        self
    }

    pub fn eager_load(mut self, eager_load: EagerLoad<E>) -> Self {
        self.eager_load = eager_load;
        self
    }

    pub fn with_all_navigations(self) -> Self {
        self.eager_load(EagerLoad::AllNavigations)
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.page = self.page.with_skip(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.page = self.page.with_take(take);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub fn predicate(&self) -> Option<&Predicate<E>> {
        self.filter.as_ref()
    }

    pub fn ordering(&self) -> Option<&OrderBy<E>> {
        self.order_by.as_ref()
    }

    pub fn eager(&self) -> &EagerLoad<E> {
        &self.eager_load
    }

    pub fn pagination(&self) -> Page {
        self.page
    }

    pub fn requested_tracking(&self) -> Option<Tracking> {
        self.tracking
    }
}

impl<E: Entity> Default for QuerySpec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for QuerySpec<E> {
    fn clone(&self) -> Self {
        Self {
            tracking: self.tracking,
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            eager_load: self.eager_load.clone(),
            page: self.page,
        }
    }
}

impl<E: Entity> fmt::Debug for QuerySpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("tracking", &self.tracking)
            .field("filtered", &self.filter.is_some())
            .field("ordered", &self.order_by.is_some())
            .field("eager_load", &self.eager_load)
            .field("page", &self.page)
            .finish()
    }
}

/// Specification of a projected bulk read.
///
/// The filter runs over entities before projection; ordering and pagination
/// run over the projected shape `R`.
pub struct ProjectionSpec<E: Entity, R> {
    pub(crate) projection: Projection<E, R>,
    pub(crate) filter: Option<Predicate<E>>,
    pub(crate) order_by: Option<OrderBy<R>>,
    pub(crate) page: Page,
}

impl<E: Entity, R> ProjectionSpec<E, R> {
    pub fn new(selector: impl Fn(&E) -> R + Send + Sync + 'static) -> Self {
        Self::with_projection(Projection::new(selector))
    }

    pub fn with_projection(projection: Projection<E, R>) -> Self {
        Self {
            projection,
            filter: None,
            order_by: None,
            page: Page::unbounded(),
        }
    }

    pub fn filter(mut self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Predicate::new(f));
        self
    }

    pub fn order_by(mut self, order: OrderBy<R>) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.page = self.page.with_skip(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.page = self.page.with_take(take);
        self
    }
}

impl<E: Entity, R> fmt::Debug for ProjectionSpec<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionSpec")
            .field("filtered", &self.filter.is_some())
            .field("ordered", &self.order_by.is_some())
            .field("page", &self.page)
            .finish()
    }
}
