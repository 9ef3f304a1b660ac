//! Domain layer - query composition, navigation discovery and the repository
//!
//! The store is an external collaborator described by the [`Store`] trait.

pub mod composer;
pub mod lifecycle;
pub mod navigation;
pub mod repository;
pub mod store;

pub use composer::{compose, compose_projected, paginate};
pub use lifecycle::StoreHandle;
pub use navigation::navigation_names;
pub use repository::Repository;
pub use store::Store;
