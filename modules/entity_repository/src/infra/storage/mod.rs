//! Storage layer - in-process reference store
//!
//! `MemoryDatabase` holds typed tables; each `MemorySession` is one unit of
//! work over it and implements [`Store`](crate::domain::Store).

pub mod database;
pub mod schema;
pub mod session;

pub use database::MemoryDatabase;
pub use schema::EntityModel;
pub use session::{EntryState, MemorySession};
