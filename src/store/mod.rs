//! Persistence layer — §4.S.
//!
//! The [`Store`] trait is the sole interface every other component uses to
//! read or write persisted state. [`SqliteStore`] is the only backend today;
//! [`cache::CachedStore`] wraps it with a generation-counter read cache for
//! the hot list/search paths.

pub mod cache;
pub mod error;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod trait_def;

pub use cache::CachedStore;
pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use trait_def::Store;
