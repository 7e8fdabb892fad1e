//! Persistence
//!
//! - `store` - the SQLite store, schema migration and repositories

pub mod store;
