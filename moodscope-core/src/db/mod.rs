//! Database layer
//!
//! SQLite storage with migrations support.

pub mod repo;
pub mod schema;

pub use repo::Database;
