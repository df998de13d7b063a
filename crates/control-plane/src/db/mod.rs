//! PostgreSQL connectivity for the flowrun Control Plane.
//!
//! The object table itself is managed by [`crate::store::PgStore`].

pub mod pool;

pub use pool::{create_pool, DbPool};
