//! SQLite-backed package catalog.

pub mod connection;
pub mod error;
pub mod migration;
pub mod models;
pub mod repository;
pub mod schema;
pub mod store;

pub use connection::CatalogDatabase;
pub use error::{DbError, Result};
pub use store::CatalogStore;
