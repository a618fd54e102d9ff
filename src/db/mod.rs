//! Primary-store module: entity models and SQL repository.
//!
//! - `model`: input/view structs the repository accepts and returns.
//! - `repo`: SQL-only functions that map rows into domain entities.
//!
//! External modules should import from `catalog_mirror::db`; the repository
//! API is re-exported here.

pub mod model;
pub mod repo;

pub use model::NewModule;
pub use repo::*;
