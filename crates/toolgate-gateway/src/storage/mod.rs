//! `SQLite` grant store.
//!
//! Persists durable permission records and trusted providers across restarts.

mod db;
mod models;
mod queries;
mod sync;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use sync::{GrantSync, RestoreSummary};
