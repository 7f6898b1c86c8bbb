//! SQLite backend for the consent engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
