//! Interaction history for the tutor
//!
//! Stores the query, routing label, response and model of every completed
//! run in SQLite so they can be listed later.

pub mod sqlite;

pub use sqlite::{HistoryDb, Interaction};
