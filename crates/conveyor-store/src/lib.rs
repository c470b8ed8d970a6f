//! Persistence layer for the Conveyor ETL engine.
//!
//! Provides the [`RunStore`] and [`RecordStore`] traits and a
//! [`SqliteStore`] implementation covering run tracking, dead-letter
//! retention, and the upsert-with-history record destination.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::{RecordStore, RunStore, StoredRecord, UpsertResult};
pub use error::StoreError;
pub use sqlite::SqliteStore;
