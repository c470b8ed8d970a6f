//! Shared data model for the Conveyor ETL engine.
//!
//! Pure data types used by the store and engine crates: the stage error
//! taxonomy, the record shapes flowing through a run, and the run-tracking
//! model. Kept in its own crate so the store and engine can share them
//! without circular dependencies.

#![warn(clippy::pedantic)]

pub mod error;
pub mod record;
pub mod run;
