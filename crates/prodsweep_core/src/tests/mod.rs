//! Crate-level tests for the sweep pipeline
//!
//! Tests are organized by topic:
//! - `fixtures` - Scripted in-memory engine shared by the other modules
//! - `scenarios` - End-to-end sweeps with known outputs
//! - `reduction` - Reducer properties on synthetic and simulated data
//! - `failures` - Failure isolation and resource release
//! - `persistence` - Writing and reloading a sweep's tables

mod fixtures;
mod persistence;
