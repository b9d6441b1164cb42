//! Parameter sweeps over agent-based production simulations
//!
//! This crate runs a simulation model across the cartesian product of its
//! parameters, several times per combination, and reduces what comes back
//! into two families of tables:
//! - Growth: per-tick growth rate of every run plus the per-combination mean
//! - Lorenz: binned final wealth and cumulative Lorenz curves per combination
//!
//! Each family has a raw table (one row per run) and a canonical view (one
//! row per combination).
//!
//! The simulation itself sits behind the [`engine::SimulationEngine`] trait.
//! Combinations run in parallel, each in its own engine session, and a
//! failing combination is logged and skipped without stopping the sweep.
//!
//! ```ignore
//! use prodsweep_core::config::SweepConfig;
//! use prodsweep_core::engine::toy::ToyEconomy;
//! use prodsweep_core::output::{OutputLayout, write_report};
//! use prodsweep_core::pipeline::run_sweep;
//!
//! let config = SweepConfig::load(Path::new("sweep.yaml"))?;
//! let engine = ToyEconomy::new(42, config.reporters.clone());
//! let report = run_sweep(&engine, &config, None)?;
//! write_report(&report, &config, &OutputLayout::new(Path::new("out"), &config.output_stem))?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Sweep stages
// ============================================================================

pub mod dispatch;
pub mod executor;
pub mod pipeline;
pub mod reduce;
pub mod space;

// ============================================================================
// Engines, configuration and data types
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod model;

// ============================================================================
// Persistence
// ============================================================================

pub mod output;
pub mod table;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::{DegeneratePolicy, SweepConfig};
pub use dispatch::SweepProgress;
pub use error::{Result, SweepError};
pub use pipeline::{SweepReport, run_sweep};
