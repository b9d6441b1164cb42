//! Reductions from raw per-run records to the persisted tables.
//!
//! - [`growth`]: per-tick mean growth rate of each combination
//! - [`lorenz`]: binned wealth distributions and cumulative Lorenz curves
//! - [`canonical`]: one-row-per-combination views of either table
//!
//! Column names are shared by the reducers, the canonical views and readers
//! of persisted tables, so they are built only through the helpers below.

pub mod canonical;
pub mod growth;
pub mod lorenz;

use crate::model::ParameterBinding;
use crate::table::Cell;

pub use canonical::{TableKind, canonical_view};
pub use growth::{GrowthRow, GrowthTable, reduce_growth};
pub use lorenz::{LorenzBins, LorenzRow, LorenzTable, raw_wealth_table, reduce_lorenz};

pub const COMBO_COLUMN: &str = "Combo";
pub const RUN_COLUMN: &str = "Run";

pub const GROWTH_PREFIX: &str = "Growth-rate_";
pub const AVG_GROWTH_PREFIX: &str = "Avg-growth-rate_";
pub const COUNT_PREFIX: &str = "Count_";
pub const MIDPOINT_PREFIX: &str = "Midpoint_";
pub const BIN_PREFIX: &str = "Bin_";
pub const MID_PREFIX: &str = "Mid_";

#[must_use]
pub fn growth_column(tick: usize) -> String {
    format!("{GROWTH_PREFIX}{tick}")
}

#[must_use]
pub fn avg_growth_column(tick: usize) -> String {
    format!("{AVG_GROWTH_PREFIX}{tick}")
}

/// Bin columns are 1-based: `Count_1..Count_K`
#[must_use]
pub fn count_column(bin: usize) -> String {
    format!("{COUNT_PREFIX}{bin}")
}

#[must_use]
pub fn midpoint_column(bin: usize) -> String {
    format!("{MIDPOINT_PREFIX}{bin}")
}

#[must_use]
pub fn bin_column(bin: usize) -> String {
    format!("{BIN_PREFIX}{bin}")
}

#[must_use]
pub fn mid_column(bin: usize) -> String {
    format!("{MID_PREFIX}{bin}")
}

/// Leading `Combo`, `Run` and parameter columns of every reduced table
fn identity_header(identity_columns: &[String]) -> Vec<String> {
    let mut header = Vec::with_capacity(identity_columns.len() + 2);
    header.push(COMBO_COLUMN.to_string());
    header.push(RUN_COLUMN.to_string());
    header.extend(identity_columns.iter().cloned());
    header
}

/// Cells for the parameter columns, in header order.
///
/// A binding missing from `identity` leaves its cell empty.
fn identity_cells(identity_columns: &[String], identity: &[ParameterBinding]) -> Vec<Cell> {
    identity_columns
        .iter()
        .map(|column| {
            identity
                .iter()
                .find(|b| &b.column == column)
                .map_or(Cell::Empty, |b| Cell::from(&b.value))
        })
        .collect()
}
