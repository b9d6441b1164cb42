//! Growth-rate reduction.
//!
//! Every run keeps its own `Growth-rate_t` series. The per-tick mean over all
//! runs of the same combination is merged back onto each of those rows as
//! `Avg-growth-rate_t`.

use rustc_hash::FxHashMap;

use crate::error::ReductionError;
use crate::model::{ComboId, GrowthRecord, ParameterBinding};
use crate::table::{Cell, Table};

use super::{avg_growth_column, growth_column, identity_cells, identity_header};

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRow {
    pub combo: ComboId,
    pub run: u32,
    pub identity: Vec<ParameterBinding>,
    pub growth: Vec<f64>,
    /// Mean of `growth` across every run of `combo`, tick by tick
    pub avg_growth: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthTable {
    pub tick_count: usize,
    pub identity_columns: Vec<String>,
    pub rows: Vec<GrowthRow>,
}

struct Accumulator<'a> {
    identity: &'a [ParameterBinding],
    sums: Vec<f64>,
    runs: usize,
}

/// Attach per-combination mean growth to every run.
///
/// Every record must hold exactly `tick_count` finite samples; the first
/// one that doesn't aborts the reduction with
/// [`ReductionError::MissingTickData`] naming the first bad tick. Rows keep
/// the order of `records`.
pub fn reduce_growth(
    records: &[GrowthRecord],
    identity_columns: &[String],
    tick_count: usize,
) -> Result<GrowthTable, ReductionError> {
    let mut groups: FxHashMap<ComboId, Accumulator<'_>> = FxHashMap::default();

    for record in records {
        if let Some(tick) = first_bad_tick(&record.growth, tick_count) {
            return Err(ReductionError::MissingTickData {
                combo: record.combo,
                run: record.run,
                tick: tick as u64,
            });
        }

        let acc = groups.entry(record.combo).or_insert_with(|| Accumulator {
            identity: &record.identity,
            sums: vec![0.0; tick_count],
            runs: 0,
        });
        if acc.identity != record.identity.as_slice() {
            return Err(ReductionError::IdentityMismatch {
                combo: record.combo,
            });
        }
        for (sum, value) in acc.sums.iter_mut().zip(&record.growth) {
            *sum += value;
        }
        acc.runs += 1;
    }

    let means: FxHashMap<ComboId, Vec<f64>> = groups
        .into_iter()
        .map(|(combo, acc)| {
            let n = acc.runs as f64;
            (combo, acc.sums.into_iter().map(|s| s / n).collect())
        })
        .collect();

    let rows = records
        .iter()
        .map(|record| GrowthRow {
            combo: record.combo,
            run: record.run,
            identity: record.identity.clone(),
            growth: record.growth.clone(),
            avg_growth: means[&record.combo].clone(),
        })
        .collect();

    Ok(GrowthTable {
        tick_count,
        identity_columns: identity_columns.to_vec(),
        rows,
    })
}

fn first_bad_tick(growth: &[f64], tick_count: usize) -> Option<usize> {
    if let Some(i) = growth.iter().take(tick_count).position(|v| !v.is_finite()) {
        return Some(i);
    }
    (growth.len() != tick_count).then(|| growth.len().min(tick_count))
}

impl GrowthTable {
    /// Mean series of one combination, if it has any rows
    #[must_use]
    pub fn average_for(&self, combo: ComboId) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|r| r.combo == combo)
            .map(|r| r.avg_growth.as_slice())
    }

    /// Flatten to `Combo, Run, <params>, Growth-rate_*, Avg-growth-rate_*`
    #[must_use]
    pub fn to_table(&self) -> Table {
        let mut columns = identity_header(&self.identity_columns);
        columns.extend((0..self.tick_count).map(growth_column));
        columns.extend((0..self.tick_count).map(avg_growth_column));

        let mut table = Table::new(columns);
        for row in &self.rows {
            let mut cells = Vec::with_capacity(table.columns().len());
            cells.push(Cell::Int(i64::from(row.combo.0)));
            cells.push(Cell::Int(i64::from(row.run)));
            cells.extend(identity_cells(&self.identity_columns, &row.identity));
            cells.extend(row.growth.iter().map(|&v| Cell::Float(v)));
            cells.extend(row.avg_growth.iter().map(|&v| Cell::Float(v)));
            table.push_row(cells);
        }
        table
    }
}
