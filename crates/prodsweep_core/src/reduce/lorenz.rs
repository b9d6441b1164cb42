//! Lorenz-curve reduction of final wealth.
//!
//! Bins are fixed per combination: the finite wealth of every agent in every
//! run of a combination is pooled, and `[min, max]` of that pool is split into
//! `K` equal-width bins. Each run is histogrammed against those bins, the
//! histograms are averaged across runs, and two cumulative curves are built
//! from the average:
//!
//! - `Bin_i`: cumulative share of agents in bins `1..=i`
//! - `Mid_i`: cumulative share of wealth in bins `1..=i`, approximating each
//!   agent's wealth by its bin midpoint
//!
//! Both curves end at exactly 100.

use std::collections::BTreeMap;

use crate::config::DegeneratePolicy;
use crate::error::ReductionError;
use crate::model::{ComboId, ParameterBinding, WealthSample};
use crate::table::{Cell, Table};

use super::{
    bin_column, count_column, identity_cells, identity_header, mid_column, midpoint_column,
};

/// Fixed bins and averaged curves of one combination
#[derive(Debug, Clone, PartialEq)]
pub struct LorenzBins {
    pub combo: ComboId,
    pub min: f64,
    pub max: f64,
    /// `K + 1` edges; the last one is exactly `max`
    pub edges: Vec<f64>,
    pub midpoints: Vec<f64>,
    pub mean_counts: Vec<f64>,
    /// `Bin_i`, percent of agents
    pub cumulative_population: Vec<f64>,
    /// `Mid_i`, percent of midpoint-weighted wealth
    pub cumulative_wealth: Vec<f64>,
}

/// Histogram of one run
#[derive(Debug, Clone, PartialEq)]
pub struct LorenzRow {
    pub combo: ComboId,
    pub run: u32,
    pub identity: Vec<ParameterBinding>,
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LorenzTable {
    pub bins: usize,
    pub identity_columns: Vec<String>,
    /// Ordered by combination
    pub combos: Vec<LorenzBins>,
    /// Grouped by combination, runs in input order
    pub rows: Vec<LorenzRow>,
    /// Combinations dropped under [`DegeneratePolicy::Exclude`]
    pub excluded: Vec<ComboId>,
}

/// Bin of `value` among `k` bins of `width` starting at `min`, clipped to
/// `0..k`. Values at or above the top edge land in the last bin.
#[must_use]
pub fn bin_index(value: f64, min: f64, width: f64, k: usize) -> usize {
    let raw = ((value - min) / width).floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(k - 1)
    }
}

/// Reduce final wealth samples to per-run histograms and per-combination
/// Lorenz curves.
///
/// A combination is degenerate when its pool has no finite value, when all
/// values are equal, when an occupied bin has a negative midpoint, or when its
/// midpoint-weighted total is zero. A negative bin would make `Mid_i`
/// overshoot 100 and fall back.
/// `policy` decides whether that fails the reduction or only drops the
/// combination.
pub fn reduce_lorenz(
    samples: &[WealthSample],
    identity_columns: &[String],
    bins: usize,
    policy: DegeneratePolicy,
) -> Result<LorenzTable, ReductionError> {
    let bins = bins.max(1);
    let mut groups: BTreeMap<ComboId, Vec<&WealthSample>> = BTreeMap::new();
    for sample in samples {
        groups.entry(sample.combo).or_default().push(sample);
    }

    let mut table = LorenzTable {
        bins,
        identity_columns: identity_columns.to_vec(),
        combos: Vec::with_capacity(groups.len()),
        rows: Vec::with_capacity(samples.len()),
        excluded: Vec::new(),
    };

    for (combo, runs) in groups {
        match reduce_combination(combo, &runs, bins) {
            Ok((curves, rows)) => {
                table.combos.push(curves);
                table.rows.extend(rows);
            }
            Err(e @ ReductionError::DegenerateDistribution { .. })
                if policy == DegeneratePolicy::Exclude =>
            {
                tracing::warn!(combo = combo.0, "Excluding combination from Lorenz table: {e}");
                table.excluded.push(combo);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(table)
}

fn reduce_combination(
    combo: ComboId,
    runs: &[&WealthSample],
    bins: usize,
) -> Result<(LorenzBins, Vec<LorenzRow>), ReductionError> {
    let identity = &runs[0].identity;
    if runs.iter().any(|s| &s.identity != identity) {
        return Err(ReductionError::IdentityMismatch { combo });
    }

    let degenerate = |reason| ReductionError::DegenerateDistribution { combo, reason };

    let (min, max) = runs
        .iter()
        .flat_map(|s| s.values())
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .ok_or_else(|| degenerate("no finite wealth values"))?;
    if min == max {
        return Err(degenerate("every agent holds the same wealth"));
    }

    let width = (max - min) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| min + i as f64 * width).collect();
    edges.push(max);
    let midpoints: Vec<f64> = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();

    let rows: Vec<LorenzRow> = runs
        .iter()
        .map(|sample| {
            let mut counts = vec![0u64; bins];
            for v in sample.values().filter(|v| v.is_finite()) {
                counts[bin_index(v, min, width, bins)] += 1;
            }
            LorenzRow {
                combo,
                run: sample.run,
                identity: sample.identity.clone(),
                counts,
            }
        })
        .collect();

    let n = rows.len() as f64;
    let mean_counts: Vec<f64> = (0..bins)
        .map(|i| rows.iter().map(|r| r.counts[i] as f64).sum::<f64>() / n)
        .collect();

    if mean_counts.iter().zip(&midpoints).any(|(&c, &m)| c > 0.0 && m < 0.0) {
        return Err(degenerate("negative wealth"));
    }

    let cumulative_population = cumulative_percent(mean_counts.iter().copied())
        .ok_or_else(|| degenerate("no agents counted"))?;
    let cumulative_wealth =
        cumulative_percent(mean_counts.iter().zip(&midpoints).map(|(c, m)| c * m))
            .ok_or_else(|| degenerate("total midpoint-weighted wealth is zero"))?;

    Ok((
        LorenzBins {
            combo,
            min,
            max,
            edges,
            midpoints,
            mean_counts,
            cumulative_population,
            cumulative_wealth,
        },
        rows,
    ))
}

/// Running sum scaled so the last element is 100. `None` if the total is zero
/// or not finite.
fn cumulative_percent(values: impl Iterator<Item = f64>) -> Option<Vec<f64>> {
    let running: Vec<f64> = values
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect();
    let total = *running.last()?;
    if total == 0.0 || !total.is_finite() {
        return None;
    }
    Some(running.into_iter().map(|s| s / total * 100.0).collect())
}

impl LorenzTable {
    #[must_use]
    pub fn bins_for(&self, combo: ComboId) -> Option<&LorenzBins> {
        self.combos
            .binary_search_by_key(&combo, |b| b.combo)
            .ok()
            .map(|i| &self.combos[i])
    }

    /// Flatten to `Combo, Run, <params>, Count_*, Midpoint_*, Bin_*, Mid_*`
    #[must_use]
    pub fn to_table(&self) -> Table {
        let k = self.bins;
        let mut columns = identity_header(&self.identity_columns);
        columns.extend((1..=k).map(count_column));
        columns.extend((1..=k).map(midpoint_column));
        columns.extend((1..=k).map(bin_column));
        columns.extend((1..=k).map(mid_column));

        let mut table = Table::new(columns);
        for row in &self.rows {
            let Some(curves) = self.bins_for(row.combo) else {
                continue;
            };
            let mut cells = Vec::with_capacity(table.columns().len());
            cells.push(Cell::Int(i64::from(row.combo.0)));
            cells.push(Cell::Int(i64::from(row.run)));
            cells.extend(identity_cells(&self.identity_columns, &row.identity));
            cells.extend(row.counts.iter().map(|&c| Cell::Int(c as i64)));
            cells.extend(curves.midpoints.iter().map(|&v| Cell::Float(v)));
            cells.extend(curves.cumulative_population.iter().map(|&v| Cell::Float(v)));
            cells.extend(curves.cumulative_wealth.iter().map(|&v| Cell::Float(v)));
            table.push_row(cells);
        }
        table
    }
}

/// Final wealth of every agent, one row per run.
///
/// The header is the union of every sample's `{role}_{j}_wealth` columns in
/// first-seen order; runs with fewer agents leave the extra cells empty.
#[must_use]
pub fn raw_wealth_table(samples: &[WealthSample], identity_columns: &[String]) -> Table {
    let mut wealth_columns: Vec<String> = Vec::new();
    for sample in samples {
        for name in sample.column_names() {
            if !wealth_columns.contains(&name) {
                wealth_columns.push(name);
            }
        }
    }

    let mut columns = identity_header(identity_columns);
    let offset = columns.len();
    columns.extend(wealth_columns.iter().cloned());

    let mut table = Table::new(columns);
    for sample in samples {
        let mut cells = vec![Cell::Empty; offset + wealth_columns.len()];
        cells[0] = Cell::Int(i64::from(sample.combo.0));
        cells[1] = Cell::Int(i64::from(sample.run));
        for (i, cell) in identity_cells(identity_columns, &sample.identity)
            .into_iter()
            .enumerate()
        {
            cells[2 + i] = cell;
        }
        for (name, value) in sample.column_names().zip(sample.values()) {
            if let Some(j) = wealth_columns.iter().position(|c| *c == name) {
                cells[offset + j] = Cell::Float(value);
            }
        }
        table.push_row(cells);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleWealth;

    fn sample(combo: u32, run: u32, workers: Vec<f64>, owners: Vec<f64>) -> WealthSample {
        WealthSample {
            combo: ComboId(combo),
            run,
            identity: Vec::new(),
            roles: vec![
                RoleWealth {
                    role: "worker".to_string(),
                    values: workers,
                },
                RoleWealth {
                    role: "owner".to_string(),
                    values: owners,
                },
            ],
        }
    }

    #[test]
    fn test_bin_index_clips() {
        assert_eq!(bin_index(0.0, 0.0, 1.0, 4), 0);
        assert_eq!(bin_index(-3.0, 0.0, 1.0, 4), 0);
        assert_eq!(bin_index(2.5, 0.0, 1.0, 4), 2);
        assert_eq!(bin_index(4.0, 0.0, 1.0, 4), 3);
        assert_eq!(bin_index(9.0, 0.0, 1.0, 4), 3);
    }

    #[test]
    fn test_histograms_and_curves() {
        // Pool is [0, 10] with 2 bins of width 5 and midpoints 2.5 and 7.5
        let samples = vec![
            sample(0, 1, vec![0.0, 1.0, 2.0], vec![10.0]),
            sample(0, 2, vec![1.0, 6.0, 7.0], vec![9.0]),
        ];
        let table = reduce_lorenz(&samples, &[], 2, DegeneratePolicy::Reject).unwrap();

        assert_eq!(table.rows[0].counts, vec![3, 1]);
        assert_eq!(table.rows[1].counts, vec![1, 3]);

        let curves = table.bins_for(ComboId(0)).unwrap();
        assert_eq!(curves.edges, vec![0.0, 5.0, 10.0]);
        assert_eq!(curves.midpoints, vec![2.5, 7.5]);
        assert_eq!(curves.mean_counts, vec![2.0, 2.0]);
        assert_eq!(curves.cumulative_population, vec![50.0, 100.0]);
        // 2 * 2.5 = 5 of a total 5 + 15 = 20
        assert_eq!(curves.cumulative_wealth, vec![25.0, 100.0]);
    }

    #[test]
    fn test_curves_monotone_and_end_at_100() {
        let samples: Vec<WealthSample> = (1..=4)
            .map(|run| {
                let workers = (0..25).map(|j| f64::from(j * run) * 0.37).collect();
                sample(2, run as u32, workers, vec![40.0 + f64::from(run)])
            })
            .collect();
        let table = reduce_lorenz(&samples, &[], 10, DegeneratePolicy::Reject).unwrap();
        let curves = table.bins_for(ComboId(2)).unwrap();

        for series in [&curves.cumulative_population, &curves.cumulative_wealth] {
            assert_eq!(series.len(), 10);
            assert!(series.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(series[9], 100.0);
        }
        assert_eq!(curves.edges[10], curves.max);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let samples = vec![sample(0, 1, vec![0.0, f64::NAN, 4.0], vec![f64::INFINITY])];
        let table = reduce_lorenz(&samples, &[], 2, DegeneratePolicy::Reject).unwrap();
        assert_eq!(table.rows[0].counts, vec![1, 1]);
    }

    #[test]
    fn test_degenerate_reject_and_exclude() {
        let samples = vec![
            sample(0, 1, vec![5.0, 5.0], vec![5.0]),
            sample(1, 1, vec![1.0, 3.0], vec![9.0]),
        ];

        assert!(matches!(
            reduce_lorenz(&samples, &[], 4, DegeneratePolicy::Reject),
            Err(ReductionError::DegenerateDistribution {
                combo: ComboId(0),
                ..
            })
        ));

        let table = reduce_lorenz(&samples, &[], 4, DegeneratePolicy::Exclude).unwrap();
        assert_eq!(table.excluded, vec![ComboId(0)]);
        assert_eq!(table.combos.len(), 1);
        assert!(table.rows.iter().all(|r| r.combo == ComboId(1)));
    }

    #[test]
    fn test_empty_pool_and_zero_weighted_total_are_degenerate() {
        let empty = vec![sample(0, 1, Vec::new(), Vec::new())];
        assert!(matches!(
            reduce_lorenz(&empty, &[], 3, DegeneratePolicy::Reject),
            Err(ReductionError::DegenerateDistribution { .. })
        ));

        // Pool [-1, 1] in one bin: midpoint 0 weights everything to zero
        let symmetric = vec![sample(0, 1, vec![-1.0, 1.0], Vec::new())];
        assert!(matches!(
            reduce_lorenz(&symmetric, &[], 1, DegeneratePolicy::Reject),
            Err(ReductionError::DegenerateDistribution { .. })
        ));
    }

    #[test]
    fn test_negative_wealth_is_degenerate() {
        // Pool [-40, 50] in 4 bins: the first bin (midpoint -28.75) holds 3 agents
        let samples = vec![
            sample(0, 1, vec![-40.0, -30.0, -20.0, 50.0], Vec::new()),
            sample(1, 1, vec![1.0, 3.0], vec![9.0]),
        ];

        assert!(matches!(
            reduce_lorenz(&samples, &[], 4, DegeneratePolicy::Reject),
            Err(ReductionError::DegenerateDistribution {
                combo: ComboId(0),
                reason: "negative wealth"
            })
        ));

        let table = reduce_lorenz(&samples, &[], 4, DegeneratePolicy::Exclude).unwrap();
        assert_eq!(table.excluded, vec![ComboId(0)]);
        assert!(table.bins_for(ComboId(0)).is_none());
    }

    #[test]
    fn test_mixed_sign_pool_with_positive_midpoints() {
        // Pool [-1, 100] in 2 bins: midpoints 24.25 and 74.75
        let samples = vec![sample(0, 1, vec![-1.0, 10.0, 20.0], vec![100.0])];
        let table = reduce_lorenz(&samples, &[], 2, DegeneratePolicy::Reject).unwrap();
        let curves = table.bins_for(ComboId(0)).unwrap();

        assert_eq!(table.rows[0].counts, vec![3, 1]);
        assert!(curves.cumulative_wealth.windows(2).all(|w| w[0] <= w[1]));
        assert!(curves.cumulative_wealth.iter().all(|&v| v <= 100.0));
        assert_eq!(curves.cumulative_wealth[1], 100.0);
    }

    #[test]
    fn test_table_layout_is_one_based() {
        let samples = vec![sample(0, 1, vec![0.0, 1.0], vec![2.0])];
        let table = reduce_lorenz(&samples, &[], 2, DegeneratePolicy::Reject)
            .unwrap()
            .to_table();
        let columns = table.columns();
        assert_eq!(&columns[..2], ["Combo", "Run"]);
        assert_eq!(
            &columns[2..],
            [
                "Count_1",
                "Count_2",
                "Midpoint_1",
                "Midpoint_2",
                "Bin_1",
                "Bin_2",
                "Mid_1",
                "Mid_2"
            ]
        );
        assert_eq!(table.get(0, "Bin_2"), Some(&Cell::Float(100.0)));
    }

    #[test]
    fn test_raw_wealth_union_header() {
        let samples = vec![
            sample(0, 1, vec![1.0], vec![2.0]),
            sample(1, 1, vec![1.0, 3.0], vec![2.0]),
        ];
        let table = raw_wealth_table(&samples, &[]);
        assert_eq!(
            table.columns(),
            ["Combo", "Run", "worker_0_wealth", "owner_0_wealth", "worker_1_wealth"]
        );
        assert_eq!(table.get(0, "worker_1_wealth"), Some(&Cell::Empty));
        assert_eq!(table.get(1, "worker_1_wealth"), Some(&Cell::Float(3.0)));
    }
}
