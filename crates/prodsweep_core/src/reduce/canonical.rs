//! Canonical ("clean") views: one row per combination.

use rustc_hash::FxHashSet;

use crate::error::ReductionError;
use crate::table::Table;

use super::{AVG_GROWTH_PREFIX, BIN_PREFIX, MID_PREFIX};

/// Which derived columns a canonical view keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// `Avg-growth-rate_*`
    Growth,
    /// `Bin_*` then `Mid_*`
    Lorenz,
}

impl TableKind {
    fn prefixes(self) -> &'static [&'static str] {
        match self {
            TableKind::Growth => &[AVG_GROWTH_PREFIX],
            TableKind::Lorenz => &[BIN_PREFIX, MID_PREFIX],
        }
    }
}

/// Deduplicate `table` on the `identity` columns, keeping the first row of
/// each key, and project it to `identity` plus the derived columns of `kind`.
///
/// Applying the view to its own output returns the same table.
pub fn canonical_view(
    table: &Table,
    kind: TableKind,
    identity: &[String],
) -> Result<Table, ReductionError> {
    let mut selected = Vec::with_capacity(identity.len());
    for name in identity {
        let idx = table
            .column_index(name)
            .ok_or_else(|| ReductionError::MissingColumn(name.clone()))?;
        selected.push(idx);
    }
    let key_len = selected.len();

    for prefix in kind.prefixes() {
        let before = selected.len();
        selected.extend(
            table
                .columns()
                .iter()
                .enumerate()
                .filter(|(_, c)| is_derived(c, prefix))
                .map(|(i, _)| i),
        );
        if selected.len() == before {
            return Err(ReductionError::MissingColumn(format!("{prefix}*")));
        }
    }

    let mut view = Table::new(selected.iter().map(|&i| table.columns()[i].clone()).collect());
    let mut seen = FxHashSet::default();
    for row in table.rows() {
        let key: Vec<String> = selected[..key_len]
            .iter()
            .map(|&i| row[i].to_string())
            .collect();
        if seen.insert(key) {
            view.push_row(selected.iter().map(|&i| row[i].clone()).collect());
        }
    }
    Ok(view)
}

/// `prefix` followed by a tick or bin number, so `Mid_` never matches
/// `Midpoint_3`
fn is_derived(column: &str, prefix: &str) -> bool {
    column
        .strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn identity() -> Vec<String> {
        vec!["Combo".to_string(), "Workers".to_string()]
    }

    fn lorenz_like() -> Table {
        let mut table = Table::new(
            [
                "Combo",
                "Run",
                "Workers",
                "Count_1",
                "Midpoint_1",
                "Bin_1",
                "Mid_1",
            ]
            .map(String::from)
            .to_vec(),
        );
        for (combo, run, count) in [(0, 1, 4), (0, 2, 6), (1, 1, 3)] {
            table.push_row(vec![
                Cell::Int(combo),
                Cell::Int(run),
                Cell::Int(5 * (combo + 1)),
                Cell::Int(count),
                Cell::Float(0.5),
                Cell::Float(100.0),
                Cell::Float(100.0),
            ]);
        }
        table
    }

    #[test]
    fn test_one_row_per_combo_with_derived_columns() {
        let view = canonical_view(&lorenz_like(), TableKind::Lorenz, &identity()).unwrap();
        assert_eq!(view.columns(), ["Combo", "Workers", "Bin_1", "Mid_1"]);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(1, "Workers"), Some(&Cell::Int(10)));
    }

    #[test]
    fn test_idempotent() {
        let once = canonical_view(&lorenz_like(), TableKind::Lorenz, &identity()).unwrap();
        let twice = canonical_view(&once, TableKind::Lorenz, &identity()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_columns() {
        let missing_identity = vec!["Combo".to_string(), "Owners".to_string()];
        assert_eq!(
            canonical_view(&lorenz_like(), TableKind::Lorenz, &missing_identity),
            Err(ReductionError::MissingColumn("Owners".to_string()))
        );
        assert_eq!(
            canonical_view(&lorenz_like(), TableKind::Growth, &identity()),
            Err(ReductionError::MissingColumn("Avg-growth-rate_*".to_string()))
        );
    }

    #[test]
    fn test_derived_column_matching() {
        assert!(is_derived("Mid_10", "Mid_"));
        assert!(!is_derived("Midpoint_1", "Mid_"));
        assert!(!is_derived("Mid_", "Mid_"));
        assert!(is_derived("Avg-growth-rate_0", "Avg-growth-rate_"));
    }
}
