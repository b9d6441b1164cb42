//! Raw per-run records produced by the sweep executor

use crate::error::CombinationFailure;

use super::{ComboId, ParameterBinding};

/// One run's growth-rate time series, indexed by tick `0..=max_ticks`
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRecord {
    pub combo: ComboId,
    /// 1-based run number within the combination
    pub run: u32,
    pub identity: Vec<ParameterBinding>,
    pub growth: Vec<f64>,
}

/// Final wealth of every agent of one role
#[derive(Debug, Clone, PartialEq)]
pub struct RoleWealth {
    pub role: String,
    pub values: Vec<f64>,
}

/// One run's final wealth cross-section
#[derive(Debug, Clone, PartialEq)]
pub struct WealthSample {
    pub combo: ComboId,
    pub run: u32,
    pub identity: Vec<ParameterBinding>,
    pub roles: Vec<RoleWealth>,
}

impl WealthSample {
    /// All agent wealth values in column order (role by role)
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.roles.iter().flat_map(|r| r.values.iter().copied())
    }

    /// Column names matching [`WealthSample::values`], e.g. `worker_0_wealth`
    pub fn column_names(&self) -> impl Iterator<Item = String> + '_ {
        self.roles.iter().flat_map(|r| {
            (0..r.values.len()).map(move |j| format!("{}_{}_wealth", r.role, j))
        })
    }
}

/// What one combination produced
#[derive(Debug, Clone)]
pub enum CombinationOutcome {
    Completed {
        growth: Vec<GrowthRecord>,
        wealth: Vec<WealthSample>,
    },
    Failed(CombinationFailure),
}

impl CombinationOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, CombinationOutcome::Failed(_))
    }
}
