//! Sweep configuration
//!
//! `SweepConfig` is the single value every stage of a sweep reads from. It is
//! loaded from YAML and passed down explicitly; nothing here is global.
//!
//! ```yaml
//! model: production.nlogo
//! runs: 10
//! max_ticks: 100
//! parallel_jobs: 4
//! lorenz_bins: 10
//! output_stem: production
//! factors:
//!   - name: num-workers
//!     column: Workers
//!     values: [50, 100]
//! linked:
//!   - parameters:
//!       - { name: percent-capital, column: Capital_perc }
//!       - { name: percent-wages, column: Wages_perc }
//!     values: [[40, 60], [60, 40]]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::ParamValue;
use crate::space::ParameterSpace;

/// Largest accepted `max_ticks`
pub const MAX_TICKS: u64 = 10_000_000;

fn default_runs() -> u32 {
    10
}

fn default_max_ticks() -> u64 {
    100
}

fn default_parallel_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_lorenz_bins() -> usize {
    10
}

fn default_output_stem() -> String {
    "production".to_string()
}

/// One independently swept parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorConfig {
    /// Engine-side parameter name
    pub name: String,
    /// Output column name; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Candidate values, swept in order
    pub values: Vec<ParamValue>,
}

impl FactorConfig {
    pub fn new(name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        Self {
            name: name.into(),
            column: None,
            values,
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// A parameter taking part in a linked group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Parameters swept jointly: each tuple in `values` sets all of them at once.
///
/// Used for shares that must stay consistent with each other, such as the
/// capital / wage / owner-income split of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedFactorConfig {
    pub parameters: Vec<LinkedParameter>,
    pub values: Vec<Vec<ParamValue>>,
}

/// Maps an agent role to the engine collection reporting its wealth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleReporter {
    pub role: String,
    pub reporter: String,
}

/// Names of the commands and reporters the executor uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    #[serde(default = "ReporterConfig::default_tick")]
    pub tick: String,
    #[serde(default = "ReporterConfig::default_growth")]
    pub growth: String,
    #[serde(default = "ReporterConfig::default_setup")]
    pub setup_command: String,
    #[serde(default = "ReporterConfig::default_step")]
    pub step_command: String,
    #[serde(default = "ReporterConfig::default_roles")]
    pub roles: Vec<RoleReporter>,
}

impl ReporterConfig {
    fn default_tick() -> String {
        "ticks".to_string()
    }

    fn default_growth() -> String {
        "pt-growth-rate".to_string()
    }

    fn default_setup() -> String {
        "setup".to_string()
    }

    fn default_step() -> String {
        "go".to_string()
    }

    fn default_roles() -> Vec<RoleReporter> {
        vec![
            RoleReporter {
                role: "worker".to_string(),
                reporter: "[wealth] of workers".to_string(),
            },
            RoleReporter {
                role: "owner".to_string(),
                reporter: "[wealth] of owners".to_string(),
            },
        ]
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            tick: Self::default_tick(),
            growth: Self::default_growth(),
            setup_command: Self::default_setup(),
            step_command: Self::default_step(),
            roles: Self::default_roles(),
        }
    }
}

/// What the Lorenz reducer does with a combination whose wealth pool has no range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Stop the Lorenz reduction and report the combination
    #[default]
    Reject,
    /// Drop the combination from the Lorenz table and keep going
    Exclude,
}

/// Complete sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Model reference handed to `open_session`
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub factors: Vec<FactorConfig>,
    #[serde(default)]
    pub linked: Vec<LinkedFactorConfig>,
    /// Repetitions per combination
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Last tick sampled; growth is recorded for ticks `0..=max_ticks`
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    /// Worker count of the dispatch pool
    #[serde(default = "default_parallel_jobs")]
    pub parallel_jobs: usize,
    #[serde(default = "default_lorenz_bins")]
    pub lorenz_bins: usize,
    #[serde(default = "default_output_stem")]
    pub output_stem: String,
    #[serde(default)]
    pub degenerate: DegeneratePolicy,
    #[serde(default)]
    pub reporters: ReporterConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            factors: Vec::new(),
            linked: Vec::new(),
            runs: default_runs(),
            max_ticks: default_max_ticks(),
            parallel_jobs: default_parallel_jobs(),
            lorenz_bins: default_lorenz_bins(),
            output_stem: default_output_stem(),
            degenerate: DegeneratePolicy::default(),
            reporters: ReporterConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of growth samples per run (`max_ticks + 1`)
    #[must_use]
    pub fn tick_count(&self) -> usize {
        usize::try_from(self.max_ticks).map_or(usize::MAX, |t| t.saturating_add(1))
    }

    /// Check numeric ranges and that the parameter space can be built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runs < 1 {
            return Err(ConfigError::OutOfRange {
                field: "runs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_ticks > MAX_TICKS {
            return Err(ConfigError::OutOfRange {
                field: "max_ticks",
                reason: format!("must be at most {MAX_TICKS}"),
            });
        }
        if self.parallel_jobs < 1 {
            return Err(ConfigError::OutOfRange {
                field: "parallel_jobs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.lorenz_bins < 1 {
            return Err(ConfigError::OutOfRange {
                field: "lorenz_bins",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.output_stem.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "output_stem",
                reason: "must not be empty".to_string(),
            });
        }
        self.parameter_space().map(|_| ())
    }

    /// Enumerate the configured factors
    pub fn parameter_space(&self) -> Result<ParameterSpace, ConfigError> {
        ParameterSpace::new(&self.factors, &self.linked)
    }
}
