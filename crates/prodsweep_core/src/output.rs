//! On-disk layout of a sweep's results.
//!
//! ```text
//! <out_dir>/<stem>_<YYYY-MM-DD>/
//!     G_RAW_<HH-MM-SS>.csv
//!     L_RAW_<HH-MM-SS>.csv
//!     W_RAW_<HH-MM-SS>.csv
//!     G_CLEAN_<HH-MM-SS>.csv
//!     L_CLEAN_<HH-MM-SS>.csv
//!     sweep_<HH-MM-SS>.yaml
//! ```
//!
//! Several sweeps on the same day share a directory and are told apart by
//! the time suffix.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use jiff::Zoned;
use serde::{Deserialize, Serialize};

use crate::config::SweepConfig;
use crate::error::{Result, SweepError};
use crate::model::ParameterBinding;
use crate::pipeline::SweepReport;
use crate::table::csv::{read_table_with, write_table};
use crate::table::{ColumnSpec, Table};

/// Write `content` to a sibling temp file, then rename it over `path`
pub fn atomic_write(path: &Path, content: impl AsRef<[u8]>) -> io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp_path = PathBuf::from(temp);

    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// The persisted tables of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    GrowthRaw,
    LorenzRaw,
    WealthRaw,
    GrowthClean,
    LorenzClean,
}

impl Artifact {
    pub const ALL: [Artifact; 5] = [
        Artifact::GrowthRaw,
        Artifact::LorenzRaw,
        Artifact::WealthRaw,
        Artifact::GrowthClean,
        Artifact::LorenzClean,
    ];

    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Artifact::GrowthRaw => "G_RAW",
            Artifact::LorenzRaw => "L_RAW",
            Artifact::WealthRaw => "W_RAW",
            Artifact::GrowthClean => "G_CLEAN",
            Artifact::LorenzClean => "L_CLEAN",
        }
    }
}

/// Where one sweep's files go
#[derive(Debug, Clone)]
pub struct OutputLayout {
    dir: PathBuf,
    time_tag: String,
    created: String,
}

impl OutputLayout {
    /// Layout stamped with the current local time
    pub fn new(out_dir: &Path, stem: &str) -> Self {
        Self::at(out_dir, stem, &Zoned::now())
    }

    pub fn at(out_dir: &Path, stem: &str, now: &Zoned) -> Self {
        let day = now.strftime("%Y-%m-%d").to_string();
        Self {
            dir: out_dir.join(format!("{stem}_{day}")),
            time_tag: now.strftime("%H-%M-%S").to_string(),
            created: now.to_string(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn table_path(&self, artifact: Artifact) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", artifact.prefix(), self.time_tag))
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("sweep_{}.yaml", self.time_tag))
    }
}

/// A combination that produced no data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCombination {
    pub combo: u32,
    pub parameters: Vec<ParameterBinding>,
    pub error: String,
}

/// One persisted table and the column types it was written with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFile {
    /// File name inside the sweep directory
    pub file: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableFile {
    /// Load the table from `dir` with its recorded column types
    pub fn read(&self, dir: &Path) -> Result<Table> {
        Ok(read_table_with(&dir.join(&self.file), &self.columns)?)
    }
}

/// Summary written next to the tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created: String,
    pub config: SweepConfig,
    pub combinations: usize,
    pub completed: usize,
    pub failed: Vec<FailedCombination>,
    /// Combinations dropped from the Lorenz tables as degenerate
    pub lorenz_excluded: Vec<u32>,
    pub elapsed_secs: f64,
    pub tables: Vec<TableFile>,
}

impl Manifest {
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).map_err(|e| SweepError::Io(format!("manifest: {e}")))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_saphyr::from_str(yaml).map_err(|e| SweepError::Io(format!("manifest: {e}")))
    }
}

/// Files written by [`write_report`]
#[derive(Debug, Clone)]
pub struct WrittenFiles {
    pub tables: Vec<PathBuf>,
    pub manifest: PathBuf,
}

/// Persist every table of `report` plus its manifest under `layout`
pub fn write_report(
    report: &SweepReport,
    config: &SweepConfig,
    layout: &OutputLayout,
) -> Result<WrittenFiles> {
    fs::create_dir_all(layout.dir())?;

    let mut tables = Vec::with_capacity(Artifact::ALL.len());
    let mut entries = Vec::with_capacity(Artifact::ALL.len());
    for artifact in Artifact::ALL {
        let path = layout.table_path(artifact);
        let table = report_table(report, artifact);
        write_table(&path, table)?;
        tracing::debug!(path = %path.display(), "Wrote {}", artifact.prefix());
        entries.push(TableFile {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            columns: table.schema(),
        });
        tables.push(path);
    }

    let manifest = Manifest {
        created: layout.created.clone(),
        config: config.clone(),
        combinations: report.combinations,
        completed: report.completed(),
        failed: report
            .failures
            .iter()
            .map(|f| FailedCombination {
                combo: f.combo.0,
                parameters: f.parameters.clone(),
                error: f.error.to_string(),
            })
            .collect(),
        lorenz_excluded: report.lorenz.excluded.iter().map(|c| c.0).collect(),
        elapsed_secs: report.elapsed.as_secs_f64(),
        tables: entries,
    };
    let manifest_path = layout.manifest_path();
    atomic_write(&manifest_path, &manifest.to_yaml()?)?;

    tracing::info!(dir = %layout.dir().display(), "Results saved");
    Ok(WrittenFiles {
        tables,
        manifest: manifest_path,
    })
}

fn report_table(report: &SweepReport, artifact: Artifact) -> &Table {
    let tables = &report.tables;
    match artifact {
        Artifact::GrowthRaw => &tables.growth_raw,
        Artifact::LorenzRaw => &tables.lorenz_raw,
        Artifact::WealthRaw => &tables.wealth_raw,
        Artifact::GrowthClean => &tables.growth_clean,
        Artifact::LorenzClean => &tables.lorenz_clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_replaces_and_cleans_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.yaml");

        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("sweep.yaml.tmp").exists());
    }

    #[test]
    fn test_layout_names() {
        let now: Zoned = "2024-03-09T14:05:07[UTC]".parse().unwrap();
        let layout = OutputLayout::at(Path::new("out"), "production", &now);

        assert_eq!(layout.dir(), Path::new("out/production_2024-03-09"));
        assert_eq!(
            layout.table_path(Artifact::GrowthClean),
            Path::new("out/production_2024-03-09/G_CLEAN_14-05-07.csv")
        );
        assert_eq!(
            layout.manifest_path(),
            Path::new("out/production_2024-03-09/sweep_14-05-07.yaml")
        );
    }
}
