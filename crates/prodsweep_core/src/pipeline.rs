//! End-to-end sweep: enumerate, dispatch, reduce, and build canonical views.

use std::time::Duration;

use crate::config::SweepConfig;
use crate::dispatch::{ParallelDispatcher, SweepProgress};
use crate::engine::{RuntimeGuard, SimulationEngine};
use crate::error::{CombinationFailure, Result};
use crate::reduce::{
    COMBO_COLUMN, GrowthTable, LorenzTable, TableKind, canonical_view, raw_wealth_table,
    reduce_growth, reduce_lorenz,
};
use crate::table::Table;

/// Every persisted table of a sweep
#[derive(Debug, Clone, Default)]
pub struct SweepTables {
    pub growth_raw: Table,
    pub lorenz_raw: Table,
    pub wealth_raw: Table,
    pub growth_clean: Table,
    pub lorenz_clean: Table,
}

/// Result of [`run_sweep`]
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Size of the parameter space
    pub combinations: usize,
    pub failures: Vec<CombinationFailure>,
    pub growth: GrowthTable,
    pub lorenz: LorenzTable,
    pub tables: SweepTables,
    /// Wall-clock time of the dispatch phase
    pub elapsed: Duration,
}

impl SweepReport {
    /// Combinations that contributed data
    #[must_use]
    pub fn completed(&self) -> usize {
        self.combinations - self.failures.len()
    }
}

/// Run a whole sweep against `engine`.
///
/// The engine runtime is started once before dispatch and stopped once after
/// it, whatever happens in between. Failed combinations are reported in
/// [`SweepReport::failures`] and left out of every table.
pub fn run_sweep<E: SimulationEngine>(
    engine: &E,
    config: &SweepConfig,
    progress: Option<&SweepProgress>,
) -> Result<SweepReport> {
    config.validate()?;
    let space = config.parameter_space()?;
    tracing::info!(
        combinations = space.len(),
        runs = config.runs,
        max_ticks = config.max_ticks,
        jobs = config.parallel_jobs,
        "Starting sweep"
    );

    let dispatched = {
        let runtime = RuntimeGuard::start(engine)?;
        let mut dispatcher = ParallelDispatcher::new(engine, config);
        if let Some(progress) = progress {
            dispatcher = dispatcher.with_progress(progress);
        }
        let dispatched = dispatcher.dispatch(space.combinations());
        if let Err(e) = runtime.finish() {
            tracing::error!("Failed to stop engine runtime: {e}");
        }
        dispatched?
    };

    if !dispatched.failures.is_empty() {
        tracing::warn!(
            failed = dispatched.failures.len(),
            "{} of {} combinations failed and were excluded",
            dispatched.failures.len(),
            space.len()
        );
    }

    let parameters = space.identity_columns();
    let growth = reduce_growth(&dispatched.growth_raw, parameters, config.tick_count())?;
    let lorenz = reduce_lorenz(
        &dispatched.wealth_raw,
        parameters,
        config.lorenz_bins,
        config.degenerate,
    )?;

    let mut identity = Vec::with_capacity(parameters.len() + 1);
    identity.push(COMBO_COLUMN.to_string());
    identity.extend(parameters.iter().cloned());

    let growth_raw = growth.to_table();
    let lorenz_raw = lorenz.to_table();
    let tables = SweepTables {
        growth_clean: canonical_view(&growth_raw, TableKind::Growth, &identity)?,
        lorenz_clean: canonical_view(&lorenz_raw, TableKind::Lorenz, &identity)?,
        wealth_raw: raw_wealth_table(&dispatched.wealth_raw, parameters),
        growth_raw,
        lorenz_raw,
    };

    Ok(SweepReport {
        combinations: space.len(),
        failures: dispatched.failures,
        growth,
        lorenz,
        tables,
        elapsed: dispatched.elapsed,
    })
}
