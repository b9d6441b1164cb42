//! Parallel dispatch of combinations across a bounded worker pool.
//!
//! Each task executes one combination end to end with its own engine session,
//! so workers share nothing mutable. Outcomes are sent back over a channel as
//! they finish and collected on the calling thread, so results already
//! gathered survive even if the pool itself goes down. An unavailable engine
//! stops the dispatch: combinations not yet started are skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SweepConfig;
use crate::engine::SimulationEngine;
use crate::error::{CombinationFailure, EngineError};
use crate::executor::SweepExecutor;
use crate::model::{CombinationOutcome, GrowthRecord, ParameterCombination, WealthSample};

/// Progress counters shared between the dispatcher and an observer
#[derive(Debug, Clone)]
pub struct SweepProgress {
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl SweepProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
        }
    }

    /// Combinations finished so far, failed ones included
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn record(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SweepProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Flattened raw records of every successful combination
#[derive(Debug, Clone, Default)]
pub struct DispatchOutput {
    pub growth_raw: Vec<GrowthRecord>,
    pub wealth_raw: Vec<WealthSample>,
    pub failures: Vec<CombinationFailure>,
    pub elapsed: Duration,
}

impl DispatchOutput {
    fn absorb(&mut self, outcome: CombinationOutcome) {
        match outcome {
            CombinationOutcome::Completed { growth, wealth } => {
                if growth.is_empty() && wealth.is_empty() {
                    return;
                }
                self.growth_raw.extend(growth);
                self.wealth_raw.extend(wealth);
            }
            CombinationOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    /// Order rows by `(Combo, Run)` so persisted tables do not depend on
    /// completion order
    fn sort(&mut self) {
        self.growth_raw.sort_by_key(|r| (r.combo, r.run));
        self.wealth_raw.sort_by_key(|r| (r.combo, r.run));
        self.failures.sort_by_key(|f| f.combo);
    }
}

/// Fans combinations out over `parallel_jobs` workers
pub struct ParallelDispatcher<'a, E: SimulationEngine> {
    engine: &'a E,
    config: &'a SweepConfig,
    progress: Option<&'a SweepProgress>,
}

impl<'a, E: SimulationEngine> ParallelDispatcher<'a, E> {
    pub fn new(engine: &'a E, config: &'a SweepConfig) -> Self {
        Self {
            engine,
            config,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a SweepProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Execute every combination and collect the results.
    ///
    /// Combination failures end up in [`DispatchOutput::failures`]. A failure
    /// to set up the worker pool, or an engine that can no longer open
    /// sessions, is returned as an error.
    pub fn dispatch(&self, combos: &[ParameterCombination]) -> Result<DispatchOutput, EngineError> {
        let start = Instant::now();
        if let Some(p) = self.progress {
            p.reset(combos.len());
        }

        let executor = SweepExecutor::new(self.engine, self.config);
        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<Result<CombinationOutcome, EngineError>>();
        let mut output = DispatchOutput::default();
        let mut fatal = None;

        #[cfg(feature = "parallel")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.parallel_jobs)
                .thread_name(|i| format!("sweep-worker-{i}"))
                .build()
                .map_err(|e| EngineError::Unavailable(format!("failed to build worker pool: {e}")))?;

            std::thread::scope(|scope| {
                let executor = &executor;
                let abort = &abort;
                let handle = scope.spawn(move || {
                    pool.install(|| {
                        combos.par_iter().for_each_with(tx, |tx, combo| {
                            if abort.load(Ordering::Relaxed) {
                                return;
                            }
                            let result = executor.execute(combo);
                            if result.is_err() {
                                abort.store(true, Ordering::Relaxed);
                            }
                            // The receiver outlives the pool, so a send cannot fail
                            let _ = tx.send(result);
                        });
                    });
                });

                for result in rx {
                    self.collect(result, &mut output, &mut fatal);
                }

                if handle.join().is_err() {
                    tracing::error!(
                        "Worker pool crashed; keeping {} completed combinations",
                        self.progress.map_or(0, SweepProgress::completed)
                    );
                }
            });
        }

        #[cfg(not(feature = "parallel"))]
        {
            for combo in combos {
                if abort.load(Ordering::Relaxed) {
                    break;
                }
                let result = executor.execute(combo);
                if result.is_err() {
                    abort.store(true, Ordering::Relaxed);
                }
                let _ = tx.send(result);
            }
            drop(tx);
            for result in rx {
                self.collect(result, &mut output, &mut fatal);
            }
        }

        output.elapsed = start.elapsed();
        if let Some(e) = fatal {
            tracing::error!(
                completed = self.progress.map_or(0, SweepProgress::completed),
                "Sweep aborted after {:.3}s: {e}",
                output.elapsed.as_secs_f64()
            );
            return Err(e);
        }

        output.sort();
        tracing::info!(
            combinations = combos.len(),
            failed = output.failures.len(),
            "Time taken: {:.3}s",
            output.elapsed.as_secs_f64()
        );
        Ok(output)
    }

    fn collect(
        &self,
        result: Result<CombinationOutcome, EngineError>,
        output: &mut DispatchOutput,
        fatal: &mut Option<EngineError>,
    ) {
        match result {
            Ok(outcome) => {
                self.observe(&outcome);
                output.absorb(outcome);
            }
            Err(e) => {
                fatal.get_or_insert(e);
            }
        }
    }

    fn observe(&self, outcome: &CombinationOutcome) {
        if let Some(p) = self.progress {
            p.record(outcome.is_failed());
            tracing::debug!("Progress: {}/{} combinations", p.completed(), p.total());
        }
    }
}
