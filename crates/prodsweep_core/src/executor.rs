//! Runs every repetition of one parameter combination against a fresh engine
//! session.
//!
//! A combination is all-or-nothing: the first error (or engine panic) in any
//! of its runs discards the whole combination, and the failure is returned as
//! [`CombinationOutcome::Failed`] rather than propagated. The one exception is
//! an engine that cannot open a session at all, which no other combination
//! could survive either.

use std::panic::{self, AssertUnwindSafe};

use crate::config::SweepConfig;
use crate::engine::{EngineSession, SessionGuard, SimulationEngine};
use crate::error::{CombinationFailure, EngineError};
use crate::model::{
    CombinationOutcome, GrowthRecord, ParameterCombination, RoleWealth, WealthSample,
};

type RunRecords = (Vec<GrowthRecord>, Vec<WealthSample>);

/// Why a combination stopped early
enum Abort {
    /// The engine is gone; the sweep cannot continue
    Fatal(EngineError),
    /// Only this combination is lost
    Failed(EngineError),
}

impl From<EngineError> for Abort {
    fn from(e: EngineError) -> Self {
        Abort::Failed(e)
    }
}

/// Executes combinations one at a time; share it freely across workers
pub struct SweepExecutor<'a, E: SimulationEngine> {
    engine: &'a E,
    config: &'a SweepConfig,
}

impl<'a, E: SimulationEngine> SweepExecutor<'a, E> {
    pub fn new(engine: &'a E, config: &'a SweepConfig) -> Self {
        Self { engine, config }
    }

    /// Run all repetitions of `combo`.
    ///
    /// Never panics. Failures are logged with the offending parameters and
    /// reported as `Failed`; only [`EngineError::Unavailable`] from opening
    /// the session is returned as an error.
    pub fn execute(&self, combo: &ParameterCombination) -> Result<CombinationOutcome, EngineError> {
        let error = match panic::catch_unwind(AssertUnwindSafe(|| self.try_execute(combo))) {
            Ok(Ok((growth, wealth))) => return Ok(CombinationOutcome::Completed { growth, wealth }),
            Ok(Err(Abort::Fatal(e))) => {
                tracing::error!(combo = combo.combo.0, "Engine unavailable: {e}");
                return Err(e);
            }
            Ok(Err(Abort::Failed(e))) => e,
            Err(payload) => EngineError::Panicked(panic_message(payload.as_ref())),
        };

        let failure = CombinationFailure {
            combo: combo.combo,
            parameters: combo.bindings.clone(),
            error,
        };
        tracing::error!(combo = combo.combo.0, "Simulation error: {failure}");
        Ok(CombinationOutcome::Failed(failure))
    }

    fn try_execute(&self, combo: &ParameterCombination) -> Result<RunRecords, Abort> {
        let session = self
            .engine
            .open_session(&self.config.model)
            .map_err(|e| match e {
                EngineError::Unavailable(_) => Abort::Fatal(e),
                other => Abort::Failed(other),
            })?;
        let mut session = SessionGuard::new(session);

        for binding in &combo.bindings {
            session.set_parameter(&binding.name, &binding.value)?;
        }

        let runs = self.config.runs as usize;
        let mut growth_data = Vec::with_capacity(runs);
        let mut wealth_data = Vec::with_capacity(runs);

        for run in 1..=self.config.runs {
            session.reset()?;
            let growth = self.growth_series(&mut *session)?;

            let roles = self
                .config
                .reporters
                .roles
                .iter()
                .map(|role| {
                    Ok(RoleWealth {
                        role: role.role.clone(),
                        values: session.read_collection(&role.reporter)?,
                    })
                })
                .collect::<Result<Vec<_>, EngineError>>()?;

            growth_data.push(GrowthRecord {
                combo: combo.combo,
                run,
                identity: combo.bindings.clone(),
                growth,
            });
            wealth_data.push(WealthSample {
                combo: combo.combo,
                run,
                identity: combo.bindings.clone(),
                roles,
            });

            tracing::info!(
                combo = combo.combo.0,
                run,
                "Combination {} iteration {} complete",
                combo.combo,
                run
            );
        }

        session.finish()?;
        Ok((growth_data, wealth_data))
    }

    /// Step from tick 0 through `max_ticks`, sampling growth at each tick.
    ///
    /// The sample taken by stepping out of tick `t` is recorded as tick `t`.
    fn growth_series(&self, session: &mut E::Session) -> Result<Vec<f64>, EngineError> {
        let target = self.config.max_ticks.saturating_add(1);
        let mut series = Vec::new();

        let mut tick = session.current_tick()?;
        if tick != 0 {
            return Err(EngineError::Protocol(format!(
                "expected tick 0 after setup, engine reports {tick}"
            )));
        }

        while tick < target {
            session.step()?;
            series.push(session.read_scalar(&self.config.reporters.growth)?);
            let next = session.current_tick()?;
            if next <= tick {
                return Err(EngineError::Stalled { tick });
            }
            if next != tick + 1 {
                return Err(EngineError::Protocol(format!(
                    "tick jumped from {tick} to {next} in one step"
                )));
            }
            tick = next;
        }

        Ok(series)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
