//! Scripted engine for pipeline tests
//!
//! Growth and wealth are pure functions of the applied parameters, the run
//! number and the tick, so expected tables can be computed by hand. A fault
//! can be injected into any combination matching a predicate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{FactorConfig, SweepConfig};
use crate::engine::{EngineSession, SimulationEngine};
use crate::error::EngineError;
use crate::model::ParamValue;

pub type Params = BTreeMap<String, f64>;
pub type GrowthFn = fn(&Params, u32, u64) -> f64;
pub type WealthFn = fn(&Params, u32, &str) -> Vec<f64>;
pub type Predicate = fn(&Params) -> bool;

pub const WORKERS: &str = "[wealth] of workers";
pub const OWNERS: &str = "[wealth] of owners";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// `step` returns an error when leaving this tick
    ErrorAt { run: u32, tick: u64 },
    /// `step` panics when leaving this tick
    PanicAt { run: u32, tick: u64 },
    /// The tick counter stops advancing at this tick
    StallAt { run: u32, tick: u64 },
}

#[derive(Debug, Default)]
pub struct Counters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct ScriptedEngine {
    growth: GrowthFn,
    wealth: WealthFn,
    fault: Option<(Predicate, Fault)>,
    fail_start: bool,
    open_error: Option<EngineError>,
    pub counters: Arc<Counters>,
}

fn default_growth(params: &Params, run: u32, tick: u64) -> f64 {
    params.values().sum::<f64>() + f64::from(run) + tick as f64 * 0.5
}

fn default_wealth(params: &Params, run: u32, reporter: &str) -> Vec<f64> {
    let (count, base) = if reporter == OWNERS {
        (params.get("num-owners").copied().unwrap_or(2.0), 100.0)
    } else {
        (params.get("num-workers").copied().unwrap_or(5.0), 1.0)
    };
    (0..count as usize)
        .map(|j| base + j as f64 + f64::from(run))
        .collect()
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            growth: default_growth,
            wealth: default_wealth,
            fault: None,
            fail_start: false,
            open_error: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_growth(mut self, growth: GrowthFn) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_wealth(mut self, wealth: WealthFn) -> Self {
        self.wealth = wealth;
        self
    }

    pub fn with_fault(mut self, when: Predicate, fault: Fault) -> Self {
        self.fault = Some((when, fault));
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Every `open_session` returns `error`
    pub fn failing_open(mut self, error: EngineError) -> Self {
        self.open_error = Some(error);
        self
    }
}

impl SimulationEngine for ScriptedEngine {
    type Session = ScriptedSession;

    fn start_runtime(&self) -> Result<(), EngineError> {
        if self.fail_start {
            return Err(EngineError::Unavailable("scripted runtime refused".to_string()));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_runtime(&self) -> Result<(), EngineError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_session(&self, _model: &str) -> Result<ScriptedSession, EngineError> {
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            growth: self.growth,
            wealth: self.wealth,
            fault: self.fault,
            counters: Arc::clone(&self.counters),
            params: Params::new(),
            run: 0,
            tick: None,
            closed: false,
        })
    }
}

pub struct ScriptedSession {
    growth: GrowthFn,
    wealth: WealthFn,
    fault: Option<(Predicate, Fault)>,
    counters: Arc<Counters>,
    params: Params,
    run: u32,
    tick: Option<u64>,
    closed: bool,
}

impl ScriptedSession {
    fn active_fault(&self) -> Option<Fault> {
        self.fault
            .filter(|(when, _)| when(&self.params))
            .map(|(_, fault)| fault)
    }

    fn tick(&self) -> Result<u64, EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        self.tick
            .ok_or_else(|| EngineError::Protocol("setup has not been run".to_string()))
    }
}

impl EngineSession for ScriptedSession {
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), EngineError> {
        // Only numeric parameters feed the scripted growth and wealth
        if let Some(value) = value.as_f64() {
            self.params.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.run += 1;
        self.tick = Some(0);
        Ok(())
    }

    fn current_tick(&mut self) -> Result<u64, EngineError> {
        self.tick()
    }

    fn step(&mut self) -> Result<(), EngineError> {
        let tick = self.tick()?;
        match self.active_fault() {
            Some(Fault::ErrorAt { run, tick: t }) if run == self.run && t == tick => {
                return Err(EngineError::Protocol(format!("scripted failure at tick {t}")));
            }
            Some(Fault::PanicAt { run, tick: t }) if run == self.run && t == tick => {
                panic!("scripted panic at tick {t}");
            }
            Some(Fault::StallAt { run, tick: t }) if run == self.run && t == tick => {
                return Ok(());
            }
            _ => {}
        }
        self.tick = Some(tick + 1);
        Ok(())
    }

    fn read_scalar(&mut self, _name: &str) -> Result<f64, EngineError> {
        // Growth is labelled with the tick the step started from
        let tick = self.tick()?.saturating_sub(1);
        Ok((self.growth)(&self.params, self.run, tick))
    }

    fn read_collection(&mut self, name: &str) -> Result<Vec<f64>, EngineError> {
        self.tick()?;
        Ok((self.wealth)(&self.params, self.run, name))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// `{num-workers: [5, 10], num-owners: [2]}`, 2 runs, ticks 0..=1
pub fn two_combo_config() -> SweepConfig {
    SweepConfig {
        model: "scripted".to_string(),
        factors: vec![
            FactorConfig::new("num-workers", vec![ParamValue::Int(5), ParamValue::Int(10)])
                .with_column("Workers"),
            FactorConfig::new("num-owners", vec![ParamValue::Int(2)]).with_column("Owners"),
        ],
        runs: 2,
        max_ticks: 1,
        parallel_jobs: 2,
        ..Default::default()
    }
}

pub fn is_ten_workers(params: &Params) -> bool {
    params.get("num-workers") == Some(&10.0)
}
