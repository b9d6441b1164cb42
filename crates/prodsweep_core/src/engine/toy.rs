//! In-process production economy.
//!
//! A small stand-in for the external production model so a sweep can run end
//! to end without the external runtime. Workers supply labour, owners hold
//! the capital stock, and each tick's output is split into reinvested
//! capital, wages, and owner income according to the percentage parameters.
//! Total factor productivity follows a random walk.

use std::collections::BTreeMap;
use std::hash::Hasher;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rustc_hash::FxHasher;

use crate::config::ReporterConfig;
use crate::error::EngineError;
use crate::model::ParamValue;

use super::{EngineSession, SimulationEngine};

const CAPITAL_ELASTICITY: f64 = 0.3;

/// Parameters the toy model understands, with their defaults
const PARAMETERS: &[(&str, f64)] = &[
    ("num-workers", 50.0),
    ("num-owners", 5.0),
    ("num-assets", 10.0),
    ("percent-capital", 30.0),
    ("percent-wages", 50.0),
    ("percent-owner-income", 20.0),
    ("productivity-volatility", 0.02),
];

/// Engine factory for the in-process model
#[derive(Debug, Clone)]
pub struct ToyEconomy {
    seed: u64,
    reporters: ReporterConfig,
}

impl ToyEconomy {
    pub fn new(seed: u64, reporters: ReporterConfig) -> Self {
        Self { seed, reporters }
    }
}

impl SimulationEngine for ToyEconomy {
    type Session = ToySession;

    fn start_runtime(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn stop_runtime(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn open_session(&self, _model: &str) -> Result<ToySession, EngineError> {
        Ok(ToySession {
            seed: self.seed,
            reporters: self.reporters.clone(),
            params: BTreeMap::new(),
            state: None,
            resets: 0,
            closed: false,
        })
    }
}

#[derive(Debug)]
struct EconomyState {
    rng: StdRng,
    tick: u64,
    productivity: f64,
    capital: f64,
    output: f64,
    growth_rate: f64,
    workers: Vec<f64>,
    owners: Vec<f64>,
}

/// One isolated economy
#[derive(Debug)]
pub struct ToySession {
    seed: u64,
    reporters: ReporterConfig,
    params: BTreeMap<String, ParamValue>,
    state: Option<EconomyState>,
    resets: u64,
    closed: bool,
}

impl ToySession {
    fn param(&self, name: &str) -> f64 {
        self.params
            .get(name)
            .and_then(ParamValue::as_f64)
            .or_else(|| {
                PARAMETERS
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| *v)
            })
            .unwrap_or(0.0)
    }

    fn check_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn state_mut(&mut self) -> Result<&mut EconomyState, EngineError> {
        self.check_open()?;
        self.state
            .as_mut()
            .ok_or_else(|| EngineError::Protocol("model has not been set up".to_string()))
    }

    /// Seed derived from the base seed, the applied parameters and the run
    fn run_seed(&self) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write_u64(self.seed);
        for (name, value) in &self.params {
            hasher.write(name.as_bytes());
            hasher.write(value.to_engine_literal().as_bytes());
        }
        hasher.write_u64(self.resets);
        hasher.finish()
    }

    fn output(productivity: f64, capital: f64, labour: f64) -> f64 {
        productivity * capital.powf(CAPITAL_ELASTICITY) * labour.powf(1.0 - CAPITAL_ELASTICITY)
    }
}

impl EngineSession for ToySession {
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), EngineError> {
        self.check_open()?;
        if !PARAMETERS.iter().any(|(n, _)| *n == name) {
            return Err(EngineError::Protocol(format!(
                "nothing named {name} has been defined"
            )));
        }
        if value.as_f64().is_none() {
            return Err(EngineError::Protocol(format!(
                "{name} expects a number, got {value}"
            )));
        }
        self.params.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.check_open()?;
        self.resets += 1;

        let workers = self.param("num-workers").max(0.0) as usize;
        let owners = self.param("num-owners").max(0.0) as usize;
        let capital = self.param("num-assets").max(0.0) * 10.0;
        let productivity = 1.0;

        self.state = Some(EconomyState {
            rng: StdRng::seed_from_u64(self.run_seed()),
            tick: 0,
            productivity,
            capital,
            output: Self::output(productivity, capital, workers as f64),
            growth_rate: 0.0,
            workers: vec![1.0; workers],
            owners: vec![10.0; owners],
        });
        Ok(())
    }

    fn current_tick(&mut self) -> Result<u64, EngineError> {
        Ok(self.state_mut()?.tick)
    }

    fn step(&mut self) -> Result<(), EngineError> {
        let capital_pct = self.param("percent-capital").max(0.0);
        let wage_pct = self.param("percent-wages").max(0.0);
        let owner_pct = self.param("percent-owner-income").max(0.0);
        let volatility = self.param("productivity-volatility").max(0.0);
        let total_pct = capital_pct + wage_pct + owner_pct;

        let shock = Normal::new(0.0, volatility)
            .map_err(|e| EngineError::Protocol(format!("invalid volatility: {e}")))?;

        let state = self.state_mut()?;
        state.productivity *= 1.0 + shock.sample(&mut state.rng);
        let output = Self::output(state.productivity, state.capital, state.workers.len() as f64);

        if total_pct > 0.0 {
            state.capital += output * capital_pct / total_pct;

            let wage_pool = output * wage_pct / total_pct;
            if !state.workers.is_empty() {
                let base = wage_pool / state.workers.len() as f64;
                for wealth in &mut state.workers {
                    *wealth += base * state.rng.random_range(0.5..1.5);
                }
            }

            let income_pool = output * owner_pct / total_pct;
            if !state.owners.is_empty() {
                let base = income_pool / state.owners.len() as f64;
                for wealth in &mut state.owners {
                    *wealth += base * state.rng.random_range(0.5..1.5);
                }
            }
        }

        state.growth_rate = if state.output > 0.0 {
            (output - state.output) / state.output * 100.0
        } else {
            0.0
        };
        state.output = output;
        state.tick += 1;
        Ok(())
    }

    fn read_scalar(&mut self, name: &str) -> Result<f64, EngineError> {
        let growth = self.reporters.growth.clone();
        let tick = self.reporters.tick.clone();
        let state = self.state_mut()?;
        if name == growth {
            Ok(state.growth_rate)
        } else if name == tick {
            Ok(state.tick as f64)
        } else {
            Err(EngineError::Report {
                reporter: name.to_string(),
                reason: "unknown reporter".to_string(),
            })
        }
    }

    fn read_collection(&mut self, name: &str) -> Result<Vec<f64>, EngineError> {
        let role = self
            .reporters
            .roles
            .iter()
            .position(|r| r.reporter == name)
            .ok_or_else(|| EngineError::Report {
                reporter: name.to_string(),
                reason: "unknown reporter".to_string(),
            })?;
        let state = self.state_mut()?;
        // First configured role reads workers, every other role reads owners
        Ok(if role == 0 {
            state.workers.clone()
        } else {
            state.owners.clone()
        })
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.closed = true;
        self.state = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ToySession {
        ToyEconomy::new(7, ReporterConfig::default())
            .open_session("toy")
            .unwrap()
    }

    #[test]
    fn test_step_advances_tick() {
        let mut s = session();
        s.set_parameter("num-workers", &ParamValue::Int(5)).unwrap();
        s.reset().unwrap();
        assert_eq!(s.current_tick().unwrap(), 0);
        s.step().unwrap();
        s.step().unwrap();
        assert_eq!(s.current_tick().unwrap(), 2);
        assert!(s.read_scalar("pt-growth-rate").unwrap().is_finite());
        assert_eq!(s.read_collection("[wealth] of workers").unwrap().len(), 5);
        assert_eq!(s.read_collection("[wealth] of owners").unwrap().len(), 5);
    }

    #[test]
    fn test_same_parameters_reproduce_run() {
        let run = || {
            let mut s = session();
            s.set_parameter("num-owners", &ParamValue::Int(3)).unwrap();
            s.reset().unwrap();
            for _ in 0..5 {
                s.step().unwrap();
            }
            s.read_collection("[wealth] of owners").unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_rejects_unknown_parameter_and_step_before_setup() {
        let mut s = session();
        assert!(matches!(
            s.set_parameter("num-dragons", &ParamValue::Int(1)),
            Err(EngineError::Protocol(_))
        ));
        assert!(s.step().is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut s = session();
        s.reset().unwrap();
        s.close().unwrap();
        s.close().unwrap();
        assert!(matches!(s.current_tick(), Err(EngineError::Closed)));
    }
}
