//! Simulation engine adapter.
//!
//! The sweep never talks to a simulation directly. It drives an implementation
//! of [`SimulationEngine`], which hands out one [`EngineSession`] per
//! combination. Two implementations ship with the crate:
//!
//! - [`toy::ToyEconomy`] runs a small production economy in-process
//! - [`process::ProcessEngine`] drives an external engine process over a
//!   line-delimited JSON command/report protocol

pub mod process;
pub mod toy;

use std::ops::{Deref, DerefMut};

use crate::error::EngineError;
use crate::model::ParamValue;

/// A simulation runtime that can open isolated sessions.
///
/// `start_runtime` and `stop_runtime` bracket a whole sweep and are called at
/// most once each; use [`RuntimeGuard`] rather than calling them directly.
pub trait SimulationEngine: Sync {
    type Session: EngineSession;

    fn start_runtime(&self) -> Result<(), EngineError>;

    fn stop_runtime(&self) -> Result<(), EngineError>;

    /// Start an isolated simulation context bound to `model`
    fn open_session(&self, model: &str) -> Result<Self::Session, EngineError>;
}

/// One stateful handle into the runtime, used by a single caller at a time
pub trait EngineSession {
    /// Apply a parameter; must happen before `reset`
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), EngineError>;

    /// Reinitialize state for a new run, keeping applied parameters
    fn reset(&mut self) -> Result<(), EngineError>;

    fn current_tick(&mut self) -> Result<u64, EngineError>;

    /// Advance one tick; only valid after `reset`
    fn step(&mut self) -> Result<(), EngineError>;

    fn read_scalar(&mut self, name: &str) -> Result<f64, EngineError>;

    fn read_collection(&mut self, name: &str) -> Result<Vec<f64>, EngineError>;

    /// Release every resource held by the session. Idempotent, and must
    /// succeed after a failure mid-run.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Owns a session and closes it on every exit path
pub struct SessionGuard<S: EngineSession> {
    session: S,
    closed: bool,
}

impl<S: EngineSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    /// Close now and surface the error instead of only logging it
    pub fn finish(mut self) -> Result<(), EngineError> {
        self.closed = true;
        self.session.close()
    }
}

impl<S: EngineSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: EngineSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: EngineSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.close() {
            tracing::warn!("Failed to close engine session: {e}");
        }
    }
}

/// Starts the runtime once and stops it exactly once.
///
/// Call [`RuntimeGuard::finish`] after dispatch; if the guard is dropped
/// instead (early return or panic) the runtime is still stopped.
pub struct RuntimeGuard<'a, E: SimulationEngine> {
    engine: &'a E,
    stopped: bool,
}

impl<'a, E: SimulationEngine> RuntimeGuard<'a, E> {
    pub fn start(engine: &'a E) -> Result<Self, EngineError> {
        engine.start_runtime()?;
        tracing::debug!("Engine runtime started");
        Ok(Self {
            engine,
            stopped: false,
        })
    }

    pub fn finish(mut self) -> Result<(), EngineError> {
        self.stopped = true;
        tracing::info!("Cleaning up engine runtime");
        self.engine.stop_runtime()
    }
}

impl<E: SimulationEngine> Drop for RuntimeGuard<'_, E> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.engine.stop_runtime() {
            tracing::error!("Failed to stop engine runtime: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEngine {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    struct CountingSession<'a> {
        closes: &'a AtomicUsize,
    }

    impl EngineSession for CountingSession<'_> {
        fn set_parameter(&mut self, _: &str, _: &ParamValue) -> Result<(), EngineError> {
            Ok(())
        }
        fn reset(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn current_tick(&mut self) -> Result<u64, EngineError> {
            Ok(0)
        }
        fn step(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn read_scalar(&mut self, _: &str) -> Result<f64, EngineError> {
            Ok(0.0)
        }
        fn read_collection(&mut self, _: &str) -> Result<Vec<f64>, EngineError> {
            Ok(Vec::new())
        }
        fn close(&mut self) -> Result<(), EngineError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl SimulationEngine for CountingEngine {
        type Session = CountingSession<'static>;

        fn start_runtime(&self) -> Result<(), EngineError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop_runtime(&self) -> Result<(), EngineError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn open_session(&self, _: &str) -> Result<Self::Session, EngineError> {
            Err(EngineError::Unavailable("not used".to_string()))
        }
    }

    #[test]
    fn test_runtime_guard_stops_once_on_finish() {
        let engine = CountingEngine::default();
        let guard = RuntimeGuard::start(&engine).unwrap();
        guard.finish().unwrap();
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_runtime_guard_stops_on_drop() {
        let engine = CountingEngine::default();
        {
            let _guard = RuntimeGuard::start(&engine).unwrap();
        }
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_guard_closes_once() {
        static CLOSES: AtomicUsize = AtomicUsize::new(0);
        {
            let _guard = SessionGuard::new(CountingSession { closes: &CLOSES });
        }
        assert_eq!(CLOSES.load(Ordering::SeqCst), 1);

        let guard = SessionGuard::new(CountingSession { closes: &CLOSES });
        guard.finish().unwrap();
        assert_eq!(CLOSES.load(Ordering::SeqCst), 2);
    }
}
