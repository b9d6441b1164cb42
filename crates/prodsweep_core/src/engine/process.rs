//! External engine process driven over stdin/stdout.
//!
//! Each session spawns its own engine process and exchanges one JSON object
//! per line:
//!
//! ```text
//! -> {"op":"load","model":"production.nlogo"}
//! <- {"ok":true}
//! -> {"op":"command","text":"set num-workers 5"}
//! <- {"ok":true}
//! -> {"op":"report","expr":"ticks"}
//! <- {"ok":true,"value":0}
//! -> {"op":"quit"}
//! ```
//!
//! A reply with `"ok":false` carries an `"error"` message and fails the call.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::config::ReporterConfig;
use crate::error::EngineError;
use crate::model::ParamValue;

use super::{EngineSession, SimulationEngine};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Load { model: &'a str },
    Command { text: &'a str },
    Report { expr: &'a str },
    Quit,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Launches one engine process per session
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
    setup_command: String,
    step_command: String,
    tick_reporter: String,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, reporters: &ReporterConfig) -> Self {
        Self {
            program: program.into(),
            args,
            setup_command: reporters.setup_command.clone(),
            step_command: reporters.step_command.clone(),
            tick_reporter: reporters.tick.clone(),
        }
    }
}

impl SimulationEngine for ProcessEngine {
    type Session = ProcessSession;

    fn start_runtime(&self) -> Result<(), EngineError> {
        // Bare program names are resolved through PATH at spawn time
        if self.program.components().count() > 1 && !self.program.exists() {
            return Err(EngineError::Unavailable(format!(
                "engine executable {} not found",
                self.program.display()
            )));
        }
        Ok(())
    }

    fn stop_runtime(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn open_session(&self, model: &str) -> Result<ProcessSession, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!("failed to spawn {}: {e}", self.program.display()))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Io("engine pipes unavailable".to_string()));
            }
        };

        let mut session = ProcessSession {
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            setup_command: self.setup_command.clone(),
            step_command: self.step_command.clone(),
            tick_reporter: self.tick_reporter.clone(),
            line: String::new(),
        };
        session.request(&Request::Load { model })?;
        Ok(session)
    }
}

/// A running engine process
pub struct ProcessSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    setup_command: String,
    step_command: String,
    tick_reporter: String,
    line: String,
}

impl ProcessSession {
    fn request(&mut self, request: &Request<'_>) -> Result<serde_json::Value, EngineError> {
        let stdin = self.stdin.as_mut().ok_or(EngineError::Closed)?;
        let encoded =
            serde_json::to_string(request).map_err(|e| EngineError::Protocol(e.to_string()))?;
        tracing::debug!(request = %encoded, "engine request");
        writeln!(stdin, "{encoded}")?;
        stdin.flush()?;

        self.line.clear();
        if self.stdout.read_line(&mut self.line)? == 0 {
            return Err(EngineError::Io("engine closed its output".to_string()));
        }
        let reply: Reply = serde_json::from_str(self.line.trim_end())
            .map_err(|e| EngineError::Protocol(format!("malformed reply: {e}")))?;
        if reply.ok {
            Ok(reply.value)
        } else {
            Err(EngineError::Protocol(
                reply.error.unwrap_or_else(|| "unspecified engine error".to_string()),
            ))
        }
    }

    fn command(&mut self, text: &str) -> Result<(), EngineError> {
        self.request(&Request::Command { text }).map(|_| ())
    }

    fn report(&mut self, expr: &str) -> Result<serde_json::Value, EngineError> {
        self.request(&Request::Report { expr })
    }
}

fn as_number(reporter: &str, value: &serde_json::Value) -> Result<f64, EngineError> {
    value.as_f64().ok_or_else(|| EngineError::Report {
        reporter: reporter.to_string(),
        reason: format!("expected a number, got {value}"),
    })
}

impl EngineSession for ProcessSession {
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), EngineError> {
        self.command(&format!("set {name} {}", value.to_engine_literal()))
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        let setup = self.setup_command.clone();
        self.command(&setup)
    }

    fn current_tick(&mut self) -> Result<u64, EngineError> {
        let reporter = self.tick_reporter.clone();
        let value = self.report(&reporter)?;
        let tick = as_number(&reporter, &value)?;
        if tick < 0.0 {
            return Err(EngineError::Report {
                reporter,
                reason: format!("negative tick {tick}"),
            });
        }
        Ok(tick as u64)
    }

    fn step(&mut self) -> Result<(), EngineError> {
        let step = self.step_command.clone();
        self.command(&step)
    }

    fn read_scalar(&mut self, name: &str) -> Result<f64, EngineError> {
        let value = self.report(name)?;
        as_number(name, &value)
    }

    fn read_collection(&mut self, name: &str) -> Result<Vec<f64>, EngineError> {
        let value = self.report(name)?;
        let items = value.as_array().ok_or_else(|| EngineError::Report {
            reporter: name.to_string(),
            reason: format!("expected a list, got {value}"),
        })?;
        items.iter().map(|item| as_number(name, item)).collect()
    }

    fn close(&mut self) -> Result<(), EngineError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(mut stdin) = self.stdin.take()
            && let Ok(quit) = serde_json::to_string(&Request::Quit)
        {
            // Best effort; the process is killed below either way
            let _ = writeln!(stdin, "{quit}");
        }
        if let Err(e) = child.kill() {
            tracing::debug!("engine process already gone: {e}");
        }
        child.wait()?;
        Ok(())
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to reap engine process: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encoding() {
        let encoded = serde_json::to_string(&Request::Command {
            text: "set num-workers 5",
        })
        .unwrap();
        assert_eq!(encoded, r#"{"op":"command","text":"set num-workers 5"}"#);
        assert_eq!(
            serde_json::to_string(&Request::Quit).unwrap(),
            r#"{"op":"quit"}"#
        );
    }

    #[test]
    fn test_reply_decoding() {
        let reply: Reply = serde_json::from_str(r#"{"ok":true,"value":[1.5,2]}"#).unwrap();
        assert!(reply.ok);
        assert_eq!(reply.value.as_array().map(Vec::len), Some(2));

        let reply: Reply = serde_json::from_str(r#"{"ok":false,"error":"boom"}"#).unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let engine = ProcessEngine::new(
            "/nonexistent/dir/engine",
            Vec::new(),
            &ReporterConfig::default(),
        );
        assert!(matches!(
            engine.start_runtime(),
            Err(EngineError::Unavailable(_))
        ));
        assert!(matches!(
            engine.open_session("model"),
            Err(EngineError::Unavailable(_))
        ));
    }
}
