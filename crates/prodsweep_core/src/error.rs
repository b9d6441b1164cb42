use std::fmt;

use crate::model::{ComboId, ParameterBinding};

/// Errors raised by an engine runtime or one of its sessions
#[derive(Debug, Clone)]
pub enum EngineError {
    /// The runtime could not be started or reached
    Unavailable(String),
    /// The engine replied with something the protocol does not allow
    Protocol(String),
    /// Pipe or process failure while talking to the engine
    Io(String),
    /// A reporter returned a value of the wrong shape
    Report { reporter: String, reason: String },
    /// `step` was called but the tick counter did not advance
    Stalled { tick: u64 },
    /// The engine panicked while executing a call
    Panicked(String),
    /// The session was used after `close`
    Closed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Unavailable(msg) => write!(f, "engine unavailable: {msg}"),
            EngineError::Protocol(msg) => write!(f, "engine protocol error: {msg}"),
            EngineError::Io(msg) => write!(f, "engine I/O error: {msg}"),
            EngineError::Report { reporter, reason } => {
                write!(f, "reporter '{reporter}' returned an invalid value: {reason}")
            }
            EngineError::Stalled { tick } => {
                write!(f, "engine did not advance past tick {tick}")
            }
            EngineError::Panicked(msg) => write!(f, "engine panicked: {msg}"),
            EngineError::Closed => write!(f, "engine session already closed"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

/// One combination failed; carries the offending parameters for the log
#[derive(Debug, Clone)]
pub struct CombinationFailure {
    pub combo: ComboId,
    pub parameters: Vec<ParameterBinding>,
    pub error: EngineError,
}

impl fmt::Display for CombinationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "combination {} failed with params {{", self.combo)?;
        for (i, binding) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", binding.name, binding.value)?;
        }
        write!(f, "}}: {}", self.error)
    }
}

impl std::error::Error for CombinationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors that stop the reduction of one table
#[derive(Debug, Clone, PartialEq)]
pub enum ReductionError {
    /// A growth record lacks a tick value (or holds a non-finite one)
    MissingTickData { combo: ComboId, run: u32, tick: u64 },
    /// A combination's wealth pool cannot be binned
    DegenerateDistribution { combo: ComboId, reason: &'static str },
    /// A table handed to a canonical view lacks a required column
    MissingColumn(String),
    /// Rows of one combination disagree on their identity columns
    IdentityMismatch { combo: ComboId },
}

impl fmt::Display for ReductionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionError::MissingTickData { combo, run, tick } => write!(
                f,
                "growth data for combination {combo} run {run} is missing tick {tick}"
            ),
            ReductionError::DegenerateDistribution { combo, reason } => write!(
                f,
                "wealth distribution of combination {combo} is degenerate: {reason}"
            ),
            ReductionError::MissingColumn(name) => write!(f, "column '{name}' not found"),
            ReductionError::IdentityMismatch { combo } => write!(
                f,
                "runs of combination {combo} disagree on their parameter values"
            ),
        }
    }
}

impl std::error::Error for ReductionError {}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    OutOfRange { field: &'static str, reason: String },
    DuplicateParameter(String),
    LinkedArity { group: usize, expected: usize, actual: usize },
    Parse(String),
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange { field, reason } => {
                write!(f, "invalid value for '{field}': {reason}")
            }
            ConfigError::DuplicateParameter(name) => {
                write!(f, "parameter '{name}' is swept more than once")
            }
            ConfigError::LinkedArity {
                group,
                expected,
                actual,
            } => write!(
                f,
                "linked group {group} expects tuples of {expected} values, found {actual}"
            ),
            ConfigError::Parse(msg) => write!(f, "failed to parse config: {msg}"),
            ConfigError::Io(msg) => write!(f, "failed to read config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors reading or writing persisted tables
#[derive(Debug, Clone)]
pub enum TableError {
    Io(String),
    /// The CSV layer rejected the data
    Format(String),
    /// A file's header does not match the columns it was read with
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Io(msg) => write!(f, "table I/O error: {msg}"),
            TableError::Format(msg) => write!(f, "table format error: {msg}"),
            TableError::SchemaMismatch { expected, found } => write!(
                f,
                "expected columns [{}], found [{}]",
                expected.join(", "),
                found.join(", ")
            ),
        }
    }
}

impl std::error::Error for TableError {}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e.to_string())
    }
}

/// Top-level error for a whole sweep
#[derive(Debug, Clone)]
pub enum SweepError {
    Config(ConfigError),
    /// Fatal runtime failure; no combination can proceed
    Engine(EngineError),
    Reduction(ReductionError),
    Table(TableError),
    Io(String),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Config(e) => write!(f, "{e}"),
            SweepError::Engine(e) => write!(f, "{e}"),
            SweepError::Reduction(e) => write!(f, "{e}"),
            SweepError::Table(e) => write!(f, "{e}"),
            SweepError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Config(e) => Some(e),
            SweepError::Engine(e) => Some(e),
            SweepError::Reduction(e) => Some(e),
            SweepError::Table(e) => Some(e),
            SweepError::Io(_) => None,
        }
    }
}

impl From<ConfigError> for SweepError {
    fn from(e: ConfigError) -> Self {
        SweepError::Config(e)
    }
}

impl From<EngineError> for SweepError {
    fn from(e: EngineError) -> Self {
        SweepError::Engine(e)
    }
}

impl From<ReductionError> for SweepError {
    fn from(e: ReductionError) -> Self {
        SweepError::Reduction(e)
    }
}

impl From<TableError> for SweepError {
    fn from(e: TableError) -> Self {
        SweepError::Table(e)
    }
}

impl From<std::io::Error> for SweepError {
    fn from(e: std::io::Error) -> Self {
        SweepError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
