//! Parameter values and bound parameter combinations

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ComboId;

/// A scalar value the engine accepts for a parameter.
///
/// Integers and floats are kept apart so that `5` is sent to the engine as
/// `5` rather than `5.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Bool(_) | ParamValue::Text(_) => None,
        }
    }

    /// Text the engine expects on the right-hand side of `set <name> <value>`
    #[must_use]
    pub fn to_engine_literal(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Float(v) => v.to_string(),
            ParamValue::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// One parameter bound to a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBinding {
    /// Name the engine knows the parameter by (e.g. `num-workers`)
    pub name: String,
    /// Column the value is written under in output tables (e.g. `Workers`)
    pub column: String,
    pub value: ParamValue,
}

/// One point in the sweep's parameter space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCombination {
    pub combo: ComboId,
    pub bindings: Vec<ParameterBinding>,
}

impl ParameterCombination {
    /// Look up a bound value by its engine name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.value)
    }
}
