//! Identifiers for sweep entities

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense index of one point in the parameter space, assigned in enumeration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComboId(pub u32);

impl ComboId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComboId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
