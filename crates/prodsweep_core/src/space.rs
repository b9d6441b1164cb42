//! Parameter space enumeration.
//!
//! Every factor and every linked group forms one dimension of a grid. The
//! grid is enumerated in row-major order (last dimension varies fastest) and
//! each point's position becomes its permanent [`ComboId`].

use std::collections::HashSet;

use crate::config::{FactorConfig, LinkedFactorConfig};
use crate::error::ConfigError;
use crate::model::{ComboId, ParameterBinding, ParameterCombination};

/// One sweep dimension: for each of its values, the bindings it contributes
#[derive(Debug, Clone)]
struct Dimension {
    points: Vec<Vec<ParameterBinding>>,
}

/// The full, materialized set of combinations to sweep
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    shape: Vec<usize>,
    strides: Vec<usize>,
    columns: Vec<String>,
    combinations: Vec<ParameterCombination>,
}

impl ParameterSpace {
    /// Build the cartesian product of `factors` followed by `linked` groups.
    ///
    /// An empty configuration, or any dimension without values, yields an
    /// empty sweep.
    pub fn new(
        factors: &[FactorConfig],
        linked: &[LinkedFactorConfig],
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        let mut dimensions = Vec::with_capacity(factors.len() + linked.len());

        for factor in factors {
            if !seen.insert(factor.name.clone()) {
                return Err(ConfigError::DuplicateParameter(factor.name.clone()));
            }
            let column = factor.column.clone().unwrap_or_else(|| factor.name.clone());
            columns.push(column.clone());
            dimensions.push(Dimension {
                points: factor
                    .values
                    .iter()
                    .map(|value| {
                        vec![ParameterBinding {
                            name: factor.name.clone(),
                            column: column.clone(),
                            value: value.clone(),
                        }]
                    })
                    .collect(),
            });
        }

        for (group_idx, group) in linked.iter().enumerate() {
            let mut group_columns = Vec::with_capacity(group.parameters.len());
            for param in &group.parameters {
                if !seen.insert(param.name.clone()) {
                    return Err(ConfigError::DuplicateParameter(param.name.clone()));
                }
                group_columns.push(param.column.clone().unwrap_or_else(|| param.name.clone()));
            }

            let mut points = Vec::with_capacity(group.values.len());
            for tuple in &group.values {
                if tuple.len() != group.parameters.len() {
                    return Err(ConfigError::LinkedArity {
                        group: group_idx,
                        expected: group.parameters.len(),
                        actual: tuple.len(),
                    });
                }
                points.push(
                    group
                        .parameters
                        .iter()
                        .zip(&group_columns)
                        .zip(tuple)
                        .map(|((param, column), value)| ParameterBinding {
                            name: param.name.clone(),
                            column: column.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                );
            }
            columns.extend(group_columns);
            dimensions.push(Dimension { points });
        }

        let shape: Vec<usize> = dimensions.iter().map(|d| d.points.len()).collect();
        let strides = compute_strides(&shape);
        let total = if shape.is_empty() {
            0
        } else {
            shape
                .iter()
                .try_fold(1usize, |acc, &n| acc.checked_mul(n))
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| ConfigError::OutOfRange {
                    field: "factors",
                    reason: format!("more than {} combinations", u32::MAX),
                })?
        };

        let mut combinations = Vec::with_capacity(total as usize);
        for id in 0..total {
            let flat = id as usize;
            let bindings = shape
                .iter()
                .zip(&strides)
                .zip(&dimensions)
                .flat_map(|((&size, &stride), dim)| dim.points[(flat / stride) % size].iter())
                .cloned()
                .collect();
            combinations.push(ParameterCombination {
                combo: ComboId(id),
                bindings,
            });
        }

        Ok(Self {
            shape,
            strides,
            columns,
            combinations,
        })
    }

    /// Number of combinations
    #[must_use]
    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Number of values along each dimension
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Output column names of the parameters, in binding order
    #[must_use]
    pub fn identity_columns(&self) -> &[String] {
        &self.columns
    }

    /// All combinations in enumeration order
    #[must_use]
    pub fn combinations(&self) -> &[ParameterCombination] {
        &self.combinations
    }

    #[must_use]
    pub fn get(&self, combo: ComboId) -> Option<&ParameterCombination> {
        self.combinations.get(combo.index())
    }

    /// Per-dimension value indices of a combination
    #[must_use]
    pub fn multi_index(&self, combo: ComboId) -> Option<Vec<usize>> {
        if combo.index() >= self.len() {
            return None;
        }
        let mut remaining = combo.index();
        let mut indices = Vec::with_capacity(self.shape.len());
        for &stride in &self.strides {
            indices.push(remaining / stride);
            remaining %= stride;
        }
        Some(indices)
    }
}

/// Row-major strides for `shape`
fn compute_strides(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return Vec::new();
    }
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len() - 1).rev() {
        strides[i] = strides[i + 1].saturating_mul(shape[i + 1].max(1));
    }
    strides
}
