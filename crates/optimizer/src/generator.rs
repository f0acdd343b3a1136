//! Candidate generation for one regime's search.
//!
//! The grid is enumerated in parameter-name order with the last name varying
//! fastest. A grid larger than the budget is subsampled at evenly spaced indices,
//! so the same job always yields the same candidates.

use crate::error::OptimizerError;
use configuration::{ParameterRange, ParameterSet};
use itertools::Itertools;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Longest linear range a single parameter may expand to.
const MAX_AXIS_VALUES: usize = 10_000;

/// The concrete values of every parameter in the search space, in name order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    axes: Vec<(String, Vec<Value>)>,
}

impl ParameterGrid {
    /// Expands every range into its list of values.
    pub fn new(space: &BTreeMap<String, ParameterRange>) -> Result<Self, OptimizerError> {
        let axes = space
            .iter()
            .map(|(name, range)| Ok((name.clone(), expand(name, range)?)))
            .collect::<Result<Vec<_>, OptimizerError>>()?;
        Ok(Self { axes })
    }

    /// Number of combinations, saturating at `usize::MAX`. An empty space has none.
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
            .unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, in enumeration order.
    pub fn all(&self) -> Vec<ParameterSet> {
        if self.axes.is_empty() {
            return Vec::new();
        }
        self.axes
            .iter()
            .map(|(_, values)| values.iter().cloned())
            .multi_cartesian_product()
            .map(|product| self.assemble(product))
            .collect()
    }

    /// The combination at position `index` of the enumeration.
    pub fn get(&self, index: usize) -> Option<ParameterSet> {
        if index >= self.len() {
            return None;
        }
        let mut rest = index;
        let mut picked = vec![Value::Null; self.axes.len()];
        for (slot, (_, values)) in picked.iter_mut().zip(&self.axes).rev() {
            *slot = values[rest % values.len()].clone();
            rest /= values.len();
        }
        Some(self.assemble(picked))
    }

    /// At most `budget` combinations, evenly spaced over the enumeration and
    /// always including the first and last.
    pub fn sample(&self, budget: usize) -> Vec<ParameterSet> {
        let total = self.len();
        if total <= budget {
            return self.all();
        }
        evenly_spaced(total, budget)
            .into_iter()
            .filter_map(|index| self.get(index))
            .collect()
    }

    fn assemble(&self, values: Vec<Value>) -> ParameterSet {
        self.axes
            .iter()
            .map(|(name, _)| name.clone())
            .zip(values)
            .collect()
    }
}

/// The candidates for one regime: seeds first, then the grid, `budget` in total.
///
/// Seeds are de-duplicated and take at most half the budget while the grid has
/// combinations to offer; grid points equal to a seed are not run twice.
pub fn candidates(grid: &ParameterGrid, seeds: &[ParameterSet], budget: usize) -> Vec<ParameterSet> {
    let mut unique_seeds: Vec<ParameterSet> = Vec::new();
    for seed in seeds {
        if !unique_seeds.contains(seed) {
            unique_seeds.push(seed.clone());
        }
    }

    let seed_slots = if grid.is_empty() { budget } else { budget / 2 };
    if unique_seeds.len() > seed_slots {
        tracing::warn!(
            seeds = unique_seeds.len(),
            kept = seed_slots,
            "Too many seed candidates for the iteration budget; keeping the first ones"
        );
        unique_seeds.truncate(seed_slots);
    }

    let grid_budget = budget - unique_seeds.len();
    let grid_points = grid.sample(grid_budget);
    if grid.len() > grid_budget {
        tracing::info!(
            grid = grid.len(),
            budget = grid_budget,
            "Parameter grid exceeds the iteration budget; subsampling evenly"
        );
    }

    let mut out = unique_seeds;
    for point in grid_points {
        if !out.contains(&point) {
            out.push(point);
        }
    }
    out
}

/// `count` indices spread over `0..total`, first and last included.
fn evenly_spaced(total: usize, count: usize) -> Vec<usize> {
    match count {
        0 => Vec::new(),
        1 => vec![0],
        _ => {
            let last = (total - 1) as u128;
            let steps = (count - 1) as u128;
            (0..count as u128)
                .map(|i| ((i * last + steps / 2) / steps) as usize)
                .dedup()
                .collect()
        }
    }
}

fn expand(name: &str, range: &ParameterRange) -> Result<Vec<Value>, OptimizerError> {
    let values = match range {
        ParameterRange::DiscreteInt(vals) => vals.iter().map(|&v| Value::from(v)).collect(),
        ParameterRange::DiscreteDecimal(vals) => {
            vals.iter().map(|v| decimal_value(name, *v)).collect::<Result<Vec<_>, _>>()?
        }
        ParameterRange::LinearInt { start, end, step } => {
            if *step <= 0 {
                return Err(OptimizerError::ParameterGeneration(format!(
                    "Step for '{name}' must be positive."
                )));
            }
            let count = if end < start {
                0
            } else {
                (i128::from(*end) - i128::from(*start)) / i128::from(*step) + 1
            };
            check_axis_len(name, count)?;
            (*start..=*end).step_by(*step as usize).map(Value::from).collect()
        }
        ParameterRange::LinearDecimal { start, end, step } => {
            if step.is_sign_negative() || step.is_zero() {
                return Err(OptimizerError::ParameterGeneration(format!(
                    "Step for '{name}' must be positive."
                )));
            }
            let count = if end < start {
                0
            } else {
                end.checked_sub(*start)
                    .and_then(|span| span.checked_div(*step))
                    .and_then(|steps| steps.floor().to_i128())
                    .map_or(i128::MAX, |steps| steps + 1)
            };
            check_axis_len(name, count)?;
            (0..count)
                .map(|i| decimal_value(name, *start + *step * Decimal::from(i as i64)))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    if values.is_empty() {
        return Err(OptimizerError::ParameterGeneration(format!(
            "Range for '{name}' yields no values."
        )));
    }
    Ok(values)
}

/// Rejects linear ranges longer than `MAX_AXIS_VALUES` before they are expanded.
fn check_axis_len(name: &str, count: i128) -> Result<(), OptimizerError> {
    if count > MAX_AXIS_VALUES as i128 {
        return Err(OptimizerError::ParameterGeneration(format!(
            "Range for '{name}' yields {count} values; at most {MAX_AXIS_VALUES} are allowed."
        )));
    }
    Ok(())
}

fn decimal_value(name: &str, value: Decimal) -> Result<Value, OptimizerError> {
    value
        .normalize()
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| {
            OptimizerError::ParameterGeneration(format!("'{name}' value {value} is not a finite number"))
        })
}
