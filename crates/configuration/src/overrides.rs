//! Late binding of strategy and risk parameters.
//!
//! The optimizer never edits configuration in place. It asks for a rewritten copy
//! of the base `Config` with one `ParameterSet` applied.

use crate::error::ConfigError;
use crate::optimizer_config::ParameterSet;
use crate::settings::Config;
use core_types::StrategyId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

const RISK_PREFIX: &str = "risk.";
const BRACKET_PREFIX: &str = "bracket.";

impl Config {
    /// Returns a copy of this configuration with `params` applied.
    ///
    /// Plain keys address the parameter block of `strategy`; `risk.<field>` and
    /// `bracket.<field>` address the risk and signal-bracket blocks. Integer fields
    /// round fractional values, so blended recommendations stay valid.
    pub fn with_overrides(
        &self,
        strategy: StrategyId,
        params: &ParameterSet,
    ) -> Result<Config, ConfigError> {
        let mut risk = Vec::new();
        let mut bracket = Vec::new();
        let mut own = Vec::new();
        for (key, value) in params {
            if let Some(field) = key.strip_prefix(RISK_PREFIX) {
                risk.push((field, value));
            } else if let Some(field) = key.strip_prefix(BRACKET_PREFIX) {
                bracket.push((field, value));
            } else {
                own.push((key.as_str(), value));
            }
        }

        let mut config = self.clone();
        config.risk_management = merge(&self.risk_management, "risk_management", &risk)?;
        config.strategies.bracket = merge(&self.strategies.bracket, "bracket", &bracket)?;

        let strategies = &self.strategies;
        match strategy {
            StrategyId::MaCrossover => {
                config.strategies.ma_crossover = merge(&strategies.ma_crossover, strategy.name(), &own)?
            }
            StrategyId::SuperTrend => {
                config.strategies.super_trend = merge(&strategies.super_trend, strategy.name(), &own)?
            }
            StrategyId::ProbReversion => {
                config.strategies.prob_reversion =
                    merge(&strategies.prob_reversion, strategy.name(), &own)?
            }
            StrategyId::Momentum => {
                config.strategies.momentum = merge(&strategies.momentum, strategy.name(), &own)?
            }
            StrategyId::Breakout => {
                config.strategies.breakout = merge(&strategies.breakout, strategy.name(), &own)?
            }
            StrategyId::Grid => config.strategies.grid = merge(&strategies.grid, strategy.name(), &own)?,
        }

        config.validate()?;
        Ok(config)
    }

    /// The current parameter block of `strategy`, as a flat parameter set.
    pub fn strategy_parameters(&self, strategy: StrategyId) -> Result<ParameterSet, ConfigError> {
        let strategies = &self.strategies;
        let value = match strategy {
            StrategyId::MaCrossover => serde_json::to_value(&strategies.ma_crossover)?,
            StrategyId::SuperTrend => serde_json::to_value(&strategies.super_trend)?,
            StrategyId::ProbReversion => serde_json::to_value(&strategies.prob_reversion)?,
            StrategyId::Momentum => serde_json::to_value(&strategies.momentum)?,
            StrategyId::Breakout => serde_json::to_value(&strategies.breakout)?,
            StrategyId::Grid => serde_json::to_value(&strategies.grid)?,
        };
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(ConfigError::Override(format!(
                "parameters of {strategy} did not serialize to a table: {other}"
            ))),
        }
    }
}

fn merge<T>(target: &T, section: &str, overrides: &[(&str, &Value)]) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    if overrides.is_empty() {
        return Ok(target.clone());
    }
    let mut value = serde_json::to_value(target)?;
    let table = value
        .as_object_mut()
        .ok_or_else(|| ConfigError::Override(format!("{section} is not a table")))?;

    for (key, new_value) in overrides {
        let current = table.get(*key).ok_or_else(|| {
            ConfigError::Override(format!("unknown parameter '{key}' for {section}"))
        })?;
        let coerced = coerce_like(current, new_value).ok_or_else(|| {
            ConfigError::Override(format!("'{key}' of {section} cannot take the value {new_value}"))
        })?;
        table.insert((*key).to_string(), coerced);
    }
    Ok(serde_json::from_value(value)?)
}

/// Shapes `new` like `current`: integers stay integers, numbers stay numbers.
fn coerce_like(current: &Value, new: &Value) -> Option<Value> {
    match current {
        Value::Number(n) if n.is_u64() || n.is_i64() => {
            let rounded = new.as_f64()?.round();
            if rounded < 0.0 {
                return Some(Value::Number(Number::from(rounded as i64)));
            }
            Some(Value::Number(Number::from(rounded as u64)))
        }
        Value::Number(_) => Number::from_f64(new.as_f64()?).map(Value::Number),
        _ => Some(new.clone()),
    }
}
