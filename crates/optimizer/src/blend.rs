//! Folding per-regime optima into one recommendation.

use configuration::ParameterSet;
use core_types::Regime;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// A parameter whose recommended value differs from the starting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub name: String,
    pub from: Option<Value>,
    pub to: Value,
}

/// Frequency-weighted average of the regime optima.
///
/// `optima` pairs each optimized regime's best parameters with its share of the
/// labeled bars; shares are renormalized over the regimes given. Numeric
/// parameters are averaged and stay integers when every optimum is an integer.
/// Other values, and parameters that only some regimes set, come from the most
/// frequent regime that has them.
pub fn blend(optima: &[(Regime, f64, &ParameterSet)]) -> ParameterSet {
    let mut names: Vec<&String> = optima.iter().flat_map(|(_, _, set)| set.keys()).collect();
    names.sort();
    names.dedup();

    let mut by_share: Vec<&(Regime, f64, &ParameterSet)> = optima.iter().collect();
    by_share.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut blended = ParameterSet::new();
    for name in names {
        let present: Vec<(f64, &Value)> = optima
            .iter()
            .filter_map(|(_, share, set)| set.get(name).map(|v| (*share, v)))
            .collect();
        let value = if present.len() == optima.len() {
            weighted_mean(&present)
        } else {
            None
        };
        let value = value.or_else(|| {
            by_share
                .iter()
                .find_map(|(_, _, set)| set.get(name).cloned())
        });
        if let Some(value) = value {
            blended.insert(name.clone(), value);
        }
    }
    blended
}

fn weighted_mean(values: &[(f64, &Value)]) -> Option<Value> {
    let total_weight: f64 = values.iter().map(|(w, _)| *w).sum();
    if total_weight <= 0.0 || !total_weight.is_finite() {
        return None;
    }
    let mut sum = 0.0;
    for (weight, value) in values {
        sum += weight * value.as_f64()?;
    }
    let mean = sum / total_weight;

    let all_integers = values.iter().all(|(_, v)| v.is_i64() || v.is_u64());
    if all_integers {
        return Some(Value::from(mean.round() as i64));
    }
    Number::from_f64(round_to(mean, 6)).map(Value::Number)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Parameters of `recommended` that differ from `base`.
pub fn diff(base: &ParameterSet, recommended: &ParameterSet) -> Vec<ParameterChange> {
    recommended
        .iter()
        .filter(|(name, value)| match base.get(*name) {
            Some(current) => !same_value(current, value),
            None => true,
        })
        .map(|(name, value)| ParameterChange {
            name: name.clone(),
            from: base.get(name).cloned(),
            to: value.clone(),
        })
        .collect()
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0),
        _ => a == b,
    }
}

/// One line naming the dominant regime(s) and how the recommendation was formed.
///
/// A regime counts as co-dominant when its share is within ten percentage points
/// of the largest.
pub fn rationale(distribution: &BTreeMap<Regime, f64>, optimized: &[Regime]) -> String {
    let mut ranked: Vec<(Regime, f64)> = distribution.iter().map(|(r, s)| (*r, *s)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| priority(a.0).cmp(&priority(b.0))));

    let Some(&(_, top)) = ranked.first() else {
        return "No bars were labeled; the starting parameters are kept.".to_string();
    };
    let dominant: Vec<String> = ranked
        .iter()
        .filter(|(_, share)| top - share <= 0.10)
        .map(|(regime, share)| format!("{regime} ({:.1}%)", share * 100.0))
        .collect();

    let head = match dominant.as_slice() {
        [only] => format!("The market was mostly {only}"),
        [rest @ .., last] => format!("The market split between {} and {last}", rest.join(", ")),
        [] => String::new(),
    };

    match optimized {
        [] => format!("{head}; no regime produced an acceptable run, so the starting parameters are kept."),
        [single] => format!("{head}; the recommendation is the {single} optimum."),
        many => {
            let names: Vec<&str> = many.iter().map(|r| r.as_str()).collect();
            format!(
                "{head}; the recommendation blends the {} optima weighted by how often each regime occurred.",
                names.join("/")
            )
        }
    }
}

fn priority(regime: Regime) -> usize {
    Regime::PRIORITY.iter().position(|r| *r == regime).unwrap_or(usize::MAX)
}
