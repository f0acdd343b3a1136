//! Letter grade derived from a `PerformanceReport`.
//!
//! The rating is a recomputable summary. It is never stored in place of the report.

use crate::report::PerformanceReport;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    fn from_score(score: u32) -> Self {
        match score {
            80.. => Grade::A,
            60..=79 => Grade::B,
            40..=59 => Grade::C,
            20..=39 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::A => "A (Excellent)",
            Grade::B => "B (Good)",
            Grade::C => "C (Average)",
            Grade::D => "D (Poor)",
            Grade::F => "F (Failed)",
        }
    }

    pub fn assessment(&self) -> &'static str {
        match self {
            Grade::A => "Strong strategy, suitable for live trading",
            Grade::B => "Promising strategy, needs optimization",
            Grade::C => "Needs significant improvement",
            Grade::D => "Not recommended for live trading",
            Grade::F => "Strategy is not profitable",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Points per rubric component. The maxima are 30/20/20/15/15.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total_return: u32,
    pub win_rate: u32,
    pub profit_factor: u32,
    pub sharpe: u32,
    pub drawdown: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.total_return + self.win_rate + self.profit_factor + self.sharpe + self.drawdown
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub score: u32,
    pub grade: Grade,
    pub assessment: String,
    pub breakdown: ScoreBreakdown,
}

/// First matching `(exclusive lower bound, points)` row, else zero.
fn tiered(value: Decimal, table: &[(Decimal, u32)]) -> u32 {
    table.iter().find(|(bound, _)| value > *bound).map_or(0, |(_, points)| *points)
}

impl Rating {
    pub fn from_report(report: &PerformanceReport) -> Self {
        let total_return = tiered(
            report.total_return_pct,
            &[(dec!(20), 30), (dec!(10), 25), (dec!(5), 20), (dec!(0), 15), (dec!(-5), 10), (dec!(-10), 5)],
        );
        let win_rate = report.win_rate_pct.map_or(0, |w| {
            tiered(w, &[(dec!(60), 20), (dec!(50), 15), (dec!(40), 10), (dec!(30), 5)])
        });
        // No losing trade: an unbounded profit factor if anything was won.
        let profit_factor = match report.profit_factor {
            Some(pf) => tiered(pf, &[(dec!(2), 20), (dec!(1.5), 15), (dec!(1), 10), (dec!(0.8), 5)]),
            None if report.gross_profit > Decimal::ZERO => 20,
            None => 0,
        };
        let sharpe = report
            .sharpe_ratio
            .map_or(0, |s| tiered(s, &[(dec!(2), 15), (dec!(1), 10), (dec!(0.5), 5)]));
        let drawdown = match report.max_drawdown_pct.abs() {
            dd if dd < dec!(5) => 15,
            dd if dd < dec!(10) => 10,
            dd if dd < dec!(20) => 5,
            _ => 0,
        };

        let breakdown = ScoreBreakdown { total_return, win_rate, profit_factor, sharpe, drawdown };
        let score = breakdown.total();
        let grade = Grade::from_score(score);
        Self { score, grade, assessment: grade.assessment().to_string(), breakdown }
    }
}
