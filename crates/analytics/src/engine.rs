use crate::error::AnalyticsError;
use crate::report::PerformanceReport;
use core_types::{EquityPoint, Trade};
use rust_decimal::{Decimal, MathematicalOps};
use std::time::Duration;

/// A stateless calculator for deriving performance metrics from trading activity.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `trades` - A slice of all completed `Trade`s from a trading session.
    /// * `equity_curve` - One point per bar, starting with the initial balance.
    /// * `initial_capital` - The starting capital of the trading session.
    /// * `periods_per_year` - Bars per year, used to annualize the Sharpe ratio.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PerformanceReport` or an `AnalyticsError`.
    pub fn calculate(
        &self,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        periods_per_year: u32,
    ) -> Result<PerformanceReport, AnalyticsError> {
        if initial_capital <= Decimal::ZERO {
            return Err(AnalyticsError::InvalidInitialCapital(initial_capital.to_string()));
        }
        if periods_per_year == 0 {
            return Err(AnalyticsError::InvalidAnnualization(periods_per_year));
        }
        if let Some(i) = equity_curve.windows(2).position(|w| w[1].timestamp < w[0].timestamp) {
            return Err(AnalyticsError::UnorderedEquityCurve(i + 1));
        }

        let mut report = PerformanceReport::new(initial_capital);
        self.calculate_profitability(trades, initial_capital, &mut report);
        self.calculate_drawdown(equity_curve, initial_capital, &mut report);
        self.calculate_time_metrics(trades, &mut report);
        self.calculate_ratios(equity_curve, periods_per_year, &mut report);

        tracing::debug!(
            trades = report.total_trades,
            total_return_pct = %report.total_return_pct.round_dp(2),
            max_drawdown_pct = %report.max_drawdown_pct.round_dp(2),
            "Performance report calculated"
        );
        Ok(report)
    }

    /// Calculates all profitability-related metrics.
    fn calculate_profitability(
        &self,
        trades: &[Trade],
        initial_capital: Decimal,
        report: &mut PerformanceReport,
    ) {
        report.total_trades = trades.len();
        let mut r_sum = Decimal::ZERO;
        let mut r_count = 0usize;

        for trade in trades {
            let pnl = trade.realized_pnl;
            report.total_net_profit += pnl;
            report.total_fees += trade.fee_paid;
            report.total_slippage += trade.slippage_cost;
            report.exits.record(trade.exit_reason);

            if trade.is_win() {
                report.gross_profit += pnl;
                report.winning_trades += 1;
            } else {
                report.gross_loss += pnl.abs();
                report.losing_trades += 1;
            }
            if let Some(r) = trade.r_multiple() {
                r_sum += r;
                r_count += 1;
            }
        }

        // --- Ratios ---
        if report.gross_loss > Decimal::ZERO {
            report.profit_factor = Some(report.gross_profit / report.gross_loss);
        }

        if report.total_trades > 0 {
            report.win_rate_pct = Some(
                (Decimal::from(report.winning_trades) / Decimal::from(report.total_trades))
                    * Decimal::ONE_HUNDRED,
            );
        }

        if report.winning_trades > 0 {
            report.average_win = report.gross_profit / Decimal::from(report.winning_trades);
        }

        if report.losing_trades > 0 {
            report.average_loss = report.gross_loss / Decimal::from(report.losing_trades);
            if report.average_loss > Decimal::ZERO {
                report.payoff_ratio = Some(report.average_win / report.average_loss);
            }
        }

        if r_count > 0 {
            report.expectancy_r = Some(r_sum / Decimal::from(r_count));
        }

        report.final_equity = initial_capital + report.total_net_profit;
        report.total_return_pct = (report.total_net_profit / initial_capital) * Decimal::ONE_HUNDRED;
    }

    /// Largest peak-to-trough decline, both in quote currency and relative to the peak.
    fn calculate_drawdown(
        &self,
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        report: &mut PerformanceReport,
    ) {
        let mut peak = equity_curve.first().map_or(initial_capital, |p| p.equity);

        for point in equity_curve {
            if point.equity > peak {
                peak = point.equity;
            }
            let drawdown = peak - point.equity;
            if drawdown > report.max_drawdown {
                report.max_drawdown = drawdown;
            }
            if peak > Decimal::ZERO {
                let drawdown_pct = drawdown / peak * Decimal::ONE_HUNDRED;
                if drawdown_pct > report.max_drawdown_pct {
                    report.max_drawdown_pct = drawdown_pct;
                }
            }
        }
    }

    /// Calculates all ratio-based metrics like Sharpe and Calmar.
    fn calculate_ratios(
        &self,
        equity_curve: &[EquityPoint],
        periods_per_year: u32,
        report: &mut PerformanceReport,
    ) {
        // --- Calmar Ratio ---
        if report.max_drawdown_pct > Decimal::ZERO {
            report.calmar_ratio = Some(report.total_return_pct / report.max_drawdown_pct);
        }

        // --- Sharpe Ratio ---
        // Per-bar returns; the risk-free rate is taken as zero.
        let returns: Vec<Decimal> = equity_curve
            .windows(2)
            .filter(|w| w[0].equity > Decimal::ZERO)
            .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
            .collect();
        if returns.len() < 2 {
            return;
        }

        let n = Decimal::from(returns.len());
        let mean = returns.iter().sum::<Decimal>() / n;
        let variance = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / n;
        let (Some(std_dev), Some(annualization)) =
            (variance.sqrt(), Decimal::from(periods_per_year).sqrt())
        else {
            return;
        };
        if std_dev > Decimal::ZERO {
            report.sharpe_ratio = Some(mean / std_dev * annualization);
        }
    }

    /// Calculates time-based metrics.
    fn calculate_time_metrics(&self, trades: &[Trade], report: &mut PerformanceReport) {
        if trades.is_empty() {
            return;
        }
        let total: Duration = trades
            .iter()
            .map(|t| (t.exit_timestamp - t.entry_timestamp).to_std().unwrap_or(Duration::ZERO))
            .sum();
        report.average_holding_period = total / trades.len() as u32;
    }
}
