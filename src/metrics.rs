//! Risk/return metrics over fund and bet histories, and the Go/No-Go
//! judgment derived from them.

use serde::{Deserialize, Serialize};

use crate::models::BetRecord;

/// Evaluation metrics for one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub total_races: usize,
    pub total_bets: usize,
    pub total_hits: usize,
    pub total_invested: i64,
    pub total_payout: i64,
    /// Net profit in yen.
    pub profit: i64,
    /// Percent.
    pub hit_rate: f64,
    /// Percent: total payout over total invested.
    pub roi: f64,
    /// Same quantity as ROI, reported under its presentation name.
    pub recovery_rate: f64,
    pub cagr: f64,
    /// Percent, from the running-peak scan of the fund history.
    pub max_drawdown: f64,
    /// Index distance from the peak at the deepest drawdown.
    pub max_drawdown_duration: usize,
    pub sharpe_ratio: f64,
    /// None when there are no negative returns (the "infinite"
    /// sentinel); serialized as null.
    pub sortino_ratio: Option<f64>,
    pub value_at_risk: f64,
    pub cvar: f64,
    pub max_consecutive_losses: usize,
    pub max_consecutive_wins: usize,
    /// Tickets priced by the place-odds fallback; nonzero marks a
    /// lower-fidelity run.
    pub estimated_odds_bets: usize,
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        SimulationMetrics {
            total_races: 0,
            total_bets: 0,
            total_hits: 0,
            total_invested: 0,
            total_payout: 0,
            profit: 0,
            hit_rate: 0.0,
            roi: 0.0,
            recovery_rate: 0.0,
            cagr: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration: 0,
            sharpe_ratio: 0.0,
            sortino_ratio: Some(0.0),
            value_at_risk: 0.0,
            cvar: 0.0,
            max_consecutive_losses: 0,
            max_consecutive_wins: 0,
            estimated_odds_bets: 0,
        }
    }
}

/// Derive all per-run metrics from the fund history (initial fund
/// prepended) and the bet history.
pub fn calculate(
    fund_history: &[i64],
    bet_history: &[BetRecord],
    confidence_level: f64,
) -> SimulationMetrics {
    let mut m = SimulationMetrics::default();
    if bet_history.is_empty() {
        return m;
    }

    m.total_bets = bet_history.len();
    m.total_hits = bet_history.iter().filter(|b| b.is_hit).count();
    m.total_invested = bet_history.iter().map(|b| b.ticket.amount).sum();
    m.total_payout = bet_history.iter().map(|b| b.payout).sum();
    m.profit = m.total_payout - m.total_invested;
    m.estimated_odds_bets = bet_history
        .iter()
        .filter(|b| b.ticket.odds_estimated)
        .count();

    let mut race_ids: Vec<&str> = bet_history.iter().map(|b| b.race_id.as_str()).collect();
    race_ids.sort_unstable();
    race_ids.dedup();
    m.total_races = race_ids.len();

    m.hit_rate = m.total_hits as f64 / m.total_bets as f64 * 100.0;
    if m.total_invested > 0 {
        m.roi = m.total_payout as f64 / m.total_invested as f64 * 100.0;
    }
    m.recovery_rate = m.roi;

    let (max_dd, dd_duration) = max_drawdown(fund_history);
    m.max_drawdown = max_dd;
    m.max_drawdown_duration = dd_duration;

    m.cagr = cagr(fund_history, bet_history);

    let returns: Vec<f64> = bet_history.iter().map(|b| b.fund_return()).collect();
    m.sharpe_ratio = sharpe(&returns);
    m.sortino_ratio = sortino(&returns);

    let (var, cvar) = tail_risk(&returns, confidence_level);
    m.value_at_risk = var;
    m.cvar = cvar;

    let (wins, losses) = streaks(bet_history);
    m.max_consecutive_wins = wins;
    m.max_consecutive_losses = losses;

    m
}

/// Running-peak drawdown scan. Returns (max drawdown percent, index
/// distance from the peak where it occurred). Monotonic-up histories
/// yield (0, 0).
fn max_drawdown(fund_history: &[i64]) -> (f64, usize) {
    let mut peak = match fund_history.first() {
        Some(&f) => f,
        None => return (0.0, 0),
    };
    let mut peak_index = 0usize;
    let mut max_dd = 0.0f64;
    let mut max_duration = 0usize;

    for (i, &fund) in fund_history.iter().enumerate() {
        if fund > peak {
            peak = fund;
            peak_index = i;
            continue;
        }
        if peak > 0 {
            let dd = (peak - fund) as f64 / peak as f64 * 100.0;
            if dd > max_dd {
                max_dd = dd;
                max_duration = i - peak_index;
            }
        }
    }
    (max_dd, max_duration)
}

fn cagr(fund_history: &[i64], bet_history: &[BetRecord]) -> f64 {
    let initial = match fund_history.first() {
        Some(&f) => f,
        None => return 0.0,
    };
    let final_fund = match fund_history.last() {
        Some(&f) => f,
        None => return 0.0,
    };
    if initial <= 0 || final_fund <= 0 {
        return 0.0;
    }

    let first_date = bet_history.iter().find_map(|b| b.race_date);
    let last_date = bet_history.iter().rev().find_map(|b| b.race_date);
    let years = match (first_date, last_date) {
        (Some(first), Some(last)) => (last - first).num_days() as f64 / 365.25,
        _ => return 0.0,
    };
    if years <= 0.0 {
        return 0.0;
    }

    (final_fund as f64 / initial as f64).powf(1.0 / years) - 1.0
}

/// Mean over sample standard deviation of per-bet returns; 0 with
/// fewer than two returns or zero dispersion.
fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (returns.len() - 1) as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    mean / std
}

/// Mean return over the dispersion of negative returns. None (the
/// infinite sentinel) when no return is negative.
fn sortino(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return Some(0.0);
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let down_mean = downside.iter().sum::<f64>() / downside.len() as f64;
    let variance = downside
        .iter()
        .map(|r| (r - down_mean).powi(2))
        .sum::<f64>()
        / downside.len() as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        return Some(0.0);
    }
    Some(mean / std)
}

/// VaR at the configured confidence level and the conditional mean of
/// the tail at or below it.
fn tail_risk(returns: &[f64], confidence_level: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let var = percentile(&sorted, (1.0 - confidence_level) * 100.0);
    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= var).collect();
    let cvar = if tail.is_empty() {
        var
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };
    (var, cvar)
}

fn streaks(bet_history: &[BetRecord]) -> (usize, usize) {
    let mut max_wins = 0usize;
    let mut max_losses = 0usize;
    let mut wins = 0usize;
    let mut losses = 0usize;
    for record in bet_history {
        if record.is_hit {
            wins += 1;
            losses = 0;
            max_wins = max_wins.max(wins);
        } else {
            losses += 1;
            wins = 0;
            max_losses = max_losses.max(losses);
        }
    }
    (max_wins, max_losses)
}

/// Linear-interpolation percentile over a sorted slice, q in [0, 100].
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Outcome of the Go/No-Go predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoNoGo {
    pub go: bool,
    pub reasons_for: Vec<String>,
    pub reasons_against: Vec<String>,
}

/// Judge a run. Any No-Go condition forces No-Go regardless of the Go
/// side; otherwise Go iff every Go condition holds.
///
/// `bankruptcy_prob` is a fraction in [0, 1]; plain replays without a
/// Monte Carlo pass report it as 0.
pub fn judge(metrics: &SimulationMetrics, bankruptcy_prob: f64) -> GoNoGo {
    let mut reasons_for = Vec::new();
    let mut reasons_against = Vec::new();

    let mut no_go = false;
    if bankruptcy_prob >= 0.10 {
        no_go = true;
        reasons_against.push(format!(
            "bankruptcy probability {:.1}% at or above 10%",
            bankruptcy_prob * 100.0
        ));
    }
    if metrics.roi < 120.0 {
        no_go = true;
        reasons_against.push(format!("ROI {:.1}% below 120%", metrics.roi));
    }
    if metrics.max_consecutive_losses >= 30 {
        no_go = true;
        reasons_against.push(format!(
            "{} consecutive losses reaches 30",
            metrics.max_consecutive_losses
        ));
    }

    let mut all_go = true;
    if bankruptcy_prob <= 0.05 {
        reasons_for.push(format!(
            "bankruptcy probability {:.1}% within 5%",
            bankruptcy_prob * 100.0
        ));
    } else {
        all_go = false;
        reasons_against.push(format!(
            "bankruptcy probability {:.1}% above 5%",
            bankruptcy_prob * 100.0
        ));
    }
    if metrics.roi >= 150.0 {
        reasons_for.push(format!("ROI {:.1}% at or above 150%", metrics.roi));
    } else {
        all_go = false;
        if metrics.roi >= 120.0 {
            reasons_against.push(format!("ROI {:.1}% below 150%", metrics.roi));
        }
    }
    if metrics.max_drawdown <= 50.0 {
        reasons_for.push(format!(
            "max drawdown {:.1}% within 50%",
            metrics.max_drawdown
        ));
    } else {
        all_go = false;
        reasons_against.push(format!(
            "max drawdown {:.1}% above 50%",
            metrics.max_drawdown
        ));
    }

    GoNoGo {
        go: !no_go && all_go,
        reasons_for,
        reasons_against,
    }
}
