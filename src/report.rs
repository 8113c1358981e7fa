//! Report writers: per-run JSON, fund/bet history CSVs and the
//! human-readable summary digest.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::metrics::GoNoGo;
use crate::simulation::{MonteCarloResult, SimulationResult, WindowResult};

fn write_error(path: &Path, err: impl std::fmt::Display) -> SimError {
    SimError::OutputWriteFailed(format!("{}: {err}", path.display()))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| write_error(dir, e))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| write_error(path, e))?;
    fs::write(path, text).map_err(|e| write_error(path, e))
}

/// Write every configured artifact for one replay. Returns the paths
/// written.
pub fn write_run_report(
    result: &SimulationResult,
    judgment: &GoNoGo,
    config: &SimulationConfig,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let mut written = Vec::new();

    if config.output.formats.json {
        let path = dir.join("report.json");
        let value = json!({
            "summary": {
                "initial_fund": result.initial_fund,
                "final_fund": result.final_fund,
                "profit": result.profit(),
                "cancelled": result.cancelled,
            },
            "metrics": result.metrics,
            "judgment": judgment,
            "config": config,
        });
        write_json(&path, &value)?;
        written.push(path);
    }

    if config.output.formats.csv {
        let fund_path = dir.join("fund_history.csv");
        write_fund_history(result, &fund_path)?;
        written.push(fund_path);

        let bets_path = dir.join("bet_history.csv");
        write_bet_history(result, &bets_path)?;
        written.push(bets_path);
    }

    if config.output.formats.txt {
        let path = dir.join("summary.txt");
        fs::write(&path, summary_text(result, judgment)).map_err(|e| write_error(&path, e))?;
        written.push(path);
    }

    Ok(written)
}

/// One row per settled ticket with the fund state around it.
fn write_fund_history(result: &SimulationResult, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| write_error(path, e))?;
    writer
        .write_record([
            "date",
            "race_id",
            "fund_before",
            "stake",
            "payout",
            "fund_after",
            "cumulative_profit",
            "drawdown_pct",
        ])
        .map_err(|e| write_error(path, e))?;

    let mut peak = result.initial_fund;
    for record in &result.bet_history {
        peak = peak.max(record.fund_after);
        let drawdown = if peak > 0 {
            (peak - record.fund_after) as f64 / peak as f64 * 100.0
        } else {
            0.0
        };
        writer
            .write_record([
                record
                    .race_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                record.race_id.clone(),
                record.fund_before.to_string(),
                record.ticket.amount.to_string(),
                record.payout.to_string(),
                record.fund_after.to_string(),
                (record.fund_after - result.initial_fund).to_string(),
                format!("{drawdown:.2}"),
            ])
            .map_err(|e| write_error(path, e))?;
    }
    writer.flush().map_err(|e| write_error(path, e))
}

fn write_bet_history(result: &SimulationResult, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| write_error(path, e))?;
    writer
        .write_record([
            "index",
            "date",
            "race_id",
            "kind",
            "numbers",
            "strategy",
            "odds",
            "odds_estimated",
            "weight",
            "amount",
            "is_hit",
            "payout",
            "profit",
        ])
        .map_err(|e| write_error(path, e))?;

    for (i, record) in result.bet_history.iter().enumerate() {
        let t = &record.ticket;
        writer
            .write_record([
                (i + 1).to_string(),
                record
                    .race_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                record.race_id.clone(),
                t.kind.to_string(),
                t.numbers_str(),
                t.strategy_name.clone(),
                format!("{:.1}", t.odds),
                t.odds_estimated.to_string(),
                format!("{:.3}", t.weight.unwrap_or(1.0)),
                t.amount.to_string(),
                record.is_hit.to_string(),
                record.payout.to_string(),
                record.profit().to_string(),
            ])
            .map_err(|e| write_error(path, e))?;
    }
    writer.flush().map_err(|e| write_error(path, e))
}

/// Human-readable digest.
pub fn summary_text(result: &SimulationResult, judgment: &GoNoGo) -> String {
    let m = &result.metrics;
    let sep = "=".repeat(60);
    let sub = "-".repeat(60);
    let mut lines = vec![
        sep.clone(),
        "Simulation Summary".to_string(),
        sep.clone(),
        format!("Initial fund:     {:>14} yen", result.initial_fund),
        format!("Final fund:       {:>14} yen", result.final_fund),
        format!("Profit/loss:      {:>+14} yen", result.profit()),
        sub.clone(),
        format!("Races bet:        {:>14}", m.total_races),
        format!("Tickets placed:   {:>14}", m.total_bets),
        format!("Hits:             {:>14}", m.total_hits),
        format!("Hit rate:         {:>13.2}%", m.hit_rate),
        format!("ROI:              {:>13.2}%", m.roi),
        format!("CAGR:             {:>13.2}%", m.cagr * 100.0),
        format!(
            "Max drawdown:     {:>13.2}%  ({} tickets from peak)",
            m.max_drawdown, m.max_drawdown_duration
        ),
        format!("Sharpe ratio:     {:>14.3}", m.sharpe_ratio),
        match m.sortino_ratio {
            Some(s) => format!("Sortino ratio:    {s:>14.3}"),
            None => "Sortino ratio:    no losing bets".to_string(),
        },
        format!("VaR:              {:>13.2}%", m.value_at_risk * 100.0),
        format!("CVaR:             {:>13.2}%", m.cvar * 100.0),
        format!("Longest losing run: {:>12}", m.max_consecutive_losses),
    ];

    if m.estimated_odds_bets > 0 {
        lines.push(format!(
            "Note: {} tickets were priced by the place-odds fallback",
            m.estimated_odds_bets
        ));
    }
    if result.cancelled {
        lines.push("Note: the replay was cancelled before completion".to_string());
    }

    lines.push(sub);
    lines.push(format!(
        "Decision: {}",
        if judgment.go { "GO" } else { "NO-GO" }
    ));
    for reason in &judgment.reasons_for {
        lines.push(format!("  + {reason}"));
    }
    for reason in &judgment.reasons_against {
        lines.push(format!("  - {reason}"));
    }
    lines.push(sep);
    lines.push(String::new());
    lines.join("\n")
}

/// Monte Carlo aggregate report.
pub fn write_monte_carlo_report(
    result: &MonteCarloResult,
    config: &SimulationConfig,
    dir: &Path,
) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join("monte_carlo.json");
    let value = json!({
        "num_trials": result.num_trials,
        "seed": result.seed,
        "method": config.monte_carlo.method,
        "cancelled": result.cancelled,
        "summary": result.summary,
        "config": config,
    });
    write_json(&path, &value)?;
    Ok(path)
}

/// One entry per walk-forward window.
pub fn write_walk_forward_report(
    windows: &[WindowResult],
    config: &SimulationConfig,
    dir: &Path,
) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join("walk_forward.json");
    let entries: Vec<serde_json::Value> = windows
        .iter()
        .map(|w| {
            json!({
                "train_start": w.train_start,
                "train_end": w.train_end,
                "test_start": w.test_start,
                "test_end": w.test_end,
                "final_fund": w.result.final_fund,
                "metrics": w.result.metrics,
            })
        })
        .collect();
    let value = json!({
        "windows": entries,
        "config": config,
    });
    write_json(&path, &value)?;
    Ok(path)
}

/// Strategy comparison over one dataset: JSON plus a ranking CSV.
pub fn write_comparison_report(
    entries: &[(String, SimulationResult)],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;

    let json_path = dir.join("comparison.json");
    let mut ranking: Vec<&(String, SimulationResult)> = entries.iter().collect();
    ranking.sort_by(|a, b| {
        b.1.metrics
            .roi
            .partial_cmp(&a.1.metrics.roi)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let value = json!({
        "strategies": entries
            .iter()
            .map(|(name, result)| {
                json!({
                    "name": name,
                    "initial_fund": result.initial_fund,
                    "final_fund": result.final_fund,
                    "metrics": result.metrics,
                })
            })
            .collect::<Vec<_>>(),
        "ranking": ranking
            .iter()
            .enumerate()
            .map(|(i, (name, result))| {
                json!({ "rank": i + 1, "name": name, "roi": result.metrics.roi })
            })
            .collect::<Vec<_>>(),
    });
    write_json(&json_path, &value)?;

    let csv_path = dir.join("comparison.csv");
    let mut writer = csv::Writer::from_path(&csv_path).map_err(|e| write_error(&csv_path, e))?;
    writer
        .write_record([
            "strategy",
            "initial_fund",
            "final_fund",
            "total_bets",
            "hit_rate",
            "roi",
            "max_drawdown",
        ])
        .map_err(|e| write_error(&csv_path, e))?;
    for (name, result) in entries {
        let m = &result.metrics;
        writer
            .write_record([
                name.clone(),
                result.initial_fund.to_string(),
                result.final_fund.to_string(),
                m.total_bets.to_string(),
                format!("{:.2}", m.hit_rate),
                format!("{:.2}", m.roi),
                format!("{:.2}", m.max_drawdown),
            ])
            .map_err(|e| write_error(&csv_path, e))?;
    }
    writer.flush().map_err(|e| write_error(&csv_path, e))?;

    Ok(vec![json_path, csv_path])
}
