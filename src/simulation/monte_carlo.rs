//! Monte Carlo resampling of the single-pass replay.
//!
//! Trials run in parallel; each trial derives its own RNG stream from
//! the master seed and the trial index, so results are identical
//! across runs and across degrees of parallelism. Aggregation only
//! depends on the multiset of per-trial outcomes collected in trial
//! order.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{McMethod, MonteCarloSection};
use crate::error::Result;
use crate::metrics::percentile;
use crate::models::{Race, Ticket};

use super::engine::SimulationEngine;

/// Pluggable per-ticket hit probability for the probability-based
/// mode. Implementations must return a value in [0, 1].
pub trait HitProbEstimator: Sync {
    fn estimate(&self, ticket: &Ticket, race: &Race) -> f64;
}

/// Default estimator: the implied probability already used by Kelly
/// sizing, `ev / odds`, clamped into [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpliedProbability;

impl HitProbEstimator for ImpliedProbability {
    fn estimate(&self, ticket: &Ticket, _race: &Race) -> f64 {
        if ticket.odds <= 0.0 {
            return 0.0;
        }
        (ticket.expected_value / ticket.odds).clamp(0.0, 1.0)
    }
}

/// Summary statistics over per-trial final funds. Probabilities are
/// fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: i64,
    pub max: i64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
    /// Fraction of trials ending below 10% of the initial fund.
    pub bankruptcy_prob: f64,
    /// Fraction of trials ending at or above the target fund.
    pub target_prob: f64,
    /// Fraction of trials ending above the initial fund.
    pub profit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub num_trials: usize,
    pub seed: u64,
    pub final_funds: Vec<i64>,
    pub summary: MonteCarloSummary,
    /// Full per-trial fund histories when requested.
    pub histories: Option<Vec<Vec<i64>>>,
    pub cancelled: bool,
}

/// Deterministic per-trial seed: splitmix64 finalizer over the master
/// seed and the trial index, so per-trial draws never depend on worker
/// scheduling.
fn child_seed(master_seed: u64, trial_index: u64) -> u64 {
    let mut z = master_seed ^ trial_index.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

struct Trial {
    final_fund: i64,
    history: Option<Vec<i64>>,
}

impl SimulationEngine {
    /// Run the configured Monte Carlo mode over `num_trials` resampled
    /// replays and aggregate the final funds.
    pub fn run_monte_carlo(
        &self,
        races: &[Race],
        initial_fund: i64,
        config: &MonteCarloSection,
        seed: u64,
        target_fund: i64,
        estimator: &dyn HitProbEstimator,
        cancel: Option<&AtomicBool>,
    ) -> Result<MonteCarloResult> {
        let mut ordered: Vec<&Race> = races.iter().collect();
        ordered.sort_by_key(|r| r.sort_key());

        let outcomes: Result<Vec<Option<Trial>>> = (0..config.num_trials)
            .into_par_iter()
            .map(|trial_index| {
                if let Some(flag) = cancel {
                    if flag.load(Ordering::Relaxed) {
                        return Ok(None);
                    }
                }
                let mut rng = ChaCha8Rng::seed_from_u64(child_seed(seed, trial_index as u64));
                let trial = match config.method {
                    McMethod::Bootstrap => {
                        self.bootstrap_trial(&ordered, initial_fund, config, &mut rng)?
                    }
                    McMethod::ProbabilityBased => self.probability_trial(
                        &ordered,
                        initial_fund,
                        config,
                        estimator,
                        &mut rng,
                    ),
                };
                Ok(Some(trial))
            })
            .collect();
        let outcomes = outcomes?;

        let cancelled = outcomes.iter().any(|t| t.is_none());
        let mut final_funds = Vec::with_capacity(outcomes.len());
        let mut histories = config.keep_histories.then(Vec::new);
        for trial in outcomes.into_iter().flatten() {
            final_funds.push(trial.final_fund);
            if let (Some(all), Some(history)) = (histories.as_mut(), trial.history) {
                all.push(history);
            }
        }

        let summary = summarize(&final_funds, initial_fund, target_fund);
        Ok(MonteCarloResult {
            num_trials: config.num_trials,
            seed,
            final_funds,
            summary,
            histories,
            cancelled,
        })
    }

    /// Draw |races| races with replacement and replay the resample in
    /// its drawn order.
    fn bootstrap_trial(
        &self,
        ordered: &[&Race],
        initial_fund: i64,
        config: &MonteCarloSection,
        rng: &mut ChaCha8Rng,
    ) -> Result<Trial> {
        let resample: Vec<&Race> = if ordered.is_empty() {
            Vec::new()
        } else {
            (0..ordered.len())
                .map(|_| ordered[rng.gen_range(0..ordered.len())])
                .collect()
        };
        let result = self.run_sequence(&resample, initial_fund, None)?;
        Ok(Trial {
            final_fund: result.final_fund,
            history: config.keep_histories.then_some(result.fund_history),
        })
    }

    /// Replay races in original order, substituting a synthetic
    /// hit/miss drawn with the estimator's probability.
    fn probability_trial(
        &self,
        ordered: &[&Race],
        initial_fund: i64,
        config: &MonteCarloSection,
        estimator: &dyn HitProbEstimator,
        rng: &mut ChaCha8Rng,
    ) -> Trial {
        let mut fund = initial_fund;
        let mut history = vec![initial_fund];

        let min_bet = self.bankroll().constraints().min_bet;
        let stop_loss_level =
            (initial_fund as f64 * self.bankroll().constraints().stop_loss_threshold) as i64;

        let mut day_key: Option<(i32, u32)> = None;
        let mut day_spent = 0i64;

        'trial: for race in ordered {
            let decision = self.filter().evaluate(race);
            if !decision.accept {
                continue;
            }

            let race_day = (race.year, race.kaisai_date);
            if day_key != Some(race_day) {
                day_key = Some(race_day);
                day_spent = 0;
            }
            let mut race_spent = 0i64;

            for mut ticket in self.strategy().generate_tickets(race) {
                let stake = self.bankroll().size(
                    &ticket,
                    fund,
                    decision.tier_multiplier,
                    race_spent,
                    day_spent,
                );
                if stake == 0 {
                    continue;
                }
                ticket.amount = stake;

                fund -= stake;
                race_spent += stake;
                day_spent += stake;

                let p = estimator.estimate(&ticket, race).clamp(0.0, 1.0);
                if rng.gen::<f64>() < p {
                    fund += (ticket.amount as f64 * ticket.odds) as i64;
                }
                history.push(fund);

                if fund < min_bet || fund <= stop_loss_level {
                    break 'trial;
                }
            }
        }

        Trial {
            final_fund: fund,
            history: config.keep_histories.then_some(history),
        }
    }
}

fn summarize(final_funds: &[i64], initial_fund: i64, target_fund: i64) -> MonteCarloSummary {
    if final_funds.is_empty() {
        return MonteCarloSummary {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0,
            max: 0,
            percentile_5: 0.0,
            percentile_25: 0.0,
            percentile_75: 0.0,
            percentile_95: 0.0,
            bankruptcy_prob: 0.0,
            target_prob: 0.0,
            profit_rate: 0.0,
        };
    }

    let n = final_funds.len() as f64;
    let mut sorted: Vec<f64> = final_funds.iter().map(|&f| f as f64).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;

    let bankruptcy_line = (initial_fund as f64 * 0.10) as i64;
    let bankrupt = final_funds.iter().filter(|&&f| f < bankruptcy_line).count();
    let reached = final_funds.iter().filter(|&&f| f >= target_fund).count();
    let profitable = final_funds.iter().filter(|&&f| f > initial_fund).count();

    MonteCarloSummary {
        mean,
        median: percentile(&sorted, 50.0),
        std_dev: variance.sqrt(),
        min: *final_funds.iter().min().unwrap_or(&0),
        max: *final_funds.iter().max().unwrap_or(&0),
        percentile_5: percentile(&sorted, 5.0),
        percentile_25: percentile(&sorted, 25.0),
        percentile_75: percentile(&sorted, 75.0),
        percentile_95: percentile(&sorted, 95.0),
        bankruptcy_prob: bankrupt as f64 / n,
        target_prob: reached as f64 / n,
        profit_rate: profitable as f64 / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bankroll::{BankrollManager, BankrollMethod, FundConstraints};
    use crate::filter::{FilterConfig, RaceFilter};
    use crate::models::{FinishPosition, Horse, OddsTable, Surface};
    use crate::strategy::{OddsBand, Strategy};

    fn race(kaisai_date: u32, pick_wins: bool) -> Race {
        let horses = (1..=12u8)
            .map(|i| {
                let finish = match (i, pick_wins) {
                    (3, true) => 1,
                    (3, false) => 5,
                    (1, true) => 3,
                    (5, false) => 3,
                    (n, _) => n as u32,
                };
                Horse::new(
                    i,
                    format!("h{i}"),
                    if i == 3 { 4.0 } else { 10.0 },
                    i as u32,
                    FinishPosition::from_raw(finish),
                    if i == 3 { 1 } else { i as u32 + 1 },
                    if i == 3 { 0.5 } else { 0.1 },
                )
                .unwrap()
            })
            .collect();
        Race {
            track: "Tokyo".into(),
            year: 2023,
            kaisai_date,
            race_number: 11,
            surface: Surface::Turf,
            distance: 1600,
            confidence: 1.0,
            is_maiden: false,
            is_bad_weather: false,
            horses,
            payouts: OddsTable::new(),
        }
    }

    fn engine() -> SimulationEngine {
        SimulationEngine::new(
            Strategy::FavoriteWin {
                top_n: 1,
                band: OddsBand::default(),
            },
            BankrollManager::new(
                BankrollMethod::Fixed { bet_amount: 1000 },
                FundConstraints::default(),
            ),
            RaceFilter::new(FilterConfig::accept_all()),
        )
    }

    fn mixed_races() -> Vec<Race> {
        (1..=5)
            .map(|d| race(400 + d, d % 2 == 0))
            .collect()
    }

    fn section(num_trials: usize, method: McMethod) -> MonteCarloSection {
        MonteCarloSection {
            num_trials,
            method,
            confidence_level: 0.95,
            target_fund: None,
            keep_histories: false,
        }
    }

    #[test]
    fn test_bootstrap_reproducible_with_same_seed() {
        let races = mixed_races();
        let e = engine();
        let config = section(1000, McMethod::Bootstrap);

        let a = e
            .run_monte_carlo(&races, 100_000, &config, 42, 200_000, &ImpliedProbability, None)
            .unwrap();
        let b = e
            .run_monte_carlo(&races, 100_000, &config, 42, 200_000, &ImpliedProbability, None)
            .unwrap();
        assert_eq!(a.final_funds, b.final_funds);
        assert_eq!(a.summary, b.summary);

        let c = e
            .run_monte_carlo(&races, 100_000, &config, 43, 200_000, &ImpliedProbability, None)
            .unwrap();
        assert_ne!(a.final_funds, c.final_funds);
    }

    #[test]
    fn test_bootstrap_parallelism_invariant() {
        let races = mixed_races();
        let e = engine();
        let config = section(200, McMethod::Bootstrap);

        let parallel = e
            .run_monte_carlo(&races, 100_000, &config, 42, 200_000, &ImpliedProbability, None)
            .unwrap();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let serial = pool.install(|| {
            e.run_monte_carlo(&races, 100_000, &config, 42, 200_000, &ImpliedProbability, None)
                .unwrap()
        });

        assert_eq!(parallel.final_funds, serial.final_funds);
    }

    #[test]
    fn test_summary_statistics_ordered() {
        let races = mixed_races();
        let e = engine();
        let config = section(500, McMethod::Bootstrap);
        let result = e
            .run_monte_carlo(&races, 100_000, &config, 7, 200_000, &ImpliedProbability, None)
            .unwrap();

        let s = &result.summary;
        assert_eq!(result.final_funds.len(), 500);
        assert!(s.min as f64 <= s.percentile_5);
        assert!(s.percentile_5 <= s.percentile_25);
        assert!(s.percentile_25 <= s.median);
        assert!(s.median <= s.percentile_75);
        assert!(s.percentile_75 <= s.percentile_95);
        assert!(s.percentile_95 <= s.max as f64);
        assert!(s.std_dev >= 0.0);
        assert!((0.0..=1.0).contains(&s.bankruptcy_prob));
        assert!((0.0..=1.0).contains(&s.profit_rate));
    }

    #[test]
    fn test_all_winning_races_have_full_profit_rate() {
        let races: Vec<Race> = (1..=5).map(|d| race(400 + d, true)).collect();
        let e = engine();
        let config = section(100, McMethod::Bootstrap);
        let result = e
            .run_monte_carlo(&races, 100_000, &config, 42, 200_000, &ImpliedProbability, None)
            .unwrap();
        // every resample only contains winning races at odds 4.0
        assert!((result.summary.profit_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.summary.bankruptcy_prob, 0.0);
    }

    #[test]
    fn test_empty_race_list() {
        let e = engine();
        let config = section(50, McMethod::Bootstrap);
        let result = e
            .run_monte_carlo(&[], 100_000, &config, 42, 200_000, &ImpliedProbability, None)
            .unwrap();
        assert_eq!(result.final_funds.len(), 50);
        assert!(result.final_funds.iter().all(|&f| f == 100_000));
    }

    #[test]
    fn test_probability_mode_reproducible() {
        let races = mixed_races();
        let e = engine();
        let config = section(300, McMethod::ProbabilityBased);

        let a = e
            .run_monte_carlo(&races, 100_000, &config, 11, 200_000, &ImpliedProbability, None)
            .unwrap();
        let b = e
            .run_monte_carlo(&races, 100_000, &config, 11, 200_000, &ImpliedProbability, None)
            .unwrap();
        assert_eq!(a.final_funds, b.final_funds);
    }

    #[test]
    fn test_probability_mode_with_certain_estimator() {
        struct AlwaysHit;
        impl HitProbEstimator for AlwaysHit {
            fn estimate(&self, _ticket: &Ticket, _race: &Race) -> f64 {
                1.0
            }
        }
        let races = mixed_races();
        let e = engine();
        let config = section(20, McMethod::ProbabilityBased);
        let result = e
            .run_monte_carlo(&races, 100_000, &config, 42, 200_000, &AlwaysHit, None)
            .unwrap();
        // five races, each a 1000-yen ticket at 4.0 paying 4000
        assert!(result.final_funds.iter().all(|&f| f == 115_000));
    }

    #[test]
    fn test_keep_histories() {
        let races = mixed_races();
        let e = engine();
        let config = MonteCarloSection {
            keep_histories: true,
            ..section(30, McMethod::Bootstrap)
        };
        let result = e
            .run_monte_carlo(&races, 100_000, &config, 42, 200_000, &ImpliedProbability, None)
            .unwrap();
        let histories = result.histories.unwrap();
        assert_eq!(histories.len(), 30);
        for history in &histories {
            assert_eq!(history[0], 100_000);
        }
    }

    #[test]
    fn test_cancellation_at_trial_boundaries() {
        let races = mixed_races();
        let e = engine();
        let config = section(100, McMethod::Bootstrap);
        let cancel = AtomicBool::new(true);
        let result = e
            .run_monte_carlo(
                &races,
                100_000,
                &config,
                42,
                200_000,
                &ImpliedProbability,
                Some(&cancel),
            )
            .unwrap();
        assert!(result.cancelled);
        assert!(result.final_funds.is_empty());
    }

    #[test]
    fn test_child_seed_disperses() {
        let a = child_seed(42, 0);
        let b = child_seed(42, 1);
        let c = child_seed(43, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        // deterministic
        assert_eq!(child_seed(42, 0), a);
    }
}
