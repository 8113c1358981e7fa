//! Single-pass chronological replay.
//!
//! The order of operations per ticket is exact: deduct the stake,
//! settle, credit the payout, record. The fund state between deduction
//! and credit is what drawdown calculations observe.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bankroll::BankrollManager;
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::filter::RaceFilter;
use crate::metrics::{self, SimulationMetrics};
use crate::models::{BetRecord, Race};
use crate::settlement;
use crate::strategy::Strategy;

/// Everything a finished replay hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub initial_fund: i64,
    pub final_fund: i64,
    /// Initial fund prepended; one entry per settled ticket after it.
    pub fund_history: Vec<i64>,
    pub bet_history: Vec<BetRecord>,
    pub metrics: SimulationMetrics,
    /// True when the replay was cancelled between races.
    pub cancelled: bool,
}

impl SimulationResult {
    pub fn profit(&self) -> i64 {
        self.final_fund - self.initial_fund
    }
}

/// The replay driver. Holds only immutable collaborators; every run
/// owns its fund state, so one engine can drive many trials.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    strategy: Strategy,
    bankroll: BankrollManager,
    filter: RaceFilter,
    confidence_level: f64,
}

impl SimulationEngine {
    pub fn new(strategy: Strategy, bankroll: BankrollManager, filter: RaceFilter) -> Self {
        SimulationEngine {
            strategy,
            bankroll,
            filter,
            confidence_level: 0.95,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        Ok(SimulationEngine {
            strategy: config.build_strategy()?,
            bankroll: config.build_bankroll()?,
            filter: config.build_filter(),
            confidence_level: config.monte_carlo.confidence_level,
        })
    }

    pub fn with_confidence_level(mut self, confidence_level: f64) -> Self {
        self.confidence_level = confidence_level;
        self
    }

    pub(crate) fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub(crate) fn bankroll(&self) -> &BankrollManager {
        &self.bankroll
    }

    pub(crate) fn filter(&self) -> &RaceFilter {
        &self.filter
    }

    /// Replay races in chronological order.
    pub fn run(
        &self,
        races: &[Race],
        initial_fund: i64,
        cancel: Option<&AtomicBool>,
    ) -> Result<SimulationResult> {
        let mut ordered: Vec<&Race> = races.iter().collect();
        ordered.sort_by_key(|r| r.sort_key());
        self.run_sequence(&ordered, initial_fund, cancel)
    }

    /// Replay races in the order given. The Monte Carlo bootstrap uses
    /// this directly so resampled sequences keep their drawn order.
    pub(crate) fn run_sequence(
        &self,
        races: &[&Race],
        initial_fund: i64,
        cancel: Option<&AtomicBool>,
    ) -> Result<SimulationResult> {
        let mut fund = initial_fund;
        let mut fund_history = vec![initial_fund];
        let mut bet_history: Vec<BetRecord> = Vec::new();
        let mut cancelled = false;

        let min_bet = self.bankroll.constraints().min_bet;
        let stop_loss_level =
            (initial_fund as f64 * self.bankroll.constraints().stop_loss_threshold) as i64;

        let mut day_key: Option<(i32, u32)> = None;
        let mut day_spent = 0i64;

        'replay: for race in races {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }

            let decision = self.filter.evaluate(race);
            if !decision.accept {
                continue;
            }

            let race_day = (race.year, race.kaisai_date);
            if day_key != Some(race_day) {
                day_key = Some(race_day);
                day_spent = 0;
            }
            let mut race_spent = 0i64;

            for mut ticket in self.strategy.generate_tickets(race) {
                let stake = self.bankroll.size(
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

                let fund_before = fund;
                fund -= stake;
                race_spent += stake;
                day_spent += stake;

                let settled = settlement::evaluate(&ticket, race)?;
                fund += settled.payout;

                debug!(
                    race_id = %race.race_id(),
                    ticket = %ticket,
                    hit = settled.is_hit,
                    payout = settled.payout,
                    fund,
                    "ticket settled"
                );

                bet_history.push(BetRecord {
                    race_id: race.race_id(),
                    race_date: race.date(),
                    ticket,
                    is_hit: settled.is_hit,
                    payout: settled.payout,
                    fund_before,
                    fund_after: fund,
                });
                fund_history.push(fund);

                if fund < min_bet || fund <= stop_loss_level {
                    info!(fund, "fund exhausted or stop-loss reached, ending replay");
                    break 'replay;
                }
            }
        }

        let metrics = metrics::calculate(&fund_history, &bet_history, self.confidence_level);
        Ok(SimulationResult {
            initial_fund,
            final_fund: fund,
            fund_history,
            bet_history,
            metrics,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bankroll::{BankrollMethod, FundConstraints};
    use crate::filter::FilterConfig;
    use crate::models::{FinishPosition, Horse, OddsTable, Surface};
    use crate::strategy::OddsBand;

    /// A race where the predicted top pick is horse #3 at the given
    /// odds, finishing at `pick_finish`. Field of 12.
    fn pick_race(kaisai_date: u32, odds: f64, pick_finish: u32) -> Race {
        let horses = (1..=12u8)
            .map(|i| {
                // horse #3 takes pick_finish; the horse whose natural
                // position that is takes 3; everyone else keeps theirs
                let finish = if i == 3 {
                    pick_finish
                } else if i as u32 == pick_finish {
                    3
                } else {
                    i as u32
                };
                let mut h = Horse::new(
                    i,
                    format!("h{i}"),
                    if i == 3 { odds } else { 10.0 },
                    i as u32,
                    FinishPosition::from_raw(finish),
                    if i == 3 { 1 } else { i as u32 + 1 },
                    if i == 3 { 0.5 } else { 0.1 },
                )
                .unwrap();
                h.upset_prob = 0.0;
                h
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

    fn winning_race(kaisai_date: u32) -> Race {
        pick_race(kaisai_date, 4.0, 1)
    }

    fn losing_race(kaisai_date: u32) -> Race {
        pick_race(kaisai_date, 4.0, 5)
    }

    fn fixed_engine(bet_amount: i64, constraints: FundConstraints) -> SimulationEngine {
        SimulationEngine::new(
            Strategy::FavoriteWin {
                top_n: 1,
                band: OddsBand::default(),
            },
            BankrollManager::new(BankrollMethod::Fixed { bet_amount }, constraints),
            RaceFilter::new(FilterConfig::accept_all()),
        )
    }

    #[test]
    fn test_single_race_hit() {
        // favorite_win(top_n=1), fixed 1000, initial 100000: one hit at 4.0
        let engine = fixed_engine(1000, FundConstraints::default());
        let races = vec![winning_race(401)];
        let result = engine.run(&races, 100_000, None).unwrap();

        assert_eq!(result.bet_history.len(), 1);
        let record = &result.bet_history[0];
        assert_eq!(record.ticket.amount, 1000);
        assert!(record.is_hit);
        assert_eq!(record.payout, 4000);
        assert_eq!(record.fund_after, 103_000);
        assert_eq!(result.final_fund, 103_000);
        assert!((result.metrics.roi - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_race_miss() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let races = vec![losing_race(401)];
        let result = engine.run(&races, 100_000, None).unwrap();

        assert_eq!(result.bet_history.len(), 1);
        let record = &result.bet_history[0];
        assert!(!record.is_hit);
        assert_eq!(record.payout, 0);
        assert_eq!(record.fund_after, 99_000);
        assert!((result.metrics.roi - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_fund_bookkeeping_invariants() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let races: Vec<Race> = (1..=8).map(|d| {
            if d % 2 == 0 {
                winning_race(400 + d)
            } else {
                losing_race(400 + d)
            }
        })
        .collect();
        let result = engine.run(&races, 100_000, None).unwrap();

        assert_eq!(result.fund_history[0], 100_000);
        assert_eq!(result.fund_history.len(), result.bet_history.len() + 1);
        for record in &result.bet_history {
            assert_eq!(
                record.fund_after,
                record.fund_before - record.ticket.amount + record.payout
            );
            assert!(record.ticket.amount >= 100);
            assert_eq!(record.ticket.amount % 100, 0);
            assert!(record.ticket.amount <= record.fund_before);
        }
        for (i, record) in result.bet_history.iter().enumerate() {
            assert_eq!(result.fund_history[i + 1], record.fund_after);
        }
    }

    #[test]
    fn test_races_replayed_chronologically() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let mut early = winning_race(401);
        early.year = 2022;
        let late = losing_race(115);
        // given out of order
        let races = vec![late.clone(), early.clone()];
        let result = engine.run(&races, 100_000, None).unwrap();
        assert_eq!(result.bet_history[0].race_id, early.race_id());
        assert_eq!(result.bet_history[1].race_id, late.race_id());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let races: Vec<Race> = (1..=6)
            .map(|d| if d % 3 == 0 { winning_race(400 + d) } else { losing_race(400 + d) })
            .collect();
        let a = engine.run(&races, 100_000, None).unwrap();
        let b = engine.run(&races, 100_000, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stop_loss_terminates_replay() {
        // 2500 lost per race; the 20th settled ticket reaches the
        // 50% stop-loss line and the 21st is never placed.
        let constraints = FundConstraints {
            stop_loss_threshold: 0.5,
            ..FundConstraints::default()
        };
        let engine = fixed_engine(2500, constraints);
        let races: Vec<Race> = (1..=30).map(|d| losing_race(400 + d)).collect();
        let result = engine.run(&races, 100_000, None).unwrap();

        assert_eq!(result.bet_history.len(), 20);
        assert_eq!(result.final_fund, 50_000);
        assert_eq!(result.metrics.total_bets, 20);
        assert_eq!(result.metrics.max_consecutive_losses, 20);
    }

    #[test]
    fn test_insufficient_fund_ends_run_normally() {
        // Burn the fund below min_bet; the run completes without error.
        let constraints = FundConstraints {
            max_bet_per_ticket: 100_000,
            max_bet_per_race: 1_000_000,
            max_bet_per_day: 10_000_000,
            ..FundConstraints::default()
        };
        let engine = fixed_engine(60_000, constraints);
        let races: Vec<Race> = (1..=5).map(|d| losing_race(400 + d)).collect();
        let result = engine.run(&races, 100_000, None).unwrap();

        // 100000 -> 40000 -> 0, then stop: the sized stake tracks the
        // remaining fund
        assert!(result.final_fund < 100);
        assert!(!result.bet_history.is_empty());
        for record in &result.bet_history {
            assert!(record.ticket.amount <= record.fund_before);
        }
    }

    #[test]
    fn test_empty_race_list() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let result = engine.run(&[], 100_000, None).unwrap();
        assert!(result.bet_history.is_empty());
        assert_eq!(result.fund_history, vec![100_000]);
        assert_eq!(result.final_fund, 100_000);
        assert_eq!(result.metrics, SimulationMetrics::default());
    }

    #[test]
    fn test_filtered_race_generates_nothing() {
        let engine = SimulationEngine::new(
            Strategy::FavoriteWin {
                top_n: 1,
                band: OddsBand::default(),
            },
            BankrollManager::new(
                BankrollMethod::Fixed { bet_amount: 1000 },
                FundConstraints::default(),
            ),
            RaceFilter::new(FilterConfig::default()), // min 12 horses
        );
        let mut small = winning_race(401);
        small.horses.truncate(8);
        let result = engine.run(&[small], 100_000, None).unwrap();
        assert!(result.bet_history.is_empty());
    }

    #[test]
    fn test_result_unavailable_is_fatal() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let mut race = winning_race(401);
        for h in &mut race.horses {
            h.finish = FinishPosition::Unknown;
        }
        let err = engine.run(&[race], 100_000, None).unwrap_err();
        assert!(matches!(err, crate::error::SimError::ResultUnavailable(_)));
    }

    #[test]
    fn test_cancellation_between_races() {
        let engine = fixed_engine(1000, FundConstraints::default());
        let cancel = AtomicBool::new(true);
        let races: Vec<Race> = (1..=4).map(|d| winning_race(400 + d)).collect();
        let result = engine.run(&races, 100_000, Some(&cancel)).unwrap();
        assert!(result.cancelled);
        assert!(result.bet_history.is_empty());
        assert_eq!(result.final_fund, 100_000);
    }

    #[test]
    fn test_per_race_budget_caps_tickets() {
        // top_n=3 emits three tickets; the race budget only fits two.
        let constraints = FundConstraints {
            max_bet_per_race: 2000,
            ..FundConstraints::default()
        };
        let engine = SimulationEngine::new(
            Strategy::FavoriteWin {
                top_n: 3,
                band: OddsBand::default(),
            },
            BankrollManager::new(BankrollMethod::Fixed { bet_amount: 1000 }, constraints),
            RaceFilter::new(FilterConfig::accept_all()),
        );
        let result = engine.run(&[winning_race(401)], 100_000, None).unwrap();
        assert_eq!(result.bet_history.len(), 2);
    }

    #[test]
    fn test_per_day_budget_spans_races_in_a_day() {
        let constraints = FundConstraints {
            max_bet_per_day: 2000,
            ..FundConstraints::default()
        };
        let engine = fixed_engine(1000, constraints);
        // three races on the same kaisai_date, one on the next day
        let mut same_day: Vec<Race> = (1..=3)
            .map(|n| {
                let mut r = losing_race(401);
                r.race_number = n;
                r
            })
            .collect();
        same_day.push(losing_race(402));
        let result = engine.run(&same_day, 100_000, None).unwrap();
        // two tickets fit on day 401, budget resets for day 402
        assert_eq!(result.bet_history.len(), 3);
    }

    #[test]
    fn test_single_horse_race_emits_no_combination_tickets() {
        let engine = SimulationEngine::new(
            Strategy::BoxQuinella {
                box_size: 4,
                band: OddsBand::default(),
            },
            BankrollManager::new(
                BankrollMethod::Fixed { bet_amount: 1000 },
                FundConstraints::default(),
            ),
            RaceFilter::new(FilterConfig::accept_all()),
        );
        let mut race = winning_race(401);
        race.horses.truncate(1);
        race.horses[0].finish = FinishPosition::Finished(1);
        let result = engine.run(&[race], 100_000, None).unwrap();
        assert!(result.bet_history.is_empty());
    }
}
