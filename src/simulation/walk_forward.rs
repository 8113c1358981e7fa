//! Walk-forward windowing: rolling train/test windows over the date
//! axis, one replay per test window.
//!
//! Parameter optimization on the train window is an extension point;
//! the default keeps the same strategy configuration throughout, so
//! the train window only anchors the date arithmetic.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::WalkForwardSection;
use crate::error::Result;
use crate::models::Race;

use super::engine::{SimulationEngine, SimulationResult};

/// One test window's replay, tagged with its date ranges. End dates
/// are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub result: SimulationResult,
}

impl SimulationEngine {
    /// Slide a train/test window across the race dates and replay each
    /// test window.
    pub fn run_walk_forward(
        &self,
        races: &[Race],
        initial_fund: i64,
        config: &WalkForwardSection,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<WindowResult>> {
        let mut dated: Vec<(NaiveDate, &Race)> = Vec::new();
        let mut undated = 0usize;
        for race in races {
            match race.date() {
                Some(date) => dated.push((date, race)),
                None => undated += 1,
            }
        }
        if undated > 0 {
            warn!(count = undated, "races without a valid date excluded from walk-forward");
        }
        if dated.is_empty() {
            return Ok(Vec::new());
        }
        dated.sort_by_key(|(date, race)| (*date, race.sort_key()));

        let first = dated[0].0;
        let last = dated[dated.len() - 1].0;

        let train = Duration::days(config.train_period_days);
        let test = Duration::days(config.test_period_days);
        let step = Duration::days(config.step_days);

        let mut windows = Vec::new();
        let mut cursor = first + train;

        // run while the test window does not extend past the last race
        while cursor + test <= last + Duration::days(1) {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    break;
                }
            }

            let test_end = cursor + test;
            let window_races: Vec<&Race> = dated
                .iter()
                .filter(|(date, _)| *date >= cursor && *date < test_end)
                .map(|(_, race)| *race)
                .collect();

            let result = self.run_sequence(&window_races, initial_fund, cancel)?;
            windows.push(WindowResult {
                train_start: cursor - train,
                train_end: cursor,
                test_start: cursor,
                test_end,
                result,
            });

            cursor += step;
        }

        Ok(windows)
    }
}
