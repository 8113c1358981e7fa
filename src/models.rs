//! Core data model: horses, races, tickets and bet records.
//!
//! Races and horses are shared-read inputs and never mutated by the
//! engine. Tickets are owned by the simulation driver from the moment a
//! strategy emits them until they are recorded.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Raw rank at or above this value marks a horse that did not finish.
const DNF_SENTINEL: u32 = 90;

/// Course surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Turf,
    Dirt,
}

impl Surface {
    /// Parse a surface cell. Accepts the English names and the
    /// localized forms seen in JRA exports.
    pub fn parse(value: &str) -> Option<Surface> {
        match value.trim() {
            "turf" | "Turf" | "TURF" | "芝" => Some(Surface::Turf),
            "dirt" | "Dirt" | "DIRT" | "ダート" | "ダ" => Some(Surface::Dirt),
            _ => None,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Turf => write!(f, "turf"),
            Surface::Dirt => write!(f, "dirt"),
        }
    }
}

/// The seven wagerable ticket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Win,
    Place,
    Quinella,
    Wide,
    Exacta,
    Trio,
    Trifecta,
}

impl TicketKind {
    /// Ordered kinds preserve position semantics (1st, 2nd, 3rd);
    /// unordered kinds canonicalize by ascending sort.
    pub fn is_ordered(&self) -> bool {
        matches!(self, TicketKind::Exacta | TicketKind::Trifecta)
    }

    /// Number of horses a ticket of this kind names.
    pub fn arity(&self) -> usize {
        match self {
            TicketKind::Win | TicketKind::Place => 1,
            TicketKind::Quinella | TicketKind::Wide | TicketKind::Exacta => 2,
            TicketKind::Trio | TicketKind::Trifecta => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TicketKind::Win => "win",
            TicketKind::Place => "place",
            TicketKind::Quinella => "quinella",
            TicketKind::Wide => "wide",
            TicketKind::Exacta => "exacta",
            TicketKind::Trio => "trio",
            TicketKind::Trifecta => "trifecta",
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Realized finishing position of one horse.
///
/// Replaces the raw-integer encoding of the input data (0 = unknown,
/// >= 90 = disqualified or scratched) with an explicit variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishPosition {
    Finished(u8),
    Unknown,
    DidNotFinish,
}

impl FinishPosition {
    pub fn from_raw(raw: u32) -> FinishPosition {
        match raw {
            0 => FinishPosition::Unknown,
            r if r >= DNF_SENTINEL => FinishPosition::DidNotFinish,
            r => FinishPosition::Finished(r as u8),
        }
    }

    pub fn rank(&self) -> Option<u8> {
        match self {
            FinishPosition::Finished(r) => Some(*r),
            _ => None,
        }
    }

    /// Finished first, second or third.
    pub fn in_frame(&self) -> bool {
        matches!(self, FinishPosition::Finished(r) if (1..=3).contains(r))
    }
}

/// One runner in a race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Horse {
    pub number: u8,
    pub name: String,
    /// Win odds at post time.
    pub odds: f64,
    /// Public backing rank, 1 = most backed.
    pub popularity: u32,
    pub finish: FinishPosition,
    /// Model rank, 1-based.
    pub predicted_rank: u32,
    /// Model score in [0, 1].
    pub predicted_score: f64,
    #[serde(default)]
    pub upset_prob: f64,
    #[serde(default)]
    pub is_upset_candidate: bool,
    #[serde(default)]
    pub place_odds_min: Option<f64>,
    #[serde(default)]
    pub place_odds_max: Option<f64>,
}

impl Horse {
    /// Build a horse, rejecting out-of-range numbers, non-positive
    /// odds and scores outside [0, 1].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: u8,
        name: impl Into<String>,
        odds: f64,
        popularity: u32,
        finish: FinishPosition,
        predicted_rank: u32,
        predicted_score: f64,
    ) -> Result<Horse> {
        if !(1..=18).contains(&number) {
            return Err(SimError::DatasetInvalidValue(format!(
                "horse number out of range: {number}"
            )));
        }
        if odds <= 0.0 {
            return Err(SimError::DatasetInvalidValue(format!(
                "non-positive odds {odds} for horse {number}"
            )));
        }
        if !(0.0..=1.0).contains(&predicted_score) {
            return Err(SimError::DatasetInvalidValue(format!(
                "predicted score {predicted_score} outside [0, 1] for horse {number}"
            )));
        }
        Ok(Horse {
            number,
            name: name.into(),
            odds,
            popularity,
            finish,
            predicted_rank,
            predicted_score,
            upset_prob: 0.0,
            is_upset_candidate: false,
            place_odds_min: None,
            place_odds_max: None,
        })
    }

    /// Win expected value: score times win odds.
    pub fn expected_value(&self) -> f64 {
        self.predicted_score * self.odds
    }

    pub fn in_frame(&self) -> bool {
        self.finish.in_frame()
    }
}

/// Realized combination odds for a race, keyed by ticket kind and
/// canonical horse numbers. Only combinations the dataset exposes are
/// present; strategies emit no ticket for absent entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OddsTable {
    entries: HashMap<TicketKind, HashMap<Vec<u8>, f64>>,
}

impl OddsTable {
    pub fn new() -> OddsTable {
        OddsTable::default()
    }

    pub fn insert(&mut self, kind: TicketKind, numbers: &[u8], odds: f64) {
        let key = canonicalize(kind, numbers);
        self.entries.entry(kind).or_default().insert(key, odds);
    }

    pub fn get(&self, kind: TicketKind, numbers: &[u8]) -> Option<f64> {
        let key = canonicalize(kind, numbers);
        self.entries.get(&kind).and_then(|m| m.get(&key)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical keying form: unordered kinds sort ascending, ordered
/// kinds keep position semantics.
pub fn canonicalize(kind: TicketKind, numbers: &[u8]) -> Vec<u8> {
    let mut key = numbers.to_vec();
    if !kind.is_ordered() {
        key.sort_unstable();
    }
    key
}

/// One race: identity, conditions, the field and realized payouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub track: String,
    pub year: i32,
    /// Meeting day encoded as MMDD.
    pub kaisai_date: u32,
    pub race_number: u32,
    pub surface: Surface,
    /// Distance in meters.
    pub distance: u32,
    /// Externally supplied per-race confidence score.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub is_maiden: bool,
    #[serde(default)]
    pub is_bad_weather: bool,
    /// Runners ordered by horse number.
    pub horses: Vec<Horse>,
    #[serde(default)]
    pub payouts: OddsTable,
}

fn default_confidence() -> f64 {
    1.0
}

impl Race {
    /// Canonical race identifier.
    pub fn race_id(&self) -> String {
        format!(
            "{}_{}_{:04}_{:02}",
            self.track, self.year, self.kaisai_date, self.race_number
        )
    }

    /// Calendar date of the meeting day, when the MMDD encoding is valid.
    pub fn date(&self) -> Option<NaiveDate> {
        let month = self.kaisai_date / 100;
        let day = self.kaisai_date % 100;
        NaiveDate::from_ymd_opt(self.year, month, day)
    }

    pub fn num_horses(&self) -> usize {
        self.horses.len()
    }

    pub fn horse(&self, number: u8) -> Option<&Horse> {
        self.horses.iter().find(|h| h.number == number)
    }

    /// Top n runners by predicted rank.
    pub fn top_predicted(&self, n: usize) -> Vec<&Horse> {
        let mut sorted: Vec<&Horse> = self.horses.iter().collect();
        sorted.sort_by_key(|h| h.predicted_rank);
        sorted.truncate(n);
        sorted
    }

    /// Flagged upset candidates, descending by upset probability.
    pub fn upset_candidates(&self) -> Vec<&Horse> {
        let mut candidates: Vec<&Horse> = self
            .horses
            .iter()
            .filter(|h| h.is_upset_candidate)
            .collect();
        candidates.sort_by(|a, b| {
            b.upset_prob
                .partial_cmp(&a.upset_prob)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    pub fn winner(&self) -> Option<&Horse> {
        self.horses.iter().find(|h| h.finish.rank() == Some(1))
    }

    /// Runners that finished in frame, ordered by finishing rank.
    pub fn in_frame(&self) -> Vec<&Horse> {
        let mut placed: Vec<&Horse> = self.horses.iter().filter(|h| h.in_frame()).collect();
        placed.sort_by_key(|h| h.finish.rank().unwrap_or(u8::MAX));
        placed
    }

    /// Horse numbers in finishing order, non-finishers excluded.
    pub fn placings(&self) -> Vec<u8> {
        let mut finished: Vec<&Horse> = self
            .horses
            .iter()
            .filter(|h| h.finish.rank().is_some())
            .collect();
        finished.sort_by_key(|h| h.finish.rank().unwrap_or(u8::MAX));
        finished.iter().map(|h| h.number).collect()
    }

    /// A result is usable for settlement once the winner is known.
    pub fn has_result(&self) -> bool {
        self.winner().is_some()
    }

    /// Replay ordering key.
    pub fn sort_key(&self) -> (i32, u32, u32) {
        (self.year, self.kaisai_date, self.race_number)
    }
}

/// A single wager: one kind, one set or sequence of horse numbers,
/// one stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub kind: TicketKind,
    /// Semantic order depends on the kind; see [`TicketKind::is_ordered`].
    pub horse_numbers: Vec<u8>,
    /// Odds at purchase.
    pub odds: f64,
    /// Stake in yen, a multiple of 100 once sized.
    pub amount: i64,
    pub strategy_name: String,
    pub expected_value: f64,
    /// Composite weight; absent means 1.0.
    #[serde(default)]
    pub weight: Option<f64>,
    /// True when the odds came from the place-odds fallback estimate.
    #[serde(default)]
    pub odds_estimated: bool,
}

impl Ticket {
    pub fn new(
        kind: TicketKind,
        horse_numbers: Vec<u8>,
        odds: f64,
        expected_value: f64,
        strategy_name: &str,
    ) -> Ticket {
        Ticket {
            kind,
            horse_numbers,
            odds,
            amount: 0,
            strategy_name: strategy_name.to_string(),
            expected_value,
            weight: None,
            odds_estimated: false,
        }
    }

    pub fn with_estimated_odds(mut self) -> Ticket {
        self.odds_estimated = true;
        self
    }

    /// Keying/comparison form of the horse numbers.
    pub fn canonical_numbers(&self) -> Vec<u8> {
        canonicalize(self.kind, &self.horse_numbers)
    }

    /// Dedup key used by the composite strategy.
    pub fn key(&self) -> (TicketKind, Vec<u8>) {
        (self.kind, self.canonical_numbers())
    }

    pub fn numbers_str(&self) -> String {
        self.canonical_numbers()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] {}yen", self.kind, self.numbers_str(), self.amount)
    }
}

/// Append-only record of one placed and settled ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub race_id: String,
    pub race_date: Option<NaiveDate>,
    pub ticket: Ticket,
    pub is_hit: bool,
    pub payout: i64,
    pub fund_before: i64,
    pub fund_after: i64,
}

impl BetRecord {
    pub fn profit(&self) -> i64 {
        self.payout - self.ticket.amount
    }

    /// Per-bet return relative to the fund before the bet.
    pub fn fund_return(&self) -> f64 {
        if self.fund_before == 0 {
            return 0.0;
        }
        (self.fund_after - self.fund_before) as f64 / self.fund_before as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horse(number: u8, odds: f64, predicted_rank: u32, rank: u32) -> Horse {
        Horse::new(
            number,
            format!("horse{number}"),
            odds,
            predicted_rank,
            FinishPosition::from_raw(rank),
            predicted_rank,
            0.5,
        )
        .unwrap()
    }

    fn sample_race() -> Race {
        Race {
            track: "Tokyo".into(),
            year: 2023,
            kaisai_date: 615,
            race_number: 11,
            surface: Surface::Turf,
            distance: 1600,
            confidence: 1.0,
            is_maiden: false,
            is_bad_weather: false,
            horses: vec![
                horse(1, 2.4, 1, 2),
                horse(2, 5.8, 2, 1),
                horse(3, 12.0, 3, 3),
                horse(4, 48.0, 4, 99),
            ],
            payouts: OddsTable::new(),
        }
    }

    #[test]
    fn test_horse_validation() {
        assert!(Horse::new(0, "x", 2.0, 1, FinishPosition::Unknown, 1, 0.5).is_err());
        assert!(Horse::new(19, "x", 2.0, 1, FinishPosition::Unknown, 1, 0.5).is_err());
        assert!(Horse::new(1, "x", 0.0, 1, FinishPosition::Unknown, 1, 0.5).is_err());
        assert!(Horse::new(1, "x", -1.5, 1, FinishPosition::Unknown, 1, 0.5).is_err());
        assert!(Horse::new(1, "x", 2.0, 1, FinishPosition::Unknown, 1, 1.2).is_err());
        assert!(Horse::new(18, "x", 2.0, 1, FinishPosition::Unknown, 1, 1.0).is_ok());
    }

    #[test]
    fn test_finish_position_from_raw() {
        assert_eq!(FinishPosition::from_raw(0), FinishPosition::Unknown);
        assert_eq!(FinishPosition::from_raw(1), FinishPosition::Finished(1));
        assert_eq!(FinishPosition::from_raw(18), FinishPosition::Finished(18));
        assert_eq!(FinishPosition::from_raw(90), FinishPosition::DidNotFinish);
        assert_eq!(FinishPosition::from_raw(99), FinishPosition::DidNotFinish);
    }

    #[test]
    fn test_in_frame() {
        assert!(FinishPosition::Finished(1).in_frame());
        assert!(FinishPosition::Finished(3).in_frame());
        assert!(!FinishPosition::Finished(4).in_frame());
        assert!(!FinishPosition::DidNotFinish.in_frame());
        assert!(!FinishPosition::Unknown.in_frame());
    }

    #[test]
    fn test_expected_value() {
        let h = horse(3, 12.0, 3, 3);
        assert!((h.expected_value() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_race_id_format() {
        let race = sample_race();
        assert_eq!(race.race_id(), "Tokyo_2023_0615_11");
    }

    #[test]
    fn test_race_date() {
        let race = sample_race();
        assert_eq!(
            race.date(),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );

        let mut bad = sample_race();
        bad.kaisai_date = 1345;
        assert!(bad.date().is_none());
    }

    #[test]
    fn test_top_predicted() {
        let race = sample_race();
        let top2 = race.top_predicted(2);
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].number, 1);
        assert_eq!(top2[1].number, 2);
    }

    #[test]
    fn test_winner_and_placings_skip_dnf() {
        let race = sample_race();
        assert_eq!(race.winner().unwrap().number, 2);
        // Horse 4 carries the DNF sentinel and never appears.
        assert_eq!(race.placings(), vec![2, 1, 3]);
        let frame: Vec<u8> = race.in_frame().iter().map(|h| h.number).collect();
        assert_eq!(frame, vec![2, 1, 3]);
    }

    #[test]
    fn test_upset_candidates_sorted_by_prob() {
        let mut race = sample_race();
        race.horses[2].is_upset_candidate = true;
        race.horses[2].upset_prob = 0.2;
        race.horses[3].is_upset_candidate = true;
        race.horses[3].upset_prob = 0.5;
        let ups: Vec<u8> = race.upset_candidates().iter().map(|h| h.number).collect();
        assert_eq!(ups, vec![4, 3]);
    }

    #[test]
    fn test_ticket_canonicalization() {
        let quinella = Ticket::new(TicketKind::Quinella, vec![7, 2], 11.5, 0.4, "test");
        assert_eq!(quinella.canonical_numbers(), vec![2, 7]);

        let exacta = Ticket::new(TicketKind::Exacta, vec![7, 2], 22.0, 0.3, "test");
        assert_eq!(exacta.canonical_numbers(), vec![7, 2]);
    }

    #[test]
    fn test_odds_table_unordered_lookup() {
        let mut table = OddsTable::new();
        table.insert(TicketKind::Quinella, &[5, 2], 14.3);
        assert_eq!(table.get(TicketKind::Quinella, &[2, 5]), Some(14.3));
        assert_eq!(table.get(TicketKind::Quinella, &[5, 2]), Some(14.3));
        assert_eq!(table.get(TicketKind::Quinella, &[2, 6]), None);

        table.insert(TicketKind::Exacta, &[5, 2], 30.1);
        assert_eq!(table.get(TicketKind::Exacta, &[5, 2]), Some(30.1));
        assert_eq!(table.get(TicketKind::Exacta, &[2, 5]), None);
    }

    #[test]
    fn test_bet_record_profit() {
        let mut ticket = Ticket::new(TicketKind::Win, vec![3], 4.0, 2.0, "test");
        ticket.amount = 1000;
        let record = BetRecord {
            race_id: "Tokyo_2023_0615_11".into(),
            race_date: NaiveDate::from_ymd_opt(2023, 6, 15),
            ticket,
            is_hit: true,
            payout: 4000,
            fund_before: 100_000,
            fund_after: 103_000,
        };
        assert_eq!(record.profit(), 3000);
        assert!((record.fund_return() - 0.03).abs() < 1e-9);
    }
}
