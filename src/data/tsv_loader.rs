//! TSV dataset loader: one row per (race, horse), grouped into races.
//!
//! Invalid rows are logged and skipped; structurally invalid races
//! (duplicate horse numbers, empty field) are dropped whole. Only a
//! missing file, an unreadable document or a missing required column
//! fails the load.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{Result, SimError};
use crate::models::{FinishPosition, Horse, OddsTable, Race, Surface, TicketKind};

const REQUIRED_COLUMNS: [&str; 13] = [
    "track",
    "year",
    "kaisai_date",
    "race_number",
    "surface",
    "distance",
    "horse_number",
    "horse_name",
    "win_odds",
    "popularity",
    "actual_rank",
    "predicted_rank",
    "predicted_score",
];

/// Combination payout columns: (numbers column, odds column, kind).
const COMBO_COLUMNS: [(&str, &str, TicketKind); 7] = [
    ("quinella_numbers", "quinella_odds", TicketKind::Quinella),
    ("wide1_numbers", "wide1_odds", TicketKind::Wide),
    ("wide2_numbers", "wide2_odds", TicketKind::Wide),
    ("wide3_numbers", "wide3_odds", TicketKind::Wide),
    ("exacta_numbers", "exacta_odds", TicketKind::Exacta),
    ("trio_numbers", "trio_odds", TicketKind::Trio),
    ("trifecta_numbers", "trifecta_odds", TicketKind::Trifecta),
];

/// Loaded dataset plus the drop counters the CLI reports.
#[derive(Debug)]
pub struct LoadReport {
    pub races: Vec<Race>,
    pub skipped_rows: usize,
    pub dropped_races: usize,
}

/// Digest of a loaded dataset for the `validate` command.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub total_races: usize,
    pub total_horses: usize,
    pub tracks: Vec<String>,
    pub years: Vec<i32>,
    pub avg_field_size: f64,
}

impl LoadReport {
    pub fn summary(&self) -> DatasetSummary {
        let total_horses: usize = self.races.iter().map(|r| r.num_horses()).sum();
        let mut tracks: Vec<String> = self.races.iter().map(|r| r.track.clone()).collect();
        tracks.sort();
        tracks.dedup();
        let mut years: Vec<i32> = self.races.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        DatasetSummary {
            total_races: self.races.len(),
            total_horses,
            tracks,
            years,
            avg_field_size: if self.races.is_empty() {
                0.0
            } else {
                total_horses as f64 / self.races.len() as f64
            },
        }
    }
}

type RaceKey = (String, i32, u32, u32);

struct RaceBuilder {
    surface: Surface,
    distance: u32,
    confidence: f64,
    is_maiden: bool,
    is_bad_weather: bool,
    horses: Vec<Horse>,
    payouts: OddsTable,
}

/// Load a TSV dataset into races, in file order.
pub fn load(path: &Path) -> Result<LoadReport> {
    if !path.exists() {
        return Err(SimError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(|e| SimError::DatasetInvalidFormat(format!("{}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| SimError::DatasetInvalidFormat(format!("{}: {e}", path.display())))?;
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), i))
        .collect();

    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(required) {
            return Err(SimError::DatasetMissingColumn(required.to_string()));
        }
    }

    let mut order: Vec<RaceKey> = Vec::new();
    let mut builders: HashMap<RaceKey, RaceBuilder> = HashMap::new();
    let mut skipped_rows = 0usize;

    for (index, record) in reader.records().enumerate() {
        let line = index + 2; // 1-based, after the header
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), line, error = %e, "unreadable row skipped");
                skipped_rows += 1;
                continue;
            }
        };
        let row = Row {
            record: &record,
            columns: &columns,
        };
        if let Err(reason) = ingest_row(&row, &mut order, &mut builders) {
            warn!(path = %path.display(), line, reason, "invalid row skipped");
            skipped_rows += 1;
        }
    }

    let mut races = Vec::with_capacity(order.len());
    let mut dropped_races = 0usize;
    for key in order {
        let builder = match builders.remove(&key) {
            Some(b) => b,
            None => continue,
        };
        let race_id = format!("{}_{}_{:04}_{:02}", key.0, key.1, key.2, key.3);
        match finalize_race(key, builder) {
            Ok(race) => races.push(race),
            Err(reason) => {
                warn!(path = %path.display(), race_id, reason, "race dropped");
                dropped_races += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        races = races.len(),
        skipped_rows,
        dropped_races,
        "dataset loaded"
    );
    Ok(LoadReport {
        races,
        skipped_rows,
        dropped_races,
    })
}

struct Row<'a> {
    record: &'a csv::StringRecord,
    columns: &'a HashMap<String, usize>,
}

impl Row<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .get(name)
            .and_then(|&i| self.record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> std::result::Result<T, String> {
        let raw = self
            .get(name)
            .ok_or_else(|| format!("missing value for {name}"))?;
        raw.parse::<T>()
            .map_err(|_| format!("unparseable {name}: {raw:?}"))
    }

    fn parse_optional<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|raw| raw.parse().ok())
    }

    fn parse_flag(&self, name: &str) -> bool {
        matches!(
            self.get(name).map(str::to_ascii_lowercase).as_deref(),
            Some("1") | Some("true") | Some("yes")
        )
    }
}

fn ingest_row(
    row: &Row<'_>,
    order: &mut Vec<RaceKey>,
    builders: &mut HashMap<RaceKey, RaceBuilder>,
) -> std::result::Result<(), String> {
    let track: String = row.parse("track")?;
    let year: i32 = row.parse("year")?;
    let kaisai_date: u32 = row.parse("kaisai_date")?;
    let race_number: u32 = row.parse("race_number")?;

    let surface_raw: String = row.parse("surface")?;
    let surface =
        Surface::parse(&surface_raw).ok_or_else(|| format!("unknown surface: {surface_raw:?}"))?;
    let distance: u32 = row.parse("distance")?;

    let number: u8 = row.parse("horse_number")?;
    let name: String = row.parse("horse_name")?;
    let odds: f64 = row.parse("win_odds")?;
    let popularity: u32 = row.parse("popularity")?;
    let actual_rank: u32 = row.parse("actual_rank")?;
    let predicted_rank: u32 = row.parse("predicted_rank")?;
    let predicted_score: f64 = row.parse("predicted_score")?;

    let mut horse = Horse::new(
        number,
        name,
        odds,
        popularity,
        FinishPosition::from_raw(actual_rank),
        predicted_rank,
        predicted_score,
    )
    .map_err(|e| e.to_string())?;

    if let Some(upset_prob) = row.parse_optional::<f64>("upset_prob") {
        horse.upset_prob = upset_prob.clamp(0.0, 1.0);
    }
    horse.is_upset_candidate = row.parse_flag("is_upset_candidate");
    horse.place_odds_min = row.parse_optional("place_odds_min");
    horse.place_odds_max = row.parse_optional("place_odds_max");

    let key: RaceKey = (track, year, kaisai_date, race_number);
    let builder = match builders.entry(key.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            order.push(key);
            let mut payouts = OddsTable::new();
            ingest_payouts(row, &mut payouts);
            entry.insert(RaceBuilder {
                surface,
                distance,
                confidence: row.parse_optional("confidence").unwrap_or(1.0),
                is_maiden: row.parse_flag("is_maiden"),
                is_bad_weather: row.parse_flag("is_bad_weather"),
                horses: Vec::new(),
                payouts,
            })
        }
    };
    builder.horses.push(horse);
    Ok(())
}

/// Realized combination payouts are carried on the race's first row.
fn ingest_payouts(row: &Row<'_>, payouts: &mut OddsTable) {
    for (numbers_col, odds_col, kind) in COMBO_COLUMNS {
        let numbers = match row.get(numbers_col).and_then(parse_numbers) {
            Some(n) if n.len() == kind.arity() => n,
            _ => continue,
        };
        if let Some(odds) = row.parse_optional::<f64>(odds_col) {
            if odds > 0.0 {
                payouts.insert(kind, &numbers, odds);
            }
        }
    }
}

/// Dash-joined horse numbers, e.g. "5-7" or "2-5-9".
fn parse_numbers(raw: &str) -> Option<Vec<u8>> {
    raw.split('-')
        .map(|part| part.trim().parse::<u8>().ok())
        .collect()
}

fn finalize_race(key: RaceKey, builder: RaceBuilder) -> std::result::Result<Race, String> {
    if builder.horses.is_empty() {
        return Err("no valid horses".to_string());
    }
    let mut numbers: Vec<u8> = builder.horses.iter().map(|h| h.number).collect();
    numbers.sort_unstable();
    if numbers.windows(2).any(|w| w[0] == w[1]) {
        return Err("duplicate horse numbers".to_string());
    }

    let mut horses = builder.horses;
    horses.sort_by_key(|h| h.number);

    Ok(Race {
        track: key.0,
        year: key.1,
        kaisai_date: key.2,
        race_number: key.3,
        surface: builder.surface,
        distance: builder.distance,
        confidence: builder.confidence,
        is_maiden: builder.is_maiden,
        is_bad_weather: builder.is_bad_weather,
        horses,
        payouts: builder.payouts,
    })
}
