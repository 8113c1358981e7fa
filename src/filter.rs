//! Per-race participation filter.
//!
//! Filter decisions are made once per race, before any ticket is
//! generated. The tier multiplier is the only piece of filter state
//! that crosses into bankroll sizing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Race, Surface};

/// Track handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackMode {
    #[default]
    None,
    Whitelist,
    Blacklist,
    Tiers,
}

/// Track class under tier mode. Scales the eventual stake instead of
/// rejecting the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub fn multiplier(&self) -> f64 {
        match self {
            Tier::Tier1 => 1.0,
            Tier::Tier2 => 0.8,
            Tier::Tier3 => 0.6,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackRule {
    #[serde(default)]
    pub mode: TrackMode,
    #[serde(default)]
    pub list: Vec<String>,
    #[serde(default)]
    pub tiers: HashMap<String, Tier>,
}

/// Configuration of the race filter, decoded from the `race_filter`
/// section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_min_horse_count")]
    pub min_horse_count: usize,
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default)]
    pub surface: Option<Surface>,
    #[serde(default)]
    pub distance_min: u32,
    #[serde(default = "default_distance_max")]
    pub distance_max: u32,
    #[serde(default)]
    pub tracks: TrackRule,
    #[serde(default)]
    pub skip_maiden: bool,
    #[serde(default)]
    pub skip_bad_weather: bool,
    #[serde(default)]
    pub skip_no_upset: bool,
}

fn default_min_horse_count() -> usize {
    12
}

fn default_distance_max() -> u32 {
    99_999
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_horse_count: default_min_horse_count(),
            min_confidence: 0.0,
            surface: None,
            distance_min: 0,
            distance_max: default_distance_max(),
            tracks: TrackRule::default(),
            skip_maiden: false,
            skip_bad_weather: false,
            skip_no_upset: false,
        }
    }
}

impl FilterConfig {
    /// A filter that accepts every race; used by tests and the
    /// `compare` command when no filter section is present.
    pub fn accept_all() -> FilterConfig {
        FilterConfig {
            min_horse_count: 0,
            ..FilterConfig::default()
        }
    }
}

/// Outcome of filtering one race.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDecision {
    pub accept: bool,
    pub reason: String,
    /// Stake scale from the track tier; 1.0 unless tier mode applies.
    pub tier_multiplier: f64,
}

impl FilterDecision {
    fn accepted(tier_multiplier: f64) -> FilterDecision {
        FilterDecision {
            accept: true,
            reason: String::new(),
            tier_multiplier,
        }
    }

    fn rejected(reason: impl Into<String>) -> FilterDecision {
        FilterDecision {
            accept: false,
            reason: reason.into(),
            tier_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RaceFilter {
    config: FilterConfig,
}

impl RaceFilter {
    pub fn new(config: FilterConfig) -> RaceFilter {
        RaceFilter { config }
    }

    /// Decide whether to participate in a race. Any failing condition
    /// rejects; tier mode contributes a multiplier instead.
    pub fn evaluate(&self, race: &Race) -> FilterDecision {
        let c = &self.config;

        if race.num_horses() < c.min_horse_count {
            return self.reject(race, format!("field size {} below minimum", race.num_horses()));
        }
        if race.confidence < c.min_confidence {
            return self.reject(race, format!("confidence {:.2} below minimum", race.confidence));
        }
        if let Some(surface) = c.surface {
            if race.surface != surface {
                return self.reject(race, format!("surface {} not selected", race.surface));
            }
        }
        if race.distance < c.distance_min || race.distance > c.distance_max {
            return self.reject(race, format!("distance {}m outside range", race.distance));
        }

        let mut tier_multiplier = 1.0;
        match c.tracks.mode {
            TrackMode::None => {}
            TrackMode::Whitelist => {
                if !c.tracks.list.iter().any(|t| t == &race.track) {
                    return self.reject(race, format!("track {} not on whitelist", race.track));
                }
            }
            TrackMode::Blacklist => {
                if c.tracks.list.iter().any(|t| t == &race.track) {
                    return self.reject(race, format!("track {} on blacklist", race.track));
                }
            }
            TrackMode::Tiers => {
                tier_multiplier = c
                    .tracks
                    .tiers
                    .get(&race.track)
                    .map(Tier::multiplier)
                    .unwrap_or(Tier::Tier3.multiplier());
            }
        }

        if c.skip_maiden && race.is_maiden {
            return self.reject(race, "maiden race");
        }
        if c.skip_bad_weather && race.is_bad_weather {
            return self.reject(race, "bad weather");
        }
        if c.skip_no_upset && !race.horses.iter().any(|h| h.is_upset_candidate) {
            return self.reject(race, "no upset candidate in field");
        }

        FilterDecision::accepted(tier_multiplier)
    }

    fn reject(&self, race: &Race, reason: impl Into<String>) -> FilterDecision {
        let decision = FilterDecision::rejected(reason);
        debug!(race_id = %race.race_id(), reason = %decision.reason, "race skipped");
        decision
    }
}
