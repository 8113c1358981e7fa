//! Ticket generation strategies.
//!
//! One tagged variant per concrete strategy behind a single
//! [`Strategy::generate_tickets`] entry point; the factory of the
//! original design became [`Strategy::from_config`], a parser from a
//! name-plus-params record into the variant.

mod composite;
mod pairs;
mod place;
mod trio;
mod win;

pub use composite::CompositeStrategy;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::models::{Race, Ticket, TicketKind};

/// Odds bounds shared by every strategy. An unset bound never rejects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsBand {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl OddsBand {
    pub fn allows(&self, odds: f64) -> bool {
        self.min.map_or(true, |m| odds >= m) && self.max.map_or(true, |m| odds <= m)
    }
}

/// Parameter bag for the `strategy.params` config section. Every knob
/// has a default so configs only name what they change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub min_odds: Option<f64>,
    #[serde(default)]
    pub max_odds: Option<f64>,
    #[serde(default = "default_upset_threshold")]
    pub upset_threshold: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_min_expected_value")]
    pub min_expected_value: f64,
    #[serde(default = "default_max_tickets")]
    pub max_tickets: usize,
    #[serde(default = "default_max_counterparts")]
    pub max_counterparts: usize,
    #[serde(default = "default_box_size")]
    pub box_size: usize,
    #[serde(default = "default_first_leg")]
    pub first_leg: Vec<u32>,
    #[serde(default = "default_second_leg")]
    pub second_leg: Vec<u32>,
    #[serde(default = "default_third_leg")]
    pub third_leg: Vec<u32>,
}

fn default_top_n() -> usize {
    1
}
fn default_upset_threshold() -> f64 {
    0.1
}
fn default_max_candidates() -> usize {
    3
}
fn default_min_expected_value() -> f64 {
    1.0
}
fn default_max_tickets() -> usize {
    3
}
fn default_max_counterparts() -> usize {
    3
}
fn default_box_size() -> usize {
    4
}
fn default_first_leg() -> Vec<u32> {
    vec![1]
}
fn default_second_leg() -> Vec<u32> {
    vec![2, 3]
}
fn default_third_leg() -> Vec<u32> {
    vec![2, 3, 4, 5]
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            top_n: default_top_n(),
            min_odds: None,
            max_odds: None,
            upset_threshold: default_upset_threshold(),
            max_candidates: default_max_candidates(),
            min_expected_value: default_min_expected_value(),
            max_tickets: default_max_tickets(),
            max_counterparts: default_max_counterparts(),
            box_size: default_box_size(),
            first_leg: default_first_leg(),
            second_leg: default_second_leg(),
            third_leg: default_third_leg(),
        }
    }
}

impl StrategyParams {
    fn band(&self) -> OddsBand {
        OddsBand {
            min: self.min_odds,
            max: self.max_odds,
        }
    }
}

/// All fourteen concrete strategies plus the weighted composite.
#[derive(Debug, Clone)]
pub enum Strategy {
    FavoriteWin {
        top_n: usize,
        band: OddsBand,
    },
    LongshotWin {
        upset_threshold: f64,
        max_candidates: usize,
        band: OddsBand,
    },
    ValueWin {
        min_expected_value: f64,
        max_tickets: usize,
        band: OddsBand,
    },
    FavoritePlace {
        top_n: usize,
        band: OddsBand,
    },
    LongshotPlace {
        upset_threshold: f64,
        max_candidates: usize,
        band: OddsBand,
    },
    FavoriteQuinella {
        band: OddsBand,
    },
    FavoriteLongshotQuinella {
        max_counterparts: usize,
        band: OddsBand,
    },
    BoxQuinella {
        box_size: usize,
        band: OddsBand,
    },
    FavoriteWide {
        band: OddsBand,
    },
    FavoriteLongshotWide {
        max_counterparts: usize,
        band: OddsBand,
    },
    BoxWide {
        box_size: usize,
        band: OddsBand,
    },
    FavoriteTrio {
        band: OddsBand,
    },
    Favorite2LongshotTrio {
        max_counterparts: usize,
        band: OddsBand,
    },
    FormationTrio {
        first_leg: Vec<u32>,
        second_leg: Vec<u32>,
        third_leg: Vec<u32>,
        band: OddsBand,
    },
    Composite(CompositeStrategy),
}

impl Strategy {
    /// Map one race into candidate tickets. Zero entries is normal.
    pub fn generate_tickets(&self, race: &Race) -> Vec<Ticket> {
        match self {
            Strategy::FavoriteWin { top_n, band } => win::favorite_win(race, *top_n, *band),
            Strategy::LongshotWin {
                upset_threshold,
                max_candidates,
                band,
            } => win::longshot_win(race, *upset_threshold, *max_candidates, *band),
            Strategy::ValueWin {
                min_expected_value,
                max_tickets,
                band,
            } => win::value_win(race, *min_expected_value, *max_tickets, *band),
            Strategy::FavoritePlace { top_n, band } => place::favorite_place(race, *top_n, *band),
            Strategy::LongshotPlace {
                upset_threshold,
                max_candidates,
                band,
            } => place::longshot_place(race, *upset_threshold, *max_candidates, *band),
            Strategy::FavoriteQuinella { band } => {
                pairs::favorite_pair(race, TicketKind::Quinella, self.name(), *band)
            }
            Strategy::FavoriteLongshotQuinella {
                max_counterparts,
                band,
            } => pairs::favorite_longshot_pair(
                race,
                TicketKind::Quinella,
                self.name(),
                *max_counterparts,
                *band,
            ),
            Strategy::BoxQuinella { box_size, band } => {
                pairs::box_pair(race, TicketKind::Quinella, self.name(), *box_size, *band)
            }
            Strategy::FavoriteWide { band } => {
                pairs::favorite_pair(race, TicketKind::Wide, self.name(), *band)
            }
            Strategy::FavoriteLongshotWide {
                max_counterparts,
                band,
            } => pairs::favorite_longshot_pair(
                race,
                TicketKind::Wide,
                self.name(),
                *max_counterparts,
                *band,
            ),
            Strategy::BoxWide { box_size, band } => {
                pairs::box_pair(race, TicketKind::Wide, self.name(), *box_size, *band)
            }
            Strategy::FavoriteTrio { band } => trio::favorite_trio(race, *band),
            Strategy::Favorite2LongshotTrio {
                max_counterparts,
                band,
            } => trio::favorite2_longshot_trio(race, *max_counterparts, *band),
            Strategy::FormationTrio {
                first_leg,
                second_leg,
                third_leg,
                band,
            } => trio::formation_trio(race, first_leg, second_leg, third_leg, *band),
            Strategy::Composite(composite) => composite.generate_tickets(race),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::FavoriteWin { .. } => "favorite_win",
            Strategy::LongshotWin { .. } => "longshot_win",
            Strategy::ValueWin { .. } => "value_win",
            Strategy::FavoritePlace { .. } => "favorite_place",
            Strategy::LongshotPlace { .. } => "longshot_place",
            Strategy::FavoriteQuinella { .. } => "favorite_quinella",
            Strategy::FavoriteLongshotQuinella { .. } => "favorite_longshot_quinella",
            Strategy::BoxQuinella { .. } => "box_quinella",
            Strategy::FavoriteWide { .. } => "favorite_wide",
            Strategy::FavoriteLongshotWide { .. } => "favorite_longshot_wide",
            Strategy::BoxWide { .. } => "box_wide",
            Strategy::FavoriteTrio { .. } => "favorite_trio",
            Strategy::Favorite2LongshotTrio { .. } => "favorite2_longshot_trio",
            Strategy::FormationTrio { .. } => "formation_trio",
            Strategy::Composite(_) => "composite",
        }
    }

    /// Parse a strategy name plus parameters into a variant.
    pub fn from_config(name: &str, params: &StrategyParams) -> Result<Strategy> {
        let band = params.band();
        if let (Some(min), Some(max)) = (band.min, band.max) {
            if min > max {
                return Err(SimError::StrategyParamInvalid(format!(
                    "min_odds {min} exceeds max_odds {max}"
                )));
            }
        }

        let strategy = match name {
            "favorite_win" => Strategy::FavoriteWin {
                top_n: positive(params.top_n, "top_n")?,
                band,
            },
            "longshot_win" => Strategy::LongshotWin {
                upset_threshold: params.upset_threshold,
                max_candidates: positive(params.max_candidates, "max_candidates")?,
                band,
            },
            "value_win" => Strategy::ValueWin {
                min_expected_value: params.min_expected_value,
                max_tickets: positive(params.max_tickets, "max_tickets")?,
                band,
            },
            "favorite_place" => Strategy::FavoritePlace {
                top_n: positive(params.top_n, "top_n")?,
                band,
            },
            "longshot_place" => Strategy::LongshotPlace {
                upset_threshold: params.upset_threshold,
                max_candidates: positive(params.max_candidates, "max_candidates")?,
                band,
            },
            "favorite_quinella" => Strategy::FavoriteQuinella { band },
            "favorite_longshot_quinella" => Strategy::FavoriteLongshotQuinella {
                max_counterparts: positive(params.max_counterparts, "max_counterparts")?,
                band,
            },
            "box_quinella" => Strategy::BoxQuinella {
                box_size: at_least(params.box_size, 2, "box_size")?,
                band,
            },
            "favorite_wide" => Strategy::FavoriteWide { band },
            "favorite_longshot_wide" => Strategy::FavoriteLongshotWide {
                max_counterparts: positive(params.max_counterparts, "max_counterparts")?,
                band,
            },
            "box_wide" => Strategy::BoxWide {
                box_size: at_least(params.box_size, 2, "box_size")?,
                band,
            },
            "favorite_trio" => Strategy::FavoriteTrio { band },
            "favorite2_longshot_trio" => Strategy::Favorite2LongshotTrio {
                max_counterparts: positive(params.max_counterparts, "max_counterparts")?,
                band,
            },
            "formation_trio" => {
                for (leg, label) in [
                    (&params.first_leg, "first_leg"),
                    (&params.second_leg, "second_leg"),
                    (&params.third_leg, "third_leg"),
                ] {
                    if leg.is_empty() {
                        return Err(SimError::StrategyParamInvalid(format!(
                            "{label} must not be empty"
                        )));
                    }
                }
                Strategy::FormationTrio {
                    first_leg: params.first_leg.clone(),
                    second_leg: params.second_leg.clone(),
                    third_leg: params.third_leg.clone(),
                    band,
                }
            }
            other => return Err(SimError::StrategyUnknown(other.to_string())),
        };
        Ok(strategy)
    }

    /// Names and descriptions for the `list` command.
    pub fn available() -> Vec<(&'static str, &'static str)> {
        vec![
            ("favorite_win", "win tickets on the top predicted horses"),
            ("longshot_win", "win tickets on high upset-probability horses"),
            ("value_win", "win tickets where expected value clears a threshold"),
            ("favorite_place", "place tickets on the top predicted horses"),
            ("longshot_place", "place tickets on high upset-probability horses"),
            ("favorite_quinella", "quinella on the top two predicted horses"),
            (
                "favorite_longshot_quinella",
                "quinella from the top pick to each upset candidate",
            ),
            ("box_quinella", "all quinella pairs among the top N horses"),
            ("favorite_wide", "wide on the top two predicted horses"),
            (
                "favorite_longshot_wide",
                "wide from the top pick to each upset candidate",
            ),
            ("box_wide", "all wide pairs among the top N horses"),
            ("favorite_trio", "trio on the top three predicted horses"),
            (
                "favorite2_longshot_trio",
                "trio from the top two picks to each upset candidate",
            ),
            (
                "formation_trio",
                "trios enumerated from three predicted-rank position sets",
            ),
        ]
    }
}

fn positive(value: usize, label: &str) -> Result<usize> {
    if value == 0 {
        return Err(SimError::StrategyParamInvalid(format!(
            "{label} must be at least 1"
        )));
    }
    Ok(value)
}

fn at_least(value: usize, min: usize, label: &str) -> Result<usize> {
    if value < min {
        return Err(SimError::StrategyParamInvalid(format!(
            "{label} must be at least {min}, got {value}"
        )));
    }
    Ok(value)
}

/// Joint score of a multi-horse combination: the product of the member
/// horses' predicted scores. Kelly sizing derives its implied win
/// probability from this via `ev / odds`.
pub(crate) fn joint_score(horses: &[&crate::models::Horse]) -> f64 {
    horses.iter().map(|h| h.predicted_score).product()
}
