//! Stake sizing under global fund constraints.
//!
//! The manager is stateless: the driver passes the current fund and the
//! per-race / per-day running totals into every call.

pub mod kelly;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::models::Ticket;

/// Stakes are placed in 100-yen units.
pub const BET_UNIT: i64 = 100;

/// Global constraints from the `fund_management.constraints` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundConstraints {
    #[serde(default = "default_min_bet")]
    pub min_bet: i64,
    #[serde(default = "default_max_bet_per_ticket")]
    pub max_bet_per_ticket: i64,
    #[serde(default = "default_max_bet_per_race")]
    pub max_bet_per_race: i64,
    #[serde(default = "default_max_bet_per_day")]
    pub max_bet_per_day: i64,
    /// Replay terminates once the fund falls to this fraction of the
    /// initial fund. 0 disables the stop-loss.
    #[serde(default)]
    pub stop_loss_threshold: f64,
}

fn default_min_bet() -> i64 {
    100
}

fn default_max_bet_per_ticket() -> i64 {
    100_000
}

fn default_max_bet_per_race() -> i64 {
    500_000
}

fn default_max_bet_per_day() -> i64 {
    1_000_000
}

impl Default for FundConstraints {
    fn default() -> Self {
        FundConstraints {
            min_bet: default_min_bet(),
            max_bet_per_ticket: default_max_bet_per_ticket(),
            max_bet_per_race: default_max_bet_per_race(),
            max_bet_per_day: default_max_bet_per_day(),
            stop_loss_threshold: 0.0,
        }
    }
}

/// Method parameters from the `fund_management.params` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundParams {
    #[serde(default = "default_bet_amount")]
    pub bet_amount: i64,
    #[serde(default = "default_bet_percentage")]
    pub bet_percentage: f64,
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    /// EV haircut for tickets priced by the place-odds fallback.
    #[serde(default = "default_estimated_odds_discount")]
    pub estimated_odds_discount: f64,
}

fn default_bet_amount() -> i64 {
    1000
}

fn default_bet_percentage() -> f64 {
    0.02
}

fn default_kelly_fraction() -> f64 {
    0.25
}

fn default_estimated_odds_discount() -> f64 {
    0.8
}

impl Default for FundParams {
    fn default() -> Self {
        FundParams {
            bet_amount: default_bet_amount(),
            bet_percentage: default_bet_percentage(),
            kelly_fraction: default_kelly_fraction(),
            estimated_odds_discount: default_estimated_odds_discount(),
        }
    }
}

/// The three sizing variants.
#[derive(Debug, Clone, PartialEq)]
pub enum BankrollMethod {
    Fixed {
        bet_amount: i64,
    },
    Percentage {
        bet_percentage: f64,
    },
    Kelly {
        kelly_fraction: f64,
        estimated_odds_discount: f64,
    },
}

impl BankrollMethod {
    /// Parse a `fund_management` method name plus its parameters.
    pub fn from_config(name: &str, params: &FundParams) -> Result<BankrollMethod> {
        match name {
            "fixed" => {
                if params.bet_amount <= 0 {
                    return Err(SimError::BankrollParamInvalid(format!(
                        "bet_amount must be positive, got {}",
                        params.bet_amount
                    )));
                }
                Ok(BankrollMethod::Fixed {
                    bet_amount: params.bet_amount,
                })
            }
            "percentage" => {
                if !(0.0..=1.0).contains(&params.bet_percentage) || params.bet_percentage == 0.0 {
                    return Err(SimError::BankrollParamInvalid(format!(
                        "bet_percentage must be in (0, 1], got {}",
                        params.bet_percentage
                    )));
                }
                Ok(BankrollMethod::Percentage {
                    bet_percentage: params.bet_percentage,
                })
            }
            "kelly" => {
                if params.kelly_fraction <= 0.0 || params.kelly_fraction > 1.0 {
                    return Err(SimError::BankrollParamInvalid(format!(
                        "kelly_fraction must be in (0, 1], got {}",
                        params.kelly_fraction
                    )));
                }
                Ok(BankrollMethod::Kelly {
                    kelly_fraction: params.kelly_fraction,
                    estimated_odds_discount: params.estimated_odds_discount,
                })
            }
            other => Err(SimError::BankrollUnknown(other.to_string())),
        }
    }

    /// Names and descriptions for the `list` command.
    pub fn available() -> Vec<(&'static str, &'static str)> {
        vec![
            ("fixed", "same stake on every ticket"),
            ("percentage", "fixed fraction of the current fund"),
            ("kelly", "fractional Kelly sizing from the ticket's expected value"),
        ]
    }
}

/// Sizes one ticket under the constraints. Returns 0 to skip.
#[derive(Debug, Clone)]
pub struct BankrollManager {
    method: BankrollMethod,
    constraints: FundConstraints,
}

impl BankrollManager {
    pub fn new(method: BankrollMethod, constraints: FundConstraints) -> BankrollManager {
        BankrollManager {
            method,
            constraints,
        }
    }

    pub fn constraints(&self) -> &FundConstraints {
        &self.constraints
    }

    /// Compute the stake for one candidate ticket.
    ///
    /// Applies, in order: the method's raw amount, the composite weight
    /// and tier multiplier, flooring to 100-yen units, the per-ticket
    /// cap, the remaining per-race and per-day budgets, the remaining
    /// fund, and finally the minimum-bet skip.
    pub fn size(
        &self,
        ticket: &Ticket,
        current_fund: i64,
        tier_multiplier: f64,
        race_spent: i64,
        day_spent: i64,
    ) -> i64 {
        let raw = match &self.method {
            BankrollMethod::Fixed { bet_amount } => *bet_amount as f64,
            BankrollMethod::Percentage { bet_percentage } => {
                current_fund as f64 * bet_percentage
            }
            BankrollMethod::Kelly {
                kelly_fraction,
                estimated_odds_discount,
            } => {
                let mut ev = ticket.expected_value;
                if ticket.odds_estimated {
                    ev *= estimated_odds_discount;
                }
                let p = kelly::implied_probability(ev, ticket.odds);
                let full = kelly::kelly_fraction(p, ticket.odds);
                if full <= 0.0 {
                    return 0;
                }
                current_fund as f64 * kelly_fraction * full
            }
        };

        let weight = ticket.weight.unwrap_or(1.0);
        let scaled = raw * weight * tier_multiplier;
        if !scaled.is_finite() || scaled <= 0.0 {
            return 0;
        }

        let c = &self.constraints;
        let mut stake = floor_to_unit(scaled as i64);
        stake = stake.clamp(0, c.max_bet_per_ticket);
        stake = stake.min((c.max_bet_per_race - race_spent).max(0));
        stake = stake.min((c.max_bet_per_day - day_spent).max(0));
        stake = stake.min(current_fund.max(0));
        stake = floor_to_unit(stake);

        if stake < c.min_bet {
            0
        } else {
            stake
        }
    }
}

fn floor_to_unit(amount: i64) -> i64 {
    (amount / BET_UNIT) * BET_UNIT
}
