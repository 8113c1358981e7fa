//! Weighted combination of sub-strategies.
//!
//! Weights are normalized to sum to 1 at construction and carried on
//! the emitted tickets; the bankroll layer multiplies them into the
//! stake. When several sub-strategies emit the same (kind, canonical
//! numbers) ticket, the first occurrence is kept and the weights are
//! summed.

use std::collections::HashMap;

use crate::error::{Result, SimError};
use crate::models::{Race, Ticket, TicketKind};

use super::Strategy;

#[derive(Debug, Clone)]
pub struct CompositeStrategy {
    entries: Vec<(Strategy, f64)>,
}

impl CompositeStrategy {
    /// Build from sub-strategies and raw weights. Weights must be
    /// positive; they are normalized here.
    pub fn new(entries: Vec<(Strategy, f64)>) -> Result<CompositeStrategy> {
        if entries.is_empty() {
            return Err(SimError::StrategyParamInvalid(
                "composite strategy needs at least one sub-strategy".into(),
            ));
        }
        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        if entries.iter().any(|(_, w)| *w <= 0.0) || total <= 0.0 {
            return Err(SimError::StrategyParamInvalid(
                "composite weights must be positive".into(),
            ));
        }
        let entries = entries
            .into_iter()
            .map(|(s, w)| (s, w / total))
            .collect();
        Ok(CompositeStrategy { entries })
    }

    pub fn generate_tickets(&self, race: &Race) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = Vec::new();
        let mut index: HashMap<(TicketKind, Vec<u8>), usize> = HashMap::new();

        for (strategy, weight) in &self.entries {
            for mut ticket in strategy.generate_tickets(race) {
                match index.get(&ticket.key()) {
                    Some(&i) => {
                        let existing = &mut tickets[i];
                        existing.weight =
                            Some(existing.weight.unwrap_or(0.0) + weight);
                    }
                    None => {
                        ticket.weight = Some(*weight);
                        index.insert(ticket.key(), tickets.len());
                        tickets.push(ticket);
                    }
                }
            }
        }
        tickets
    }
}
