//! Two-horse combination strategies, shared by the quinella and wide
//! kinds. Selection logic is identical; only the ticket kind and the
//! odds table consulted differ.
//!
//! Combination odds come from the race's realized odds table. A
//! combination the table does not expose emits no ticket.

use crate::models::{Horse, Race, Ticket, TicketKind};

use super::{joint_score, OddsBand};

fn pair_ticket(
    race: &Race,
    kind: TicketKind,
    strategy_name: &str,
    a: &Horse,
    b: &Horse,
    band: OddsBand,
) -> Option<Ticket> {
    let odds = race.payouts.get(kind, &[a.number, b.number])?;
    if !band.allows(odds) {
        return None;
    }
    Some(Ticket::new(
        kind,
        vec![a.number, b.number],
        odds,
        joint_score(&[a, b]) * odds,
        strategy_name,
    ))
}

/// One ticket pairing the top two predicted horses.
pub fn favorite_pair(
    race: &Race,
    kind: TicketKind,
    strategy_name: &str,
    band: OddsBand,
) -> Vec<Ticket> {
    let top = race.top_predicted(2);
    if top.len() < 2 {
        return Vec::new();
    }
    pair_ticket(race, kind, strategy_name, top[0], top[1], band)
        .into_iter()
        .collect()
}

/// Anchor the predicted-rank-1 horse against each upset candidate, up
/// to `max_counterparts` partners.
pub fn favorite_longshot_pair(
    race: &Race,
    kind: TicketKind,
    strategy_name: &str,
    max_counterparts: usize,
    band: OddsBand,
) -> Vec<Ticket> {
    let anchor = match race.top_predicted(1).first() {
        Some(h) => *h,
        None => return Vec::new(),
    };

    race.upset_candidates()
        .into_iter()
        .filter(|h| h.number != anchor.number)
        .take(max_counterparts)
        .filter_map(|partner| pair_ticket(race, kind, strategy_name, anchor, partner, band))
        .collect()
}

/// All C(box_size, 2) pairs among the top `box_size` predicted horses.
pub fn box_pair(
    race: &Race,
    kind: TicketKind,
    strategy_name: &str,
    box_size: usize,
    band: OddsBand,
) -> Vec<Ticket> {
    let top = race.top_predicted(box_size);
    if top.len() < 2 {
        return Vec::new();
    }

    let mut tickets = Vec::new();
    for i in 0..top.len() {
        for j in (i + 1)..top.len() {
            if let Some(ticket) = pair_ticket(race, kind, strategy_name, top[i], top[j], band) {
                tickets.push(ticket);
            }
        }
    }
    tickets
}
