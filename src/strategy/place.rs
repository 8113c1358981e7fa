//! Place-kind strategies.
//!
//! When the dataset exposes no place odds for a horse, the estimate
//! `max(1.1, win_odds * 0.35)` is used and the ticket is flagged so the
//! bankroll layer sizes it with reduced confidence and the metrics
//! layer can report the run as lower fidelity.

use crate::models::{Horse, Race, Ticket, TicketKind};

use super::OddsBand;

const PLACE_ODDS_FLOOR: f64 = 1.1;
const PLACE_ODDS_RATIO: f64 = 0.35;

/// Place odds for a horse: the exposed minimum when present, otherwise
/// the estimate. The bool is true when estimated.
fn place_odds(horse: &Horse) -> (f64, bool) {
    match horse.place_odds_min {
        Some(odds) => (odds, false),
        None => (PLACE_ODDS_FLOOR.max(horse.odds * PLACE_ODDS_RATIO), true),
    }
}

/// In-frame probability proxy: three paid positions, capped at 1.
fn in_frame_prob(win_prob: f64) -> f64 {
    (win_prob * 3.0).min(1.0)
}

fn place_ticket(horse: &Horse, win_prob: f64, strategy_name: &str, band: OddsBand) -> Option<Ticket> {
    let (odds, estimated) = place_odds(horse);
    if !band.allows(odds) {
        return None;
    }
    let ticket = Ticket::new(
        TicketKind::Place,
        vec![horse.number],
        odds,
        in_frame_prob(win_prob) * odds,
        strategy_name,
    );
    Some(if estimated {
        ticket.with_estimated_odds()
    } else {
        ticket
    })
}

/// Place tickets on the top `top_n` horses by predicted rank.
pub fn favorite_place(race: &Race, top_n: usize, band: OddsBand) -> Vec<Ticket> {
    race.top_predicted(top_n)
        .into_iter()
        .filter_map(|h| place_ticket(h, h.predicted_score, "favorite_place", band))
        .collect()
}

/// Place tickets on horses whose upset probability clears the
/// threshold, strongest candidates first.
pub fn longshot_place(
    race: &Race,
    upset_threshold: f64,
    max_candidates: usize,
    band: OddsBand,
) -> Vec<Ticket> {
    let mut longshots: Vec<_> = race
        .horses
        .iter()
        .filter(|h| h.upset_prob >= upset_threshold)
        .collect();
    longshots.sort_by(|a, b| {
        b.upset_prob
            .partial_cmp(&a.upset_prob)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    longshots
        .into_iter()
        .filter_map(|h| place_ticket(h, h.upset_prob, "longshot_place", band))
        .take(max_candidates)
        .collect()
}
