//! Win-kind strategies.

use crate::models::{Race, Ticket, TicketKind};

use super::OddsBand;

/// Win tickets on the top `top_n` horses by predicted rank.
pub fn favorite_win(race: &Race, top_n: usize, band: OddsBand) -> Vec<Ticket> {
    race.top_predicted(top_n)
        .into_iter()
        .filter(|h| band.allows(h.odds))
        .map(|h| {
            Ticket::new(
                TicketKind::Win,
                vec![h.number],
                h.odds,
                h.predicted_score * h.odds,
                "favorite_win",
            )
        })
        .collect()
}

/// Win tickets on horses whose upset probability clears the threshold,
/// strongest candidates first.
pub fn longshot_win(
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
        .filter(|h| band.allows(h.odds))
        .take(max_candidates)
        .map(|h| {
            Ticket::new(
                TicketKind::Win,
                vec![h.number],
                h.odds,
                h.upset_prob * h.odds,
                "longshot_win",
            )
        })
        .collect()
}

/// Win tickets on every horse whose expected value clears the
/// threshold, best value first, capped at `max_tickets`.
pub fn value_win(
    race: &Race,
    min_expected_value: f64,
    max_tickets: usize,
    band: OddsBand,
) -> Vec<Ticket> {
    let mut by_value: Vec<_> = race
        .horses
        .iter()
        .map(|h| (h, h.expected_value()))
        .filter(|(h, ev)| *ev >= min_expected_value && band.allows(h.odds))
        .collect();
    by_value.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    by_value
        .into_iter()
        .take(max_tickets)
        .map(|(h, ev)| Ticket::new(TicketKind::Win, vec![h.number], h.odds, ev, "value_win"))
        .collect()
}
