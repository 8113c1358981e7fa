//! Trio-kind strategies.

use std::collections::HashSet;

use crate::models::{canonicalize, Horse, Race, Ticket, TicketKind};

use super::{joint_score, OddsBand};

fn trio_ticket(
    race: &Race,
    strategy_name: &str,
    members: [&Horse; 3],
    band: OddsBand,
) -> Option<Ticket> {
    let numbers = [members[0].number, members[1].number, members[2].number];
    let odds = race.payouts.get(TicketKind::Trio, &numbers)?;
    if !band.allows(odds) {
        return None;
    }
    Some(Ticket::new(
        TicketKind::Trio,
        numbers.to_vec(),
        odds,
        joint_score(&members) * odds,
        strategy_name,
    ))
}

/// One ticket on the top three predicted horses.
pub fn favorite_trio(race: &Race, band: OddsBand) -> Vec<Ticket> {
    let top = race.top_predicted(3);
    if top.len() < 3 {
        return Vec::new();
    }
    trio_ticket(race, "favorite_trio", [top[0], top[1], top[2]], band)
        .into_iter()
        .collect()
}

/// Anchor the top two predicted horses against each upset candidate,
/// up to `max_counterparts` partners.
pub fn favorite2_longshot_trio(
    race: &Race,
    max_counterparts: usize,
    band: OddsBand,
) -> Vec<Ticket> {
    let anchors = race.top_predicted(2);
    if anchors.len() < 2 {
        return Vec::new();
    }
    let anchor_numbers: HashSet<u8> = anchors.iter().map(|h| h.number).collect();

    race.upset_candidates()
        .into_iter()
        .filter(|h| !anchor_numbers.contains(&h.number))
        .take(max_counterparts)
        .filter_map(|partner| {
            trio_ticket(
                race,
                "favorite2_longshot_trio",
                [anchors[0], anchors[1], partner],
                band,
            )
        })
        .collect()
}

/// Enumerate trios from three predicted-rank position sets. Tuples
/// collapsing to the same unordered triple emit once, in first-emission
/// order.
pub fn formation_trio(
    race: &Race,
    first_leg: &[u32],
    second_leg: &[u32],
    third_leg: &[u32],
    band: OddsBand,
) -> Vec<Ticket> {
    let by_rank = |rank: u32| -> Option<&Horse> {
        race.horses.iter().find(|h| h.predicted_rank == rank)
    };

    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut tickets = Vec::new();

    for &ra in first_leg {
        for &rb in second_leg {
            for &rc in third_leg {
                if ra == rb || rb == rc || ra == rc {
                    continue;
                }
                let (a, b, c) = match (by_rank(ra), by_rank(rb), by_rank(rc)) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => continue,
                };
                let key = canonicalize(TicketKind::Trio, &[a.number, b.number, c.number]);
                if !seen.insert(key) {
                    continue;
                }
                if let Some(ticket) = trio_ticket(race, "formation_trio", [a, b, c], band) {
                    tickets.push(ticket);
                }
            }
        }
    }
    tickets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::fixtures::{horse, race};

    /// Six-horse field, predicted ranks equal horse numbers, trio odds
    /// exposed for every triple among the top five.
    fn trio_race() -> Race {
        let mut r = race(vec![
            horse(1, 2.5, 1, 0.32),
            horse(2, 4.0, 2, 0.24),
            horse(3, 7.0, 3, 0.17),
            horse(4, 12.0, 4, 0.11),
            horse(5, 20.0, 5, 0.08),
            horse(6, 55.0, 6, 0.03),
        ]);
        let mut odds = 10.0;
        for a in 1u8..=5 {
            for b in (a + 1)..=5 {
                for c in (b + 1)..=5 {
                    r.payouts.insert(TicketKind::Trio, &[a, b, c], odds);
                    odds += 5.0;
                }
            }
        }
        r
    }

    #[test]
    fn test_favorite_trio() {
        let r = trio_race();
        let tickets = favorite_trio(&r, OddsBand::default());
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].canonical_numbers(), vec![1, 2, 3]);
        assert!((tickets[0].expected_value - 0.32 * 0.24 * 0.17 * 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_favorite_trio_needs_three_runners() {
        let r = race(vec![horse(1, 2.0, 1, 0.4), horse(2, 3.0, 2, 0.3)]);
        assert!(favorite_trio(&r, OddsBand::default()).is_empty());
    }

    #[test]
    fn test_favorite2_longshot_trio() {
        let mut r = trio_race();
        r.horses[3].is_upset_candidate = true; // #4
        r.horses[3].upset_prob = 0.10;
        r.horses[4].is_upset_candidate = true; // #5
        r.horses[4].upset_prob = 0.22;
        // anchor flagged as candidate must be excluded
        r.horses[1].is_upset_candidate = true; // #2
        r.horses[1].upset_prob = 0.30;

        let tickets = favorite2_longshot_trio(&r, 2, OddsBand::default());
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].canonical_numbers(), vec![1, 2, 5]);
        assert_eq!(tickets[1].canonical_numbers(), vec![1, 2, 4]);
    }

    #[test]
    fn test_formation_trio_unique_triples() {
        let r = trio_race();
        // (1,2,3) and permutations collapsing to the same set appear once.
        let tickets = formation_trio(&r, &[1, 2], &[2, 3], &[3, 4], OddsBand::default());
        let triples: Vec<Vec<u8>> = tickets.iter().map(|t| t.canonical_numbers()).collect();
        // tuples: (1,2,3) (1,2,4) (1,3,4) (2,3,4); (2,3,4) also reachable
        // as 2-3-4, emitted once
        assert_eq!(
            triples,
            vec![
                vec![1u8, 2, 3],
                vec![1, 2, 4],
                vec![1, 3, 4],
                vec![2, 3, 4],
            ]
        );
    }

    #[test]
    fn test_formation_trio_skips_absent_ranks() {
        let r = trio_race();
        let tickets = formation_trio(&r, &[1], &[2], &[30], OddsBand::default());
        assert!(tickets.is_empty());
    }

    #[test]
    fn test_missing_trio_odds_emits_nothing() {
        let mut r = trio_race();
        r.payouts = crate::models::OddsTable::new();
        assert!(favorite_trio(&r, OddsBand::default()).is_empty());
    }
}
