//! Hit adjudication and payout computation.
//!
//! Settlement depends only on the ticket and the race's realized
//! finishing order. Horses that did not finish never satisfy a required
//! position.

use crate::error::{Result, SimError};
use crate::models::{Race, Ticket, TicketKind};

/// Outcome of settling one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub is_hit: bool,
    pub payout: i64,
}

impl Settlement {
    fn miss() -> Settlement {
        Settlement {
            is_hit: false,
            payout: 0,
        }
    }

    fn hit(ticket: &Ticket) -> Settlement {
        Settlement {
            is_hit: true,
            payout: (ticket.amount as f64 * ticket.odds) as i64,
        }
    }
}

/// Settle a ticket against a race result.
///
/// Fails with [`SimError::ResultUnavailable`] when the race has no
/// realized finishing order; this is fatal and must not be treated as
/// a miss.
pub fn evaluate(ticket: &Ticket, race: &Race) -> Result<Settlement> {
    if !race.has_result() {
        return Err(SimError::ResultUnavailable(race.race_id()));
    }

    let placings = race.placings();
    let top3: &[u8] = &placings[..placings.len().min(3)];

    let numbers = &ticket.horse_numbers;
    let hit = match ticket.kind {
        TicketKind::Win => numbers.first() == top3.first(),
        TicketKind::Place => numbers
            .first()
            .map(|n| top3.contains(n))
            .unwrap_or(false),
        TicketKind::Quinella => {
            top3.len() >= 2 && sorted(numbers) == sorted(&top3[..2])
        }
        TicketKind::Wide => {
            numbers.len() == 2 && numbers.iter().all(|n| top3.contains(n))
        }
        TicketKind::Exacta => top3.len() >= 2 && numbers[..] == top3[..2],
        TicketKind::Trio => top3.len() >= 3 && sorted(numbers) == sorted(top3),
        TicketKind::Trifecta => top3.len() >= 3 && numbers[..] == top3[..3],
    };

    Ok(if hit {
        Settlement::hit(ticket)
    } else {
        Settlement::miss()
    })
}

fn sorted(numbers: &[u8]) -> Vec<u8> {
    let mut v = numbers.to_vec();
    v.sort_unstable();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FinishPosition, Horse, OddsTable, Race, Surface};

    /// Twelve-horse race finishing 5, 7, 2, 9, 1, ... by horse number.
    fn sample_race() -> Race {
        let order: [u32; 12] = [5, 3, 12, 11, 1, 10, 2, 9, 4, 8, 6, 7];
        let horses = (1..=12u8)
            .map(|i| {
                Horse::new(
                    i,
                    format!("h{i}"),
                    8.0,
                    i as u32,
                    FinishPosition::from_raw(order[(i - 1) as usize]),
                    i as u32,
                    0.3,
                )
                .unwrap()
            })
            .collect();
        Race {
            track: "Hanshin".into(),
            year: 2023,
            kaisai_date: 402,
            race_number: 10,
            surface: Surface::Turf,
            distance: 2000,
            confidence: 1.0,
            is_maiden: false,
            is_bad_weather: false,
            horses,
            payouts: OddsTable::new(),
        }
    }

    fn sized(kind: TicketKind, numbers: Vec<u8>, odds: f64) -> Ticket {
        let mut t = Ticket::new(kind, numbers, odds, 1.0, "test");
        t.amount = 1000;
        t
    }

    // Finishing order of sample_race: 1st = #5, 2nd = #7, 3rd = #2.

    #[test]
    fn test_win() {
        let race = sample_race();
        let hit = evaluate(&sized(TicketKind::Win, vec![5], 4.0), &race).unwrap();
        assert!(hit.is_hit);
        assert_eq!(hit.payout, 4000);

        let miss = evaluate(&sized(TicketKind::Win, vec![7], 4.0), &race).unwrap();
        assert!(!miss.is_hit);
        assert_eq!(miss.payout, 0);
    }

    #[test]
    fn test_place() {
        let race = sample_race();
        for n in [5u8, 7, 2] {
            assert!(evaluate(&sized(TicketKind::Place, vec![n], 1.8), &race)
                .unwrap()
                .is_hit);
        }
        assert!(!evaluate(&sized(TicketKind::Place, vec![9], 1.8), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_quinella_unordered() {
        let race = sample_race();
        assert!(evaluate(&sized(TicketKind::Quinella, vec![7, 5], 11.0), &race)
            .unwrap()
            .is_hit);
        assert!(!evaluate(&sized(TicketKind::Quinella, vec![5, 2], 11.0), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_wide_any_pair_in_frame() {
        let race = sample_race();
        for pair in [[5u8, 7], [5, 2], [7, 2], [2, 5]] {
            assert!(evaluate(&sized(TicketKind::Wide, pair.to_vec(), 3.2), &race)
                .unwrap()
                .is_hit);
        }
        assert!(!evaluate(&sized(TicketKind::Wide, vec![5, 9], 3.2), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_exacta_order_matters() {
        let race = sample_race();
        assert!(evaluate(&sized(TicketKind::Exacta, vec![5, 7], 25.0), &race)
            .unwrap()
            .is_hit);
        assert!(!evaluate(&sized(TicketKind::Exacta, vec![7, 5], 25.0), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_trio_unordered() {
        let race = sample_race();
        assert!(evaluate(&sized(TicketKind::Trio, vec![2, 7, 5], 40.0), &race)
            .unwrap()
            .is_hit);
        assert!(!evaluate(&sized(TicketKind::Trio, vec![2, 7, 9], 40.0), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_trifecta_order_matters() {
        let race = sample_race();
        assert!(evaluate(&sized(TicketKind::Trifecta, vec![5, 7, 2], 150.0), &race)
            .unwrap()
            .is_hit);
        assert!(!evaluate(&sized(TicketKind::Trifecta, vec![5, 2, 7], 150.0), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_payout_truncated_to_yen() {
        let race = sample_race();
        let mut t = sized(TicketKind::Win, vec![5], 4.0);
        t.odds = 3.333;
        t.amount = 100;
        let s = evaluate(&t, &race).unwrap();
        assert!(s.is_hit);
        assert_eq!(s.payout, 333);
    }

    #[test]
    fn test_dnf_horse_never_hits() {
        let mut race = sample_race();
        // Scratch the runner-up; #2 moves into second, #9 into third.
        race.horses[6].finish = FinishPosition::DidNotFinish;
        assert!(!evaluate(&sized(TicketKind::Place, vec![7], 1.8), &race)
            .unwrap()
            .is_hit);
        assert!(evaluate(&sized(TicketKind::Quinella, vec![5, 2], 11.0), &race)
            .unwrap()
            .is_hit);
    }

    #[test]
    fn test_missing_result_is_fatal() {
        let mut race = sample_race();
        for h in &mut race.horses {
            h.finish = FinishPosition::Unknown;
        }
        let err = evaluate(&sized(TicketKind::Win, vec![5], 4.0), &race).unwrap_err();
        assert!(matches!(err, SimError::ResultUnavailable(_)));
    }

    #[test]
    fn test_determinism() {
        let race = sample_race();
        let t = sized(TicketKind::Trio, vec![2, 5, 7], 40.0);
        let a = evaluate(&t, &race).unwrap();
        let b = evaluate(&t, &race).unwrap();
        assert_eq!(a, b);
    }
}
