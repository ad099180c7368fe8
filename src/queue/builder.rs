//! Priority queue builder: a pure function from eligible entries and the
//! round-robin cursor to a total order of appointment ids.

use std::collections::VecDeque;

use crate::models::{Priority, QueueEntry};

/// Order in which non-critical tiers take turns.
pub const TIER_CYCLE: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

/// Index into `TIER_CYCLE` where a rebuild resumes after serving `cursor`.
///
/// The target level is `(4 - cursor) mod 3`; a target of 0 matches no tier
/// and falls back to the head of the cycle. So cursor 1 resumes at tier 3,
/// cursor 2 at tier 2 and cursor 3 at tier 1. Out-of-range cursors are folded
/// by the same Euclidean modulo instead of being rejected.
pub fn start_index(cursor: i64) -> usize {
    let target = (4 - cursor).rem_euclid(3);
    TIER_CYCLE
        .iter()
        .position(|tier| i64::from(tier.level()) == target)
        .unwrap_or(0)
}

/// Produce the processing order.
///
/// Critical entries first by ascending id, then tiers 3/2/1 interleaved one
/// appointment per turn (oldest first within a tier) starting at
/// `start_index(cursor)`. An empty tier forfeits its turn.
pub fn build_queue(entries: &[QueueEntry], cursor: i64) -> Vec<i64> {
    let mut critical: Vec<i64> = Vec::new();
    let mut tiers: [VecDeque<i64>; 3] = Default::default();

    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.id);

    for entry in sorted {
        match TIER_CYCLE.iter().position(|tier| *tier == entry.priority) {
            Some(slot) => tiers[slot].push_back(entry.id),
            None => critical.push(entry.id),
        }
    }

    let mut order = critical;
    order.reserve(tiers.iter().map(VecDeque::len).sum());

    let mut turn = start_index(cursor);
    while tiers.iter().any(|t| !t.is_empty()) {
        if let Some(id) = tiers[turn % TIER_CYCLE.len()].pop_front() {
            order.push(id);
        }
        turn += 1;
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(rows: &[(i64, u8)]) -> Vec<QueueEntry> {
        rows.iter()
            .map(|&(id, level)| QueueEntry::new(id, Priority::try_from(level).unwrap()))
            .collect()
    }

    #[test]
    fn start_tier_for_each_cursor() {
        assert_eq!(TIER_CYCLE[start_index(1)], Priority::High);
        assert_eq!(TIER_CYCLE[start_index(2)], Priority::Medium);
        assert_eq!(TIER_CYCLE[start_index(3)], Priority::Low);
    }

    #[test]
    fn out_of_range_cursor_is_folded_not_rejected() {
        // 4 - 4 = 0 → no tier → head of cycle
        assert_eq!(start_index(4), 0);
        // 4 - 0 = 4 → 1 → tier 1
        assert_eq!(TIER_CYCLE[start_index(0)], Priority::Low);
        assert_eq!(start_index(-5), start_index(1));
        assert!(start_index(i64::from(u8::MAX)) < 3);
    }

    #[test]
    fn empty_input_yields_empty_queue() {
        assert!(build_queue(&[], 3).is_empty());
    }

    #[test]
    fn golden_fixture_cursor_three() {
        // cursor 3 → resume at tier 1: 1(p1), then tier 3: 3, tier 2: 2, tier 1: 4
        let queue = build_queue(&entries(&[(1, 1), (2, 2), (3, 3), (4, 1)]), 3);
        assert_eq!(queue, vec![1, 3, 2, 4]);
    }

    #[test]
    fn golden_fixture_cursor_one_and_two() {
        let input = entries(&[(1, 1), (2, 2), (3, 3), (4, 1)]);
        assert_eq!(build_queue(&input, 1), vec![3, 2, 1, 4]);
        assert_eq!(build_queue(&input, 2), vec![2, 1, 3, 4]);
    }

    #[test]
    fn critical_entries_lead_in_id_order() {
        let queue = build_queue(&entries(&[(1, 3), (2, 1), (9, 4), (5, 4)]), 1);
        assert_eq!(&queue[..2], &[5, 9]);
        assert_eq!(&queue[2..], &[1, 2]);
    }

    #[test]
    fn critical_bypass_with_high_id() {
        let mut input = entries(&[(1, 1), (2, 2), (3, 3)]);
        assert_eq!(build_queue(&input, 1)[0], 3);
        input.push(QueueEntry::new(100, Priority::Critical));
        assert_eq!(build_queue(&input, 1)[0], 100);
    }

    #[test]
    fn tiers_interleave_and_stay_fifo() {
        let input = entries(&[
            (1, 3), (2, 3), (3, 3),
            (4, 2), (5, 2),
            (6, 1),
        ]);
        // cursor 1 → start at tier 3
        assert_eq!(build_queue(&input, 1), vec![1, 4, 6, 2, 5, 3]);
    }

    #[test]
    fn empty_tiers_are_skipped() {
        let input = entries(&[(10, 1), (11, 1), (12, 1)]);
        assert_eq!(build_queue(&input, 1), vec![10, 11, 12]);

        let input = entries(&[(1, 3), (2, 1), (3, 3)]);
        // start tier 2 (empty) → tier 1 → tier 3 → tier 2 (empty) → tier 1 (empty) → tier 3
        assert_eq!(build_queue(&input, 2), vec![2, 1, 3]);
    }

    #[test]
    fn input_order_does_not_matter() {
        let forward = entries(&[(1, 1), (2, 2), (3, 3), (4, 4), (5, 2)]);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(build_queue(&forward, 2), build_queue(&reversed, 2));
    }

    #[test]
    fn every_cursor_preserves_subsequence_order() {
        let input = entries(&[
            (1, 1), (2, 2), (3, 3), (4, 4), (5, 1), (6, 2),
            (7, 3), (8, 4), (9, 1), (10, 3), (11, 2), (12, 1),
        ]);
        for cursor in 1..=3 {
            let queue = build_queue(&input, cursor);
            assert_eq!(queue.len(), input.len());

            let first_non_critical = queue
                .iter()
                .position(|id| ![4, 8].contains(id))
                .unwrap();
            assert_eq!(&queue[..first_non_critical], &[4, 8]);

            for level in 1..=3u8 {
                let tier: Vec<i64> = queue
                    .iter()
                    .copied()
                    .filter(|id| input.iter().any(|e| e.id == *id && e.priority.level() == level))
                    .collect();
                let mut sorted = tier.clone();
                sorted.sort();
                assert_eq!(tier, sorted, "tier {level} must stay FIFO for cursor {cursor}");
            }

            let expected_first = TIER_CYCLE[start_index(cursor)];
            let first = input.iter().find(|e| e.id == queue[first_non_critical]).unwrap();
            assert_eq!(first.priority, expected_first);
        }
    }
}
