//! Difficulty adaptation.
//!
//! The decision only looks at history recorded at the current level.
//! Rules, first match wins:
//!
//! | Current | Condition                                 | Next   |
//! |---------|-------------------------------------------|--------|
//! | medium  | last two correct                          | hard   |
//! | medium  | last two wrong, or three wrong in total   | easy   |
//! | hard    | last two wrong, or three wrong in total   | medium |
//! | easy    | last two correct                          | medium |
//!
//! Anything else stays put. There is no level above hard or below easy.

use crate::history::HistoryItem;
use crate::problem::Level;

/// Summary of the history scoped to one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScopedStats {
    len: usize,
    two_consecutive_correct: bool,
    two_consecutive_wrong: bool,
    total_wrong: usize,
}

impl ScopedStats {
    fn collect(level: Level, history: &[HistoryItem]) -> Self {
        let mut stats = Self::default();
        let mut last_two: [Option<bool>; 2] = [None, None];

        for item in history.iter().filter(|h| h.level_at_time == level) {
            stats.len += 1;
            if !item.correct {
                stats.total_wrong += 1;
            }
            last_two = [last_two[1], Some(item.correct)];
        }

        if let [Some(a), Some(b)] = last_two {
            stats.two_consecutive_correct = a && b;
            stats.two_consecutive_wrong = !a && !b;
        }
        stats
    }

    const fn struggling(&self) -> bool {
        self.two_consecutive_wrong || self.total_wrong >= 3
    }
}

/// Returns the level to use for the next problem.
///
/// `history` must already include the item just recorded.
pub fn next_level(current: Level, history: &[HistoryItem]) -> Level {
    let stats = ScopedStats::collect(current, history);
    if stats.len == 0 {
        return current;
    }

    let next = match current {
        Level::Medium if stats.two_consecutive_correct => Level::Hard,
        Level::Medium if stats.struggling() => Level::Easy,
        Level::Hard if stats.struggling() => Level::Medium,
        Level::Easy if stats.two_consecutive_correct => Level::Medium,
        _ => current,
    };

    if next != current {
        tracing::debug!(
            from = %current,
            to = %next,
            scoped = stats.len,
            total_wrong = stats.total_wrong,
            "Difficulty rule fired"
        );
    }
    next
}
