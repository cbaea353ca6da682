//! Next-problem selection and the recency ring.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::problem::{Level, Problem};

/// Bounded list of the most recently served problem ids, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyRing {
    ids: Vec<String>,
    capacity: usize,
}

impl RecencyRing {
    /// Creates an empty ring holding at most `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a served id, evicting the oldest when full.
    pub fn push(&mut self, id: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.ids.len() == self.capacity {
            self.ids.remove(0);
        }
        self.ids.push(id.into());
    }

    /// Ids in chronological order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    /// Whether `id` is currently excluded.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|r| r == id)
    }

    /// Maximum number of ids kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets every id.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Picks a problem at exactly `level` whose id is not in `recent_ids`.
///
/// Returns `None` when no candidate remains. There is no cross-level
/// fallback and recent problems are never reused. Among candidates the pick
/// is uniform over `rng`.
pub fn pick_next<'a, R: Rng + ?Sized>(
    level: Level,
    recent_ids: &[String],
    bank: &'a [Problem],
    rng: &mut R,
) -> Option<&'a Problem> {
    let candidates: Vec<&Problem> = bank
        .iter()
        .filter(|p| p.level == level && !recent_ids.iter().any(|id| *id == p.id))
        .collect();

    tracing::debug!(%level, candidates = candidates.len(), "Selecting next problem");
    candidates.choose(rng).copied()
}
