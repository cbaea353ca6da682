//! Attempt history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::problem::Level;

/// One answered problem. Created exactly once per submission and never
/// modified; the history as a whole is append-only and chronological.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    /// Problem that was answered.
    pub problem_id: String,
    /// Level in force when the problem was presented.
    pub level_at_time: Level,
    /// Whether the answer matched the key.
    pub correct: bool,
    /// Milliseconds from presentation to submission.
    pub time_ms: u64,
    /// Whether any hint was revealed before answering.
    pub used_hint: bool,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

impl HistoryItem {
    /// Elapsed time in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_secs(&self) -> f64 {
        self.time_ms as f64 / 1000.0
    }
}
