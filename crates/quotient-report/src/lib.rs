//! Quotient session reports
//!
//! Turns a finished (or partial) practice session into a [`Report`] that can
//! be rendered as Markdown for the learner or serialized to JSON.
//!
//! # Types
//!
//! - [`ReportInput`] - Everything the generator needs from a session
//! - [`Report`] - Summary, per-level breakdown, weak areas, insights,
//!   timeline and study plan
//!
//! # Generators
//!
//! - [`ReportGenerator`] - Builds a [`Report`] from a [`ReportInput`]
//! - [`MarkdownGenerator`] - Human-readable Markdown
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use quotient_engine::Level;
//! use quotient_report::{MarkdownGenerator, ReportGenerator, ReportInput};
//!
//! let input = ReportInput {
//!     session_id: "demo".to_string(),
//!     final_level: Level::Medium,
//!     attempts: vec![],
//!     started_at: None,
//!     finished_at: Utc::now(),
//!     study_plan: None,
//! };
//!
//! let report = ReportGenerator::new(input).generate();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Quotient Session Report"));
//! ```

pub mod analysis;
pub mod json;
mod markdown;

pub use analysis::{insights, weak_areas, Insights};
pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use quotient_engine::{
    derive_metrics, Enriched, EnrichmentSource, Grade, HistoryItem, Level, PerformanceBand,
    ProblemBank, SpeedBand, StudyPlan, Topic,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Input
// ============================================================================

/// One recorded attempt with the topic of its problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// The history record.
    pub item: HistoryItem,
    /// Topic of the answered problem.
    pub topic: Topic,
}

impl Attempt {
    /// Pairs each history item with its problem's topic from `bank`.
    ///
    /// Items whose problem is missing from the bank are filed as
    /// [`Topic::General`].
    #[must_use]
    pub fn from_history(history: &[HistoryItem], bank: &ProblemBank) -> Vec<Self> {
        history
            .iter()
            .map(|item| Self {
                topic: bank
                    .get(&item.problem_id)
                    .map_or(Topic::General, Topic::for_problem),
                item: item.clone(),
            })
            .collect()
    }
}

/// Everything needed to build a report.
#[derive(Debug, Clone)]
pub struct ReportInput {
    /// Session identifier.
    pub session_id: String,
    /// Level when the session ended.
    pub final_level: Level,
    /// Attempts in chronological order.
    pub attempts: Vec<Attempt>,
    /// When the first problem was presented, if known.
    pub started_at: Option<DateTime<Utc>>,
    /// When the report was requested.
    pub finished_at: DateTime<Utc>,
    /// Study plan, when one was generated.
    pub study_plan: Option<Enriched<StudyPlan>>,
}

// ============================================================================
// Report
// ============================================================================

/// A complete session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Session identifier.
    pub session_id: String,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Headline numbers.
    pub summary: ReportSummary,
    /// Accuracy for each level.
    pub per_level: Vec<LevelBreakdown>,
    /// Topics that caused the most errors.
    pub weak_areas: Vec<String>,
    /// Strengths and improvements.
    pub insights: Insights,
    /// Attempts in order.
    pub timeline: Vec<TimelineEntry>,
    /// Study plan and where it came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_plan: Option<Enriched<StudyPlan>>,
}

impl Report {
    /// Serializes the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether any attempts were recorded.
    #[must_use]
    pub const fn has_attempts(&self) -> bool {
        self.summary.attempts > 0
    }

    /// Whether the study plan came from the model.
    #[must_use]
    pub fn plan_is_generated(&self) -> bool {
        self.study_plan
            .as_ref()
            .is_some_and(|plan| plan.source == EnrichmentSource::Model)
    }
}

/// Headline numbers for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of attempts.
    pub attempts: usize,
    /// Correct answers.
    pub correct: usize,
    /// Accuracy percentage, rounded.
    pub accuracy: u32,
    /// Accuracy grade.
    pub grade: Grade,
    /// Accuracy band.
    pub performance: PerformanceBand,
    /// Mean time per answer in seconds, one decimal place.
    pub average_time_secs: f64,
    /// Speed score, rounded.
    pub speed_score: u32,
    /// Speed band.
    pub speed: SpeedBand,
    /// Trailing run of correct answers.
    pub streak: usize,
    /// Whether the second half beat the first; `None` below four attempts.
    pub improved: Option<bool>,
    /// Attempts where a hint was revealed.
    pub hints_used: usize,
    /// Level at the end of the session.
    pub final_level: Level,
    /// Wall-clock length of the session, when the start is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

/// Accuracy at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBreakdown {
    /// The level.
    pub level: Level,
    /// Attempts at this level.
    pub attempts: usize,
    /// Correct answers at this level.
    pub correct: usize,
    /// Accuracy percentage, rounded; 0 without attempts.
    pub accuracy: u32,
}

/// One attempt in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// 1-based position.
    pub number: usize,
    /// Problem answered.
    pub problem_id: String,
    /// Level at presentation.
    pub level: Level,
    /// Problem topic.
    pub topic: Topic,
    /// Grading result.
    pub correct: bool,
    /// Time taken.
    pub time_ms: u64,
    /// Whether a hint was revealed.
    pub used_hint: bool,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

// ============================================================================
// Generator
// ============================================================================

/// Builds a [`Report`] from a [`ReportInput`].
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    input: ReportInput,
}

impl ReportGenerator {
    /// Creates a generator over `input`.
    #[must_use]
    pub const fn new(input: ReportInput) -> Self {
        Self { input }
    }

    /// Builds the report.
    #[must_use]
    pub fn generate(self) -> Report {
        let input = self.input;
        let history: Vec<HistoryItem> = input.attempts.iter().map(|a| a.item.clone()).collect();
        let metrics = derive_metrics(&history);

        let duration_seconds = input.started_at.map(|start| {
            u64::try_from((input.finished_at - start).num_seconds()).unwrap_or(0)
        });

        let summary = ReportSummary {
            attempts: metrics.attempts,
            correct: history.iter().filter(|h| h.correct).count(),
            accuracy: metrics.accuracy,
            grade: metrics.grade,
            performance: PerformanceBand::from_accuracy(metrics.precise.accuracy),
            average_time_secs: (metrics.precise.avg_time_ms / 100.0).round() / 10.0,
            speed_score: metrics.speed_score,
            speed: SpeedBand::from_speed_score(metrics.precise.speed_score),
            streak: metrics.streak,
            improved: metrics.improved,
            hints_used: history.iter().filter(|h| h.used_hint).count(),
            final_level: input.final_level,
            duration_seconds,
        };

        let per_level = Level::ALL
            .iter()
            .map(|&level| {
                let (attempts, correct) = history
                    .iter()
                    .filter(|h| h.level_at_time == level)
                    .fold((0, 0), |(n, c), h| (n + 1, c + usize::from(h.correct)));
                LevelBreakdown {
                    level,
                    attempts,
                    correct,
                    accuracy: metrics.per_level.get(level),
                }
            })
            .collect();

        let timeline = input
            .attempts
            .iter()
            .enumerate()
            .map(|(index, attempt)| TimelineEntry {
                number: index + 1,
                problem_id: attempt.item.problem_id.clone(),
                level: attempt.item.level_at_time,
                topic: attempt.topic,
                correct: attempt.item.correct,
                time_ms: attempt.item.time_ms,
                used_hint: attempt.item.used_hint,
                submitted_at: attempt.item.submitted_at,
            })
            .collect();

        Report {
            session_id: input.session_id,
            generated_at: input.finished_at,
            weak_areas: weak_areas(&input.attempts),
            insights: insights(&input.attempts),
            summary,
            per_level,
            timeline,
            study_plan: input.study_plan,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use chrono::TimeZone;
    use quotient_engine::Problem;

    use super::*;

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub(crate) fn attempt(topic: Topic, correct: bool, time_ms: u64, used_hint: bool) -> Attempt {
        Attempt {
            item: HistoryItem {
                problem_id: format!("{}-{time_ms}", topic.display_name().to_lowercase()),
                level_at_time: Level::Medium,
                correct,
                time_ms,
                used_hint,
                submitted_at: at(0),
            },
            topic,
        }
    }

    pub(crate) fn sample_input() -> ReportInput {
        let mut attempts = vec![
            attempt(Topic::Addition, true, 8_000, false),
            attempt(Topic::Addition, true, 12_000, false),
            attempt(Topic::Division, false, 40_000, true),
            attempt(Topic::Simplification, true, 20_000, false),
        ];
        attempts[2].item.level_at_time = Level::Hard;
        for (i, a) in attempts.iter_mut().enumerate() {
            a.item.submitted_at = at(60 * i64::try_from(i + 1).unwrap());
        }
        ReportInput {
            session_id: "session-1".to_string(),
            final_level: Level::Hard,
            attempts,
            started_at: Some(at(0)),
            finished_at: at(300),
            study_plan: Some(Enriched {
                value: StudyPlan::fallback(),
                source: EnrichmentSource::Fallback,
            }),
        }
    }

    #[test]
    fn test_summary_numbers() {
        let report = ReportGenerator::new(sample_input()).generate();
        let summary = &report.summary;
        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.correct, 3);
        assert_eq!(summary.accuracy, 75);
        assert_eq!(summary.grade, Grade::Good);
        assert_eq!(summary.performance, PerformanceBand::Good);
        assert!((summary.average_time_secs - 20.0).abs() < f64::EPSILON);
        assert_eq!(summary.speed_score, 80);
        assert_eq!(summary.speed, SpeedBand::Fast);
        assert_eq!(summary.streak, 1);
        assert_eq!(summary.improved, Some(false));
        assert_eq!(summary.hints_used, 1);
        assert_eq!(summary.final_level, Level::Hard);
        assert_eq!(summary.duration_seconds, Some(300));
    }

    #[test]
    fn test_per_level_breakdown() {
        let report = ReportGenerator::new(sample_input()).generate();
        assert_eq!(report.per_level.len(), 3);
        assert_eq!(
            report.per_level[0],
            LevelBreakdown {
                level: Level::Easy,
                attempts: 0,
                correct: 0,
                accuracy: 0
            }
        );
        assert_eq!(report.per_level[1].attempts, 3);
        assert_eq!(report.per_level[1].accuracy, 100);
        assert_eq!(report.per_level[2].attempts, 1);
        assert_eq!(report.per_level[2].accuracy, 0);
    }

    #[test]
    fn test_timeline_and_analysis() {
        let report = ReportGenerator::new(sample_input()).generate();
        assert_eq!(report.timeline.len(), 4);
        assert_eq!(report.timeline[0].number, 1);
        assert_eq!(report.timeline[2].topic, Topic::Division);
        assert!(report.timeline[2].used_hint);
        assert_eq!(report.weak_areas[0], "Division problems (100% of errors)");
        assert!(report.insights.strengths.contains(&"Good problem-solving speed".to_string()));
        assert!(!report.plan_is_generated());
    }

    #[test]
    fn test_empty_session_report() {
        let input = ReportInput {
            session_id: "empty".to_string(),
            final_level: Level::Medium,
            attempts: vec![],
            started_at: None,
            finished_at: at(0),
            study_plan: None,
        };
        let report = ReportGenerator::new(input).generate();
        assert!(!report.has_attempts());
        assert_eq!(report.summary.speed_score, 0);
        assert_eq!(report.summary.speed, SpeedBand::Slow);
        assert_eq!(report.summary.duration_seconds, None);
        assert_eq!(report.weak_areas, vec!["No data available for analysis"]);
    }

    #[test]
    fn test_attempts_from_history_use_bank_topics() {
        let bank = ProblemBank::from_problems(vec![Problem {
            id: "d1".to_string(),
            stem: "Divide 1/2 by 1/4".to_string(),
            kind: quotient_engine::ProblemKind::ShortAnswer,
            choices: None,
            answer_key: vec!["2".to_string()],
            level: Level::Easy,
            topic: String::new(),
            hints: vec![],
        }])
        .unwrap();
        let history = vec![
            HistoryItem {
                problem_id: "d1".to_string(),
                level_at_time: Level::Easy,
                correct: false,
                time_ms: 1_000,
                used_hint: false,
                submitted_at: at(1),
            },
            HistoryItem {
                problem_id: "gone".to_string(),
                level_at_time: Level::Easy,
                correct: true,
                time_ms: 1_000,
                used_hint: false,
                submitted_at: at(2),
            },
        ];

        let attempts = Attempt::from_history(&history, &bank);
        assert_eq!(attempts[0].topic, Topic::Division);
        assert_eq!(attempts[1].topic, Topic::General);
    }

    #[test]
    fn test_report_serialization() {
        let report = ReportGenerator::new(sample_input()).generate();
        let json = report.to_json().unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
