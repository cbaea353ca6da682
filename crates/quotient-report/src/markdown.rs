//! Markdown report generation.
//!
//! [`MarkdownGenerator`] renders a [`Report`] as a document with:
//!
//! - A summary table with headline metrics
//! - Accuracy per level
//! - Weak areas and insights
//! - The attempt timeline
//! - The study plan and follow-up challenge
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use quotient_engine::Level;
//! use quotient_report::{MarkdownGenerator, ReportGenerator, ReportInput};
//!
//! let report = ReportGenerator::new(ReportInput {
//!     session_id: "demo".to_string(),
//!     final_level: Level::Easy,
//!     attempts: vec![],
//!     started_at: None,
//!     finished_at: Utc::now(),
//!     study_plan: None,
//! })
//! .generate();
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("## Summary"));
//! ```

use chrono::{DateTime, Utc};
use quotient_engine::{EnrichmentSource, Level, PerformanceBand, SpeedBand};
use std::fmt::Write;

use crate::{Report, TimelineEntry};

/// Generates Markdown reports from session results.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_levels(&mut output);
        self.write_weak_areas(&mut output);
        self.write_insights(&mut output);
        self.write_timeline(&mut output);
        self.write_study_plan(&mut output);
        Self::write_footer(&mut output, &self.report.generated_at);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Quotient Session Report: {}\n",
            escape_markdown(&self.report.session_id)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Problems | {} |", summary.attempts);
        let _ = writeln!(
            output,
            "| Accuracy | {}% ({}/{}) |",
            summary.accuracy, summary.correct, summary.attempts
        );
        let _ = writeln!(
            output,
            "| Performance | {} (grade: {}) |",
            performance_label(summary.performance),
            summary.grade
        );
        let _ = writeln!(
            output,
            "| Average Time | {:.1}s |",
            summary.average_time_secs
        );
        let _ = writeln!(
            output,
            "| Speed | {} ({}/100) |",
            speed_label(summary.speed),
            summary.speed_score
        );
        let _ = writeln!(output, "| Current Streak | {} |", summary.streak);
        let _ = writeln!(output, "| Hints Used | {} |", summary.hints_used);
        let _ = writeln!(
            output,
            "| Final Level | {} |",
            level_label(summary.final_level)
        );
        if let Some(improved) = summary.improved {
            let _ = writeln!(
                output,
                "| Trend | {} |",
                if improved { "Improving" } else { "Steady" }
            );
        }
        if let Some(seconds) = summary.duration_seconds {
            let _ = writeln!(output, "| Duration | {} |", format_duration(seconds));
        }
        let _ = writeln!(output);
    }

    fn write_levels(&self, output: &mut String) {
        let _ = writeln!(output, "## Accuracy by Level\n");
        let _ = writeln!(output, "| Level | Attempts | Correct | Accuracy |");
        let _ = writeln!(output, "|-------|----------|---------|----------|");
        for row in &self.report.per_level {
            let accuracy = if row.attempts == 0 {
                "-".to_string()
            } else {
                format!("{}%", row.accuracy)
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                level_label(row.level),
                row.attempts,
                row.correct,
                accuracy
            );
        }
        let _ = writeln!(output);
    }

    fn write_weak_areas(&self, output: &mut String) {
        let _ = writeln!(output, "## Weak Areas\n");
        for area in &self.report.weak_areas {
            let _ = writeln!(output, "- {}", escape_markdown(area));
        }
        let _ = writeln!(output);
    }

    fn write_insights(&self, output: &mut String) {
        let insights = &self.report.insights;

        let _ = writeln!(output, "## Insights\n");
        let _ = writeln!(output, "### Strengths\n");
        if insights.strengths.is_empty() {
            let _ = writeln!(output, "*None yet.*");
        }
        for strength in &insights.strengths {
            let _ = writeln!(output, "- {}", escape_markdown(strength));
        }
        let _ = writeln!(output, "\n### Areas for Improvement\n");
        for improvement in &insights.improvements {
            let _ = writeln!(output, "- {}", escape_markdown(improvement));
        }
        let _ = writeln!(output);
    }

    fn write_timeline(&self, output: &mut String) {
        let _ = writeln!(output, "## Timeline\n");

        if self.report.timeline.is_empty() {
            let _ = writeln!(output, "*No problems answered.*\n");
            return;
        }

        let _ = writeln!(output, "| # | Problem | Level | Topic | Result | Time | Hint |");
        let _ = writeln!(output, "|---|---------|-------|-------|--------|------|------|");
        for entry in &self.report.timeline {
            Self::write_timeline_entry(output, entry);
        }
        let _ = writeln!(output);
    }

    fn write_timeline_entry(output: &mut String, entry: &TimelineEntry) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} |",
            entry.number,
            escape_markdown(&entry.problem_id),
            level_label(entry.level),
            entry.topic.display_name(),
            if entry.correct { "Correct" } else { "Incorrect" },
            format_millis(entry.time_ms),
            if entry.used_hint { "Yes" } else { "No" },
        );
    }

    fn write_study_plan(&self, output: &mut String) {
        let _ = writeln!(output, "## Study Plan\n");

        let Some(plan) = &self.report.study_plan else {
            let _ = writeln!(output, "*No study plan was requested.*\n");
            return;
        };

        for (index, step) in plan.value.steps.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", index + 1, escape_markdown(step));
        }

        let challenge = &plan.value.challenge;
        let _ = writeln!(output, "\n**Challenge:** {}", escape_markdown(&challenge.problem));
        if let Some(hint) = &challenge.hint {
            let _ = writeln!(output, "\n*Hint: {}*", escape_markdown(hint));
        }
        if plan.source == EnrichmentSource::Fallback {
            let _ = writeln!(output, "\n*Offline plan; the tutor was unavailable.*");
        }
        let _ = writeln!(output);
    }

    fn write_footer(output: &mut String, generated_at: &DateTime<Utc>) {
        let _ = writeln!(output, "---");
        let _ = writeln!(
            output,
            "*Generated by Quotient at {}*",
            format_timestamp(generated_at)
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const fn level_label(level: Level) -> &'static str {
    match level {
        Level::Easy => "Easy",
        Level::Medium => "Medium",
        Level::Hard => "Hard",
    }
}

const fn performance_label(band: PerformanceBand) -> &'static str {
    match band {
        PerformanceBand::Excellent => "Excellent",
        PerformanceBand::Good => "Good",
        PerformanceBand::NeedsWork => "Needs Work",
    }
}

const fn speed_label(band: SpeedBand) -> &'static str {
    match band {
        SpeedBand::Fast => "Fast",
        SpeedBand::Moderate => "Moderate",
        SpeedBand::Slow => "Slow",
    }
}

/// Formats a duration in seconds, e.g. 65 -> "1m 5s".
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

/// Milliseconds as seconds with one decimal, e.g. 12345 -> "12.3s".
#[allow(clippy::cast_precision_loss)]
fn format_millis(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown control characters so learner-facing text renders as-is.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            // Table cells cannot hold newlines
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}
