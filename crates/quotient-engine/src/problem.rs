//! Problem entities and the problem bank.
//!
//! The bank is a JSON array of problems loaded once at startup. It is
//! validated on load and never mutated afterwards, so it can be shared
//! behind an `Arc` without locking.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuotientError, Result};

/// Maximum allowed problem bank file size in bytes (1MB).
pub const MAX_BANK_SIZE: u64 = 1024 * 1024;

/// Difficulty tier, ordered `Easy < Medium < Hard`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Floor level.
    Easy,
    /// Starting level of every session.
    #[default]
    Medium,
    /// Ceiling level.
    Hard,
}

impl Level {
    /// All levels in ascending order.
    pub const ALL: [Self; 3] = [Self::Easy, Self::Medium, Self::Hard];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a problem expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemKind {
    /// Multiple choice; `choices` is present.
    #[serde(rename = "mcq")]
    MultipleChoice,
    /// Free-text short answer.
    #[serde(rename = "short")]
    ShortAnswer,
}

/// A practice problem as stored in the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier.
    pub id: String,
    /// Prompt text.
    pub stem: String,
    /// Answer format.
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    /// Options for multiple-choice problems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Accepted answers. The first entry is the canonical display form.
    pub answer_key: Vec<String>,
    /// Assigned difficulty.
    pub level: Level,
    /// Topic label, e.g. "addition".
    pub topic: String,
    /// Static hints, revealed in order.
    #[serde(default)]
    pub hints: Vec<String>,
}

impl Problem {
    /// The canonical answer for display.
    #[must_use]
    pub fn canonical_answer(&self) -> Option<&str> {
        self.answer_key.first().map(String::as_str)
    }

    /// Client-facing view without the answer key.
    #[must_use]
    pub fn view(&self) -> ProblemView {
        ProblemView {
            id: self.id.clone(),
            stem: self.stem.clone(),
            kind: self.kind,
            choices: self.choices.clone(),
            level: self.level,
            topic: self.topic.clone(),
            hint_count: self.hints.len(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(QuotientError::bank_validation(
                "<blank>",
                "problem id must not be empty",
            ));
        }
        if self.answer_key.iter().all(|key| key.trim().is_empty()) {
            return Err(QuotientError::bank_validation(
                &self.id,
                "answer_key must contain at least one non-empty answer",
            ));
        }
        match (self.kind, &self.choices) {
            (ProblemKind::MultipleChoice, None) => Err(QuotientError::bank_validation(
                &self.id,
                "multiple-choice problems must list choices",
            )),
            (ProblemKind::MultipleChoice, Some(choices)) if choices.is_empty() => Err(
                QuotientError::bank_validation(&self.id, "choices must not be empty"),
            ),
            (ProblemKind::ShortAnswer, Some(_)) => Err(QuotientError::bank_validation(
                &self.id,
                "short-answer problems must not list choices",
            )),
            _ => Ok(()),
        }
    }
}

/// What a client sees of a problem. The answer key never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemView {
    /// Problem identifier.
    pub id: String,
    /// Prompt text.
    pub stem: String,
    /// Answer format.
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    /// Options for multiple-choice problems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Assigned difficulty.
    pub level: Level,
    /// Topic label.
    pub topic: String,
    /// Number of static hints available.
    pub hint_count: usize,
}

/// The validated, read-only set of problems for a process.
#[derive(Debug, Clone)]
pub struct ProblemBank {
    path: Option<PathBuf>,
    problems: Vec<Problem>,
}

impl ProblemBank {
    /// Loads and validates a problem bank from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `QuotientError::BankNotFound` if the file doesn't exist,
    /// `BankTooLarge` above 1MB, `BankParseError` for anything that is not a
    /// JSON array of problems, `BankEmpty` for an empty array, and
    /// `BankValidationError` for duplicate ids or malformed entries.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                QuotientError::bank_not_found(path)
            } else {
                QuotientError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_BANK_SIZE {
            return Err(QuotientError::bank_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                QuotientError::bank_parse(path, "file is not valid UTF-8")
            } else {
                QuotientError::Io(e)
            }
        })?;

        let problems: Vec<Problem> = serde_json::from_str(&content)
            .map_err(|e| QuotientError::bank_parse(path, e.to_string()))?;

        if problems.is_empty() {
            return Err(QuotientError::bank_empty(path));
        }

        let mut bank = Self::from_problems(problems)?;
        bank.path = Some(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));

        tracing::info!(
            path = %path.display(),
            problems = bank.len(),
            easy = bank.count_by_level(Level::Easy),
            medium = bank.count_by_level(Level::Medium),
            hard = bank.count_by_level(Level::Hard),
            "Loaded problem bank"
        );
        for level in Level::ALL {
            if bank.count_by_level(level) == 0 {
                tracing::warn!(%level, "Problem bank has no problems at this level");
            }
        }

        Ok(bank)
    }

    /// Builds a bank from problems already in memory, applying the same
    /// validation as [`ProblemBank::load`].
    pub fn from_problems(problems: Vec<Problem>) -> Result<Self> {
        if problems.is_empty() {
            return Err(QuotientError::bank_empty("<memory>"));
        }

        let mut seen = HashSet::with_capacity(problems.len());
        for problem in &problems {
            problem.validate()?;
            if !seen.insert(problem.id.as_str()) {
                return Err(QuotientError::bank_validation(
                    &problem.id,
                    "duplicate problem id",
                ));
            }
        }

        Ok(Self {
            path: None,
            problems,
        })
    }

    /// Where the bank was loaded from, if it came from disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All problems in bank order.
    #[must_use]
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Problems assigned to `level`.
    pub fn by_level(&self, level: Level) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(move |p| p.level == level)
    }

    /// Looks up a problem by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    /// Number of problems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// Always `false` for a constructed bank; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of problems at `level`.
    #[must_use]
    pub fn count_by_level(&self, level: Level) -> usize {
        self.by_level(level).count()
    }
}
