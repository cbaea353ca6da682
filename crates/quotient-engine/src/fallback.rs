//! Locally computed responses used when the tutor model is unavailable.
//!
//! Everything here is deterministic and needs no I/O.

use serde::{Deserialize, Serialize};

use crate::problem::Problem;

/// Substituted when a dynamic hint fails or times out.
pub const GENERIC_HINT: &str = "Keep trying! You're on the right track.";

/// Substituted challenge when the study plan fails.
pub const FALLBACK_CHALLENGE: &str =
    "Great work today. Keep practicing to improve your fraction skills!";

const FALLBACK_PLAN: [&str; 5] = [
    "Review the problems you found challenging",
    "Practice similar problems to reinforce learning",
    "Focus on understanding concepts rather than memorizing",
    "Try solving problems without hints first",
    "Keep practicing regularly to maintain your skills",
];

const PRAISE: [&str; 5] = [
    "That's correct! Excellent work.",
    "Great job! You solved this problem correctly.",
    "Perfect! You're getting the hang of this.",
    "Well done! That's the right answer.",
    "Excellent! You're making great progress.",
];

/// Broad fraction topic, inferred from a label or from stem keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Adding fractions.
    Addition,
    /// Subtracting fractions.
    Subtraction,
    /// Multiplying fractions.
    Multiplication,
    /// Dividing fractions.
    Division,
    /// Reducing to lowest terms.
    Simplification,
    /// Ordering fractions.
    Comparison,
    /// Anything else.
    General,
}

impl Topic {
    /// Infers a topic from stem keywords. The first matching rule wins.
    ///
    /// ```
    /// use quotient_engine::Topic;
    ///
    /// assert_eq!(Topic::from_stem("What is 1/4 plus 1/4?"), Topic::Addition);
    /// assert_eq!(Topic::from_stem("Reduce 6/8"), Topic::Simplification);
    /// assert_eq!(Topic::from_stem("Name this fraction"), Topic::General);
    /// ```
    #[must_use]
    pub fn from_stem(stem: &str) -> Self {
        let stem = stem.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| stem.contains(w));

        if has(&["add", "plus", "+"]) {
            Self::Addition
        } else if has(&["subtract", "minus", "-"]) {
            Self::Subtraction
        } else if has(&["multiply", "times", "×"]) {
            Self::Multiplication
        } else if has(&["divide", "÷"]) {
            Self::Division
        } else if has(&["simplify", "reduce"]) {
            Self::Simplification
        } else if has(&["compare", "greater", "less"]) {
            Self::Comparison
        } else {
            Self::General
        }
    }

    /// Parses a topic label such as `"addition"`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "addition" => Some(Self::Addition),
            "subtraction" => Some(Self::Subtraction),
            "multiplication" => Some(Self::Multiplication),
            "division" => Some(Self::Division),
            "simplification" => Some(Self::Simplification),
            "comparison" => Some(Self::Comparison),
            _ => None,
        }
    }

    /// The problem's labelled topic, else the one its stem suggests.
    #[must_use]
    pub fn for_problem(problem: &Problem) -> Self {
        Self::from_label(&problem.topic).unwrap_or_else(|| Self::from_stem(&problem.stem))
    }

    /// Title-case name for reports.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Addition => "Addition",
            Self::Subtraction => "Subtraction",
            Self::Multiplication => "Multiplication",
            Self::Division => "Division",
            Self::Simplification => "Simplification",
            Self::Comparison => "Comparison",
            Self::General => "General Fractions",
        }
    }
}

/// Topic-specific hint that needs no model.
#[must_use]
pub const fn offline_hint(topic: Topic) -> &'static str {
    match topic {
        Topic::Addition => "Remember to add the numerators and keep the same denominator when the denominators are equal.",
        Topic::Subtraction => "Remember to subtract the numerators and keep the same denominator when the denominators are equal.",
        Topic::Multiplication => "Multiply the numerators together and the denominators together.",
        Topic::Division => "To divide fractions, multiply by the reciprocal of the second fraction.",
        Topic::Simplification => "Look for common factors in both the numerator and denominator.",
        Topic::Comparison => "Convert both fractions to have the same denominator to compare them easily.",
        Topic::General => "Break the problem into smaller steps and work through each one carefully.",
    }
}

/// Canned feedback for an answer.
///
/// Correct answers get one of five praise lines, chosen from the stem so the
/// same problem always gets the same line. Incorrect answers get an
/// explanation for the stem's topic.
#[must_use]
pub fn fallback_feedback(stem: &str, correct: bool) -> &'static str {
    if correct {
        let index = stem.bytes().fold(0usize, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(usize::from(b))
        }) % PRAISE.len();
        return PRAISE[index];
    }

    match Topic::from_stem(stem) {
        Topic::Addition => "Not quite right. Remember to add the numerators and keep the same denominator for fractions with the same denominator.",
        Topic::Subtraction => "Not quite right. Remember to subtract the numerators and keep the same denominator for fractions with the same denominator.",
        Topic::Multiplication => "Not quite right. For multiplying fractions, multiply the numerators together and the denominators together.",
        Topic::Division => "Not quite right. For dividing fractions, multiply by the reciprocal of the second fraction.",
        Topic::Simplification => "Not quite right. Look for common factors in the numerator and denominator to simplify.",
        Topic::Comparison => "Not quite right. Try converting to equivalent fractions with the same denominator to compare.",
        Topic::General => "Not quite right. Let's review the steps for this type of problem. Take your time and think through each step carefully.",
    }
}

/// The fixed five-step study plan.
#[must_use]
pub fn fallback_plan_steps() -> Vec<String> {
    FALLBACK_PLAN.iter().map(ToString::to_string).collect()
}
