//! Answer checking.
//!
//! Matching is exact after trimming and lowercasing. Equivalent forms
//! ("3/4", "0.75") must each be listed in the answer key; no numeric
//! equivalence is attempted.

use crate::problem::Problem;

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Returns `true` if `submitted` matches any accepted answer of `problem`.
///
/// Fails closed: an empty submission or an empty answer key is never correct.
pub fn is_correct(problem: &Problem, submitted: &str) -> bool {
    let answer = normalize(submitted);
    if answer.is_empty() || problem.answer_key.is_empty() {
        return false;
    }
    problem
        .answer_key
        .iter()
        .map(|key| normalize(key))
        .any(|key| !key.is_empty() && key == answer)
}
