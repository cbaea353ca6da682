//! The session state machine.
//!
//! A [`SessionController`] owns one practice session: the current level,
//! the append-only history, the recency ring and the phase of the problem
//! in play. Phases move through:
//!
//! - `Idle` -> `Active` (a problem is presented and its timer runs)
//! - `Active` -> `Submitting` (answer graded, waiting for feedback)
//! - `Submitting` -> `Idle` (feedback recorded)
//! - `Active` -> `Complete` (the answer that reaches the session limit)
//!
//! `Complete` is terminal until [`SessionController::reset`]. Invalid calls
//! are reported as [`Rejection`]s and leave the state untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::adapter::next_level;
use crate::config::Config;
use crate::enrichment::HintRequest;
use crate::fallback::{offline_hint, Topic};
use crate::history::HistoryItem;
use crate::metrics::{derive_metrics_with_threshold, Metrics};
use crate::problem::{Level, Problem, ProblemBank, ProblemView};
use crate::selector::{pick_next, RecencyRing};
use crate::validator::is_correct;

/// Level every session starts at.
pub const STARTING_LEVEL: Level = Level::Medium;

/// Policy values for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPolicy {
    /// Answers per session.
    pub session_limit: usize,
    /// Recency ring size.
    pub recency_window: usize,
    /// Fast-answer threshold for metrics.
    pub fast_answer_threshold_ms: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionPolicy {
    /// Extracts the session policy from configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            session_limit: config.session_limit,
            recency_window: config.recency_window,
            fast_answer_threshold_ms: config.fast_answer_threshold_ms,
        }
    }
}

/// How far up the hint ladder the active problem is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintStage {
    /// No hint shown.
    #[default]
    Hidden,
    /// The first static hint is shown.
    Static,
    /// A generated hint has been appended.
    Dynamic,
}

impl HintStage {
    /// Stage as 0, 1 or 2.
    #[must_use]
    pub const fn index(&self) -> u8 {
        match self {
            Self::Hidden => 0,
            Self::Static => 1,
            Self::Dynamic => 2,
        }
    }
}

/// A problem in play.
#[derive(Debug, Clone)]
pub struct ActiveProblem {
    /// The problem.
    pub problem: Problem,
    /// When it was presented.
    pub presented_at: DateTime<Utc>,
    /// Level in force at presentation; recorded in the history item.
    pub level_at_presentation: Level,
    /// Hint ladder position.
    pub hint_stage: HintStage,
    /// Hint texts revealed so far.
    pub revealed_hints: Vec<String>,
    /// A dynamic hint has been requested and not yet resolved.
    pub hint_loading: bool,
}

/// A graded answer waiting for its feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFeedback {
    /// Problem that was answered.
    pub problem_id: String,
    /// Whether the answer was correct.
    pub correct: bool,
}

/// Where the session is.
#[derive(Debug, Clone, Default)]
pub enum SessionPhase {
    /// Ready to present a problem.
    #[default]
    Idle,
    /// A problem is presented and unanswered.
    Active(ActiveProblem),
    /// An answer was graded; feedback is being produced.
    Submitting(PendingFeedback),
    /// The session limit was reached.
    Complete,
}

impl SessionPhase {
    /// Short lowercase name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active(_) => "active",
            Self::Submitting(_) => "submitting",
            Self::Complete => "complete",
        }
    }
}

/// Explanation shown after an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Problem the feedback is about.
    pub problem_id: String,
    /// Whether the answer was correct.
    pub correct: bool,
    /// Text for the learner.
    pub explanation: String,
}

impl Feedback {
    /// The default explanation used when no tutor is involved.
    #[must_use]
    pub fn canned(problem_id: impl Into<String>, correct: bool) -> Self {
        let explanation = if correct {
            "Great job! You solved this problem correctly."
        } else {
            "Not quite right. Let's review the steps for this type of problem."
        };
        Self {
            problem_id: problem_id.into(),
            correct,
            explanation: explanation.to_string(),
        }
    }
}

/// Why a call was refused. The session is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// A problem is already in play.
    #[error("problem '{problem_id}' is still active")]
    ProblemActive {
        /// The active problem.
        problem_id: String,
    },
    /// Nothing to answer or hint.
    #[error("no problem is active")]
    NoActiveProblem,
    /// The previous answer is still being evaluated.
    #[error("the previous answer is still being evaluated")]
    AwaitingFeedback,
    /// Feedback arrived with no graded answer waiting for it.
    #[error("no answer is waiting for feedback")]
    NotAwaitingFeedback,
    /// Feedback is for a different problem than the graded one.
    #[error("feedback is for '{got}' but '{expected}' was graded")]
    FeedbackMismatch {
        /// Problem that was graded.
        expected: String,
        /// Problem named by the feedback.
        got: String,
    },
    /// The session limit was reached.
    #[error("the session is complete; reset to start a new one")]
    SessionComplete,
    /// Blank answers are not graded.
    #[error("answer must not be empty")]
    EmptyAnswer,
    /// A generated hint is already on its way.
    #[error("a hint is already being generated")]
    HintLoading,
}

/// Result of [`SessionController::present_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentOutcome {
    /// A new problem is active.
    Presented(ProblemView),
    /// No unseen problem remains at `level`.
    Exhausted {
        /// Level that ran dry.
        level: Level,
    },
    /// The session is over.
    SessionComplete,
    /// Refused.
    Rejected(Rejection),
}

/// A graded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    /// The history item that was appended.
    pub item: HistoryItem,
    /// The answered problem.
    pub problem: Problem,
    /// The submitted text as given.
    pub answer: String,
    /// Level before adaptation.
    pub level_before: Level,
    /// Level after adaptation; equal to `level_before` when complete.
    pub level_after: Level,
    /// This answer reached the session limit.
    pub session_complete: bool,
}

impl GradedAnswer {
    /// Whether adaptation moved the level.
    #[must_use]
    pub fn level_changed(&self) -> bool {
        self.level_before != self.level_after
    }
}

/// Result of [`SessionController::submit_answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Graded and recorded.
    Graded(GradedAnswer),
    /// Refused.
    Rejected(Rejection),
}

/// Result of [`SessionController::advance_hint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintOutcome {
    /// Stage 1: a static hint, shown immediately.
    Static(String),
    /// Stage 2: the caller should generate a hint and call
    /// [`SessionController::resolve_dynamic_hint`].
    DynamicRequested(HintRequest),
    /// Both stages are used up.
    AlreadyMaxed,
    /// Refused.
    Rejected(Rejection),
}

/// Serializable view of the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Phase name.
    pub phase: String,
    /// Current level.
    pub level: Level,
    /// Answers recorded.
    pub answered: usize,
    /// Answers per session.
    pub session_limit: usize,
    /// Problem in play.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_problem: Option<ProblemView>,
    /// Hint ladder position for the active problem.
    pub hint_stage: HintStage,
    /// Hints revealed for the active problem.
    pub revealed_hints: Vec<String>,
    /// Whether a generated hint is pending.
    pub hint_loading: bool,
    /// Most recent feedback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<Feedback>,
    /// Recently served problem ids, oldest first.
    pub recent_problem_ids: Vec<String>,
    /// Whether the session limit was reached.
    pub complete: bool,
}

/// Owns one session and serializes all of its transitions.
///
/// Generic over the random source so selection can be made deterministic.
#[derive(Debug)]
pub struct SessionController<R = StdRng> {
    bank: Arc<ProblemBank>,
    policy: SessionPolicy,
    rng: R,
    session_id: String,
    level: Level,
    history: Vec<HistoryItem>,
    recent: RecencyRing,
    phase: SessionPhase,
    last_feedback: Option<Feedback>,
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionController<StdRng> {
    /// Creates a controller seeded from the operating system.
    #[must_use]
    pub fn new(bank: Arc<ProblemBank>, policy: SessionPolicy) -> Self {
        Self::with_rng(bank, policy, StdRng::from_os_rng())
    }
}

impl<R: Rng> SessionController<R> {
    /// Creates a controller with an explicit random source.
    pub fn with_rng(bank: Arc<ProblemBank>, policy: SessionPolicy, rng: R) -> Self {
        let session_id = new_session_id();
        tracing::info!(session_id = %session_id, problems = bank.len(), "Session started");
        Self {
            bank,
            policy,
            rng,
            session_id,
            level: STARTING_LEVEL,
            history: Vec::new(),
            recent: RecencyRing::new(policy.recency_window),
            phase: SessionPhase::Idle,
            last_feedback: None,
        }
    }

    /// Presents the next problem at the current level.
    pub fn present_next(&mut self) -> PresentOutcome {
        self.present_next_at(Utc::now())
    }

    /// [`Self::present_next`] with an explicit presentation time.
    pub fn present_next_at(&mut self, now: DateTime<Utc>) -> PresentOutcome {
        match &self.phase {
            SessionPhase::Idle => {}
            SessionPhase::Complete => return PresentOutcome::SessionComplete,
            _ => return PresentOutcome::Rejected(self.reject("present")),
        }

        if self.history.len() >= self.policy.session_limit {
            self.complete();
            return PresentOutcome::SessionComplete;
        }

        let picked = pick_next(
            self.level,
            self.recent.as_slice(),
            self.bank.problems(),
            &mut self.rng,
        )
        .cloned();

        let Some(problem) = picked else {
            tracing::warn!(
                level = %self.level,
                recent = ?self.recent.as_slice(),
                "No unseen problems left at this level"
            );
            return PresentOutcome::Exhausted { level: self.level };
        };

        tracing::debug!(problem_id = %problem.id, level = %self.level, "Presenting problem");
        let view = problem.view();
        self.phase = SessionPhase::Active(ActiveProblem {
            problem,
            presented_at: now,
            level_at_presentation: self.level,
            hint_stage: HintStage::Hidden,
            revealed_hints: Vec::new(),
            hint_loading: false,
        });
        PresentOutcome::Presented(view)
    }

    /// Grades an answer to the active problem.
    pub fn submit_answer(&mut self, answer: &str) -> SubmitOutcome {
        self.submit_answer_at(answer, Utc::now())
    }

    /// [`Self::submit_answer`] with an explicit submission time.
    ///
    /// The history item is appended before the adapter runs, and the adapter
    /// runs before any further selection. The answer that reaches the session
    /// limit completes the session without adapting.
    pub fn submit_answer_at(&mut self, answer: &str, now: DateTime<Utc>) -> SubmitOutcome {
        if !matches!(self.phase, SessionPhase::Active(_)) {
            return SubmitOutcome::Rejected(self.reject("submit"));
        }
        if answer.trim().is_empty() {
            tracing::warn!("Rejected empty answer");
            return SubmitOutcome::Rejected(Rejection::EmptyAnswer);
        }

        let active = match std::mem::take(&mut self.phase) {
            SessionPhase::Active(active) => active,
            other => {
                self.phase = other;
                return SubmitOutcome::Rejected(Rejection::NoActiveProblem);
            }
        };

        let correct = is_correct(&active.problem, answer);
        let elapsed_ms = (now - active.presented_at).num_milliseconds();
        let item = HistoryItem {
            problem_id: active.problem.id.clone(),
            level_at_time: active.level_at_presentation,
            correct,
            time_ms: u64::try_from(elapsed_ms).unwrap_or(0),
            used_hint: active.hint_stage != HintStage::Hidden,
            submitted_at: now,
        };

        self.history.push(item.clone());
        self.recent.push(active.problem.id.clone());
        tracing::debug!(
            problem_id = %item.problem_id,
            correct,
            time_ms = item.time_ms,
            answered = self.history.len(),
            "Answer graded"
        );

        let level_before = self.level;
        let session_complete = self.history.len() >= self.policy.session_limit;
        if session_complete {
            self.complete();
        } else {
            let next = next_level(self.level, &self.history);
            if next != self.level {
                tracing::info!(from = %self.level, to = %next, "Level changed");
                self.level = next;
            }
            self.phase = SessionPhase::Submitting(PendingFeedback {
                problem_id: active.problem.id.clone(),
                correct,
            });
        }

        SubmitOutcome::Graded(GradedAnswer {
            item,
            problem: active.problem,
            answer: answer.to_string(),
            level_before,
            level_after: self.level,
            session_complete,
        })
    }

    /// Records feedback for the graded answer and frees the session for the
    /// next problem. Also accepted once complete, for the final answer.
    pub fn record_feedback(&mut self, feedback: Feedback) -> Result<(), Rejection> {
        let expected = match &self.phase {
            SessionPhase::Submitting(pending) => pending.problem_id.clone(),
            SessionPhase::Complete => match self.history.last() {
                Some(last) => last.problem_id.clone(),
                None => return Err(Rejection::NotAwaitingFeedback),
            },
            _ => return Err(Rejection::NotAwaitingFeedback),
        };
        if expected != feedback.problem_id {
            return Err(Rejection::FeedbackMismatch {
                expected,
                got: feedback.problem_id,
            });
        }

        if matches!(self.phase, SessionPhase::Submitting(_)) {
            self.phase = SessionPhase::Idle;
        }
        self.last_feedback = Some(feedback);
        Ok(())
    }

    /// Moves the active problem one step up the hint ladder.
    pub fn advance_hint(&mut self) -> HintOutcome {
        if !matches!(self.phase, SessionPhase::Active(_)) {
            return HintOutcome::Rejected(self.reject("hint"));
        }
        let SessionPhase::Active(active) = &mut self.phase else {
            return HintOutcome::Rejected(Rejection::NoActiveProblem);
        };
        if active.hint_loading {
            return HintOutcome::Rejected(Rejection::HintLoading);
        }

        match active.hint_stage {
            HintStage::Hidden => {
                let text = active.problem.hints.first().cloned().unwrap_or_else(|| {
                    offline_hint(Topic::for_problem(&active.problem)).to_string()
                });
                active.hint_stage = HintStage::Static;
                active.revealed_hints.push(text.clone());
                tracing::debug!(problem_id = %active.problem.id, "Static hint revealed");
                HintOutcome::Static(text)
            }
            HintStage::Static => {
                active.hint_loading = true;
                HintOutcome::DynamicRequested(HintRequest::for_problem(&active.problem, None))
            }
            HintStage::Dynamic => HintOutcome::AlreadyMaxed,
        }
    }

    /// Appends a generated hint to the active problem.
    ///
    /// Returns `false` and changes nothing if `problem_id` is no longer the
    /// active problem or no generated hint was requested.
    pub fn resolve_dynamic_hint(&mut self, problem_id: &str, text: impl Into<String>) -> bool {
        match &mut self.phase {
            SessionPhase::Active(active)
                if active.problem.id == problem_id && active.hint_loading =>
            {
                active.hint_loading = false;
                active.hint_stage = HintStage::Dynamic;
                active.revealed_hints.push(text.into());
                true
            }
            _ => {
                tracing::debug!(problem_id, "Dropping generated hint for inactive problem");
                false
            }
        }
    }

    /// Starts a fresh session over the same bank.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.session_id, new_session_id());
        self.level = STARTING_LEVEL;
        self.history.clear();
        self.recent.clear();
        self.phase = SessionPhase::Idle;
        self.last_feedback = None;
        tracing::info!(previous = %previous, session_id = %self.session_id, "Session reset");
    }

    /// Serializable view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let active = match &self.phase {
            SessionPhase::Active(active) => Some(active),
            _ => None,
        };
        SessionSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase.name().to_string(),
            level: self.level,
            answered: self.history.len(),
            session_limit: self.policy.session_limit,
            active_problem: active.map(|a| a.problem.view()),
            hint_stage: active.map(|a| a.hint_stage).unwrap_or_default(),
            revealed_hints: active.map(|a| a.revealed_hints.clone()).unwrap_or_default(),
            hint_loading: active.is_some_and(|a| a.hint_loading),
            last_feedback: self.last_feedback.clone(),
            recent_problem_ids: self.recent.as_slice().to_vec(),
            complete: self.is_complete(),
        }
    }

    /// Metrics for the history so far.
    pub fn metrics(&self) -> Metrics {
        derive_metrics_with_threshold(&self.history, self.policy.fast_answer_threshold_ms)
    }

    /// Recorded attempts, oldest first.
    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    /// Current level.
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Current session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current phase.
    pub const fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Whether the session limit was reached.
    pub const fn is_complete(&self) -> bool {
        matches!(self.phase, SessionPhase::Complete)
    }

    /// The shared problem bank.
    pub fn bank(&self) -> &Arc<ProblemBank> {
        &self.bank
    }

    /// Policy values in force.
    pub const fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Most recent feedback.
    pub const fn last_feedback(&self) -> Option<&Feedback> {
        self.last_feedback.as_ref()
    }

    fn complete(&mut self) {
        self.phase = SessionPhase::Complete;
        tracing::info!(
            session_id = %self.session_id,
            answered = self.history.len(),
            "Session complete"
        );
    }

    fn reject(&self, operation: &'static str) -> Rejection {
        let rejection = match &self.phase {
            SessionPhase::Idle => Rejection::NoActiveProblem,
            SessionPhase::Active(active) => Rejection::ProblemActive {
                problem_id: active.problem.id.clone(),
            },
            SessionPhase::Submitting(_) => Rejection::AwaitingFeedback,
            SessionPhase::Complete => Rejection::SessionComplete,
        };
        tracing::warn!(operation, phase = self.phase.name(), %rejection, "Rejected");
        rejection
    }
}
