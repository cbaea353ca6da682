//! Shared session service.
//!
//! [`SessionService`] is the single owner of the live session. Every
//! transition runs under one async mutex; tutor calls run on spawned tasks
//! with the lock released, and their results are applied after re-locking
//! only if the session has not been reset in the meantime.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::enrichment::{Enriched, EnrichmentSource, FeedbackRequest, StudyPlan, Tutor};
use crate::events::{AnswerGradedPayload, EventBroadcaster, HintRevealedPayload, SessionEvent};
use crate::fallback::{fallback_feedback, GENERIC_HINT};
use crate::history::HistoryItem;
use crate::metrics::Metrics;
use crate::problem::{Level, ProblemBank, ProblemView};
use crate::session::{
    Feedback, GradedAnswer, HintOutcome, HintStage, PresentOutcome, Rejection,
    SessionController, SessionSnapshot, SubmitOutcome,
};

/// Result of asking for the next problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NextProblem {
    /// A problem is now active.
    Presented {
        /// The problem.
        problem: ProblemView,
    },
    /// Every problem at `level` was served recently.
    Exhausted {
        /// Level that ran dry.
        level: Level,
    },
    /// The session limit was reached.
    SessionComplete,
}

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    /// Problem answered.
    pub problem_id: String,
    /// Grading result.
    pub correct: bool,
    /// Time taken.
    pub time_ms: u64,
    /// Feedback text.
    pub feedback: String,
    /// Where the feedback came from.
    pub feedback_source: EnrichmentSource,
    /// Level after adaptation.
    pub level: Level,
    /// Whether adaptation moved the level.
    pub level_changed: bool,
    /// Answers recorded.
    pub answered: usize,
    /// This answer finished the session.
    pub session_complete: bool,
}

/// Result of asking for a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResult {
    /// Problem the hints are for.
    pub problem_id: String,
    /// Ladder stage after the request.
    pub stage: HintStage,
    /// All hints revealed so far.
    pub hints: Vec<String>,
    /// Source of the newest hint when it was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EnrichmentSource>,
    /// Nothing new was revealed because both stages are used.
    pub maxed: bool,
}

/// A graded answer waiting for its feedback.
#[derive(Debug, Clone)]
struct PendingAnswer {
    graded: GradedAnswer,
    session_id: String,
    answered: usize,
}

/// Owns the live session, the tutor and the event broadcaster.
#[derive(Debug, Clone)]
pub struct SessionService {
    controller: Arc<Mutex<SessionController>>,
    tutor: Tutor,
    broadcaster: EventBroadcaster,
}

impl SessionService {
    /// Creates a service around `controller`.
    #[must_use]
    pub fn new(controller: SessionController, tutor: Tutor, broadcaster: EventBroadcaster) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            tutor,
            broadcaster,
        }
    }

    /// The event broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// The tutor.
    #[must_use]
    pub const fn tutor(&self) -> &Tutor {
        &self.tutor
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.controller.lock().await.snapshot()
    }

    /// Current metrics.
    pub async fn metrics(&self) -> Metrics {
        self.controller.lock().await.metrics()
    }

    /// Recorded attempts, oldest first.
    pub async fn history(&self) -> Vec<HistoryItem> {
        self.controller.lock().await.history().to_vec()
    }

    /// The problem bank.
    pub async fn bank(&self) -> Arc<ProblemBank> {
        Arc::clone(self.controller.lock().await.bank())
    }

    /// Presents the next problem.
    ///
    /// # Errors
    ///
    /// Returns the controller's [`Rejection`] when a problem is active or an
    /// answer is still being evaluated.
    pub async fn next_problem(&self) -> Result<NextProblem, Rejection> {
        let (outcome, number) = {
            let mut controller = self.controller.lock().await;
            let outcome = controller.present_next();
            (outcome, controller.history().len() + 1)
        };

        match outcome {
            PresentOutcome::Presented(problem) => {
                self.broadcaster
                    .send(SessionEvent::problem_presented(problem.clone(), number));
                Ok(NextProblem::Presented { problem })
            }
            PresentOutcome::Exhausted { level } => Ok(NextProblem::Exhausted { level }),
            PresentOutcome::SessionComplete => Ok(NextProblem::SessionComplete),
            PresentOutcome::Rejected(rejection) => Err(rejection),
        }
    }

    /// Grades `answer`, waits for feedback and records it.
    ///
    /// The session stays in its submitting phase while feedback is produced,
    /// so no other problem can be presented meanwhile. Feedback is produced
    /// and recorded on a spawned task, so dropping this future never leaves
    /// the session stuck in that phase.
    ///
    /// # Errors
    ///
    /// Returns the controller's [`Rejection`] for blank answers or when no
    /// problem is active.
    pub async fn submit(&self, answer: &str) -> Result<AnswerResult, Rejection> {
        let pending = {
            let mut controller = self.controller.lock().await;
            match controller.submit_answer(answer) {
                SubmitOutcome::Graded(graded) => PendingAnswer {
                    graded,
                    session_id: controller.session_id().to_string(),
                    answered: controller.history().len(),
                },
                SubmitOutcome::Rejected(rejection) => return Err(rejection),
            }
        };

        let task = tokio::spawn({
            let service = self.clone();
            let pending = pending.clone();
            async move {
                let feedback = service
                    .tutor
                    .feedback(&FeedbackRequest::from(&pending.graded))
                    .await;
                service.finish_submission(&pending, feedback).await
            }
        });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, problem_id = %pending.graded.problem.id, "Feedback task failed");
                let canned = Enriched {
                    value: fallback_feedback(&pending.graded.problem.stem, pending.graded.item.correct)
                        .to_string(),
                    source: EnrichmentSource::Fallback,
                };
                self.finish_submission(&pending, canned).await
            }
        };
        Ok(result)
    }

    /// Records feedback for a graded answer and announces it.
    ///
    /// Nothing is recorded or broadcast when the session was reset after
    /// grading; the result still describes the graded answer.
    async fn finish_submission(
        &self,
        pending: &PendingAnswer,
        feedback: Enriched<String>,
    ) -> AnswerResult {
        let graded = &pending.graded;
        let Enriched { value: text, source } = feedback;

        let recorded = {
            let mut controller = self.controller.lock().await;
            if controller.session_id() == pending.session_id {
                let feedback = Feedback {
                    problem_id: graded.problem.id.clone(),
                    correct: graded.item.correct,
                    explanation: text.clone(),
                };
                if let Err(rejection) = controller.record_feedback(feedback) {
                    tracing::warn!(%rejection, problem_id = %graded.problem.id, "Discarding feedback");
                }
                Some(graded.session_complete.then(|| controller.metrics()))
            } else {
                None
            }
        };

        match recorded {
            Some(final_metrics) => {
                self.broadcaster
                    .send(SessionEvent::AnswerGraded(AnswerGradedPayload {
                        problem_id: graded.problem.id.clone(),
                        correct: graded.item.correct,
                        time_ms: graded.item.time_ms,
                        feedback: text.clone(),
                        source,
                        answered: pending.answered,
                    }));
                if graded.level_changed() {
                    self.broadcaster
                        .send(SessionEvent::level_changed(graded.level_before, graded.level_after));
                }
                if let Some(metrics) = final_metrics {
                    self.broadcaster
                        .send(SessionEvent::session_complete(pending.session_id.clone(), metrics));
                }
            }
            None => tracing::info!(
                session_id = %pending.session_id,
                problem_id = %graded.problem.id,
                "Session reset before feedback arrived"
            ),
        }

        AnswerResult {
            problem_id: graded.problem.id.clone(),
            correct: graded.item.correct,
            time_ms: graded.item.time_ms,
            feedback: text,
            feedback_source: source,
            level: graded.level_after,
            level_changed: graded.level_changed(),
            answered: pending.answered,
            session_complete: graded.session_complete,
        }
    }

    /// Reveals the next hint for the active problem.
    ///
    /// A generated hint is produced and applied on a spawned task, so
    /// dropping this future never leaves the hint stuck loading.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection`] when no problem is active, a generated hint is
    /// already loading, or the problem was answered before the generated
    /// hint arrived.
    pub async fn hint(&self) -> Result<HintResult, Rejection> {
        let (outcome, session_id) = {
            let mut controller = self.controller.lock().await;
            (controller.advance_hint(), controller.session_id().to_string())
        };

        match outcome {
            HintOutcome::Rejected(rejection) => Err(rejection),
            HintOutcome::AlreadyMaxed => {
                let snapshot = self.snapshot().await;
                Ok(HintResult {
                    problem_id: snapshot
                        .active_problem
                        .map(|p| p.id)
                        .unwrap_or_default(),
                    stage: snapshot.hint_stage,
                    hints: snapshot.revealed_hints,
                    source: None,
                    maxed: true,
                })
            }
            HintOutcome::Static(text) => {
                let problem_id = self
                    .snapshot()
                    .await
                    .active_problem
                    .map(|p| p.id)
                    .unwrap_or_default();
                Ok(self.reveal(problem_id, text, None).await)
            }
            HintOutcome::DynamicRequested(request) => {
                let task = tokio::spawn({
                    let service = self.clone();
                    let request = request.clone();
                    let session_id = session_id.clone();
                    async move {
                        let hint = service.tutor.dynamic_hint(&request).await;
                        service.apply_dynamic_hint(&session_id, request.problem_id, hint).await
                    }
                });
                match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(error = %e, problem_id = %request.problem_id, "Hint task failed");
                        let generic = Enriched {
                            value: GENERIC_HINT.to_string(),
                            source: EnrichmentSource::Fallback,
                        };
                        self.apply_dynamic_hint(&session_id, request.problem_id, generic)
                            .await
                    }
                }
            }
        }
    }

    /// Appends a generated hint if its session and problem are still live.
    async fn apply_dynamic_hint(
        &self,
        session_id: &str,
        problem_id: String,
        hint: Enriched<String>,
    ) -> Result<HintResult, Rejection> {
        let applied = {
            let mut controller = self.controller.lock().await;
            controller.session_id() == session_id
                && controller.resolve_dynamic_hint(&problem_id, hint.value.clone())
        };
        if !applied {
            return Err(Rejection::NoActiveProblem);
        }
        Ok(self.reveal(problem_id, hint.value, Some(hint.source)).await)
    }

    /// Broadcasts a revealed hint and returns the ladder state.
    async fn reveal(
        &self,
        problem_id: String,
        text: String,
        source: Option<EnrichmentSource>,
    ) -> HintResult {
        let snapshot = self.snapshot().await;
        self.broadcaster
            .send(SessionEvent::HintRevealed(HintRevealedPayload {
                problem_id: problem_id.clone(),
                stage: snapshot.hint_stage,
                text,
                source,
            }));

        HintResult {
            problem_id,
            stage: snapshot.hint_stage,
            hints: snapshot.revealed_hints,
            source,
            maxed: false,
        }
    }

    /// A study plan for the history so far.
    pub async fn plan(&self) -> Enriched<StudyPlan> {
        let (history, level) = {
            let controller = self.controller.lock().await;
            (controller.history().to_vec(), controller.level())
        };
        self.tutor.study_plan(&history, level).await
    }

    /// Starts a new session and returns its snapshot.
    pub async fn reset(&self) -> SessionSnapshot {
        let snapshot = {
            let mut controller = self.controller.lock().await;
            controller.reset();
            controller.snapshot()
        };
        self.broadcaster
            .send(SessionEvent::session_reset(snapshot.session_id.clone()));
        snapshot
    }
}
