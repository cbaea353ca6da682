//! Tutor collaborators: dynamic hints, answer feedback and study plans.
//!
//! Each call goes through a [`ChatModel`]. Failures, timeouts and malformed
//! replies never reach the session; they are replaced by the deterministic
//! texts in [`crate::fallback`], and every result says which path produced it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::EnrichmentConfig;
use crate::error::{QuotientError, Result};
use crate::fallback::{fallback_feedback, fallback_plan_steps, FALLBACK_CHALLENGE, GENERIC_HINT};
use crate::history::HistoryItem;
use crate::problem::{Level, Problem};
use crate::session::GradedAnswer;

/// Number of steps a study plan must have.
pub const PLAN_STEPS: usize = 5;

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").ok());

static STEP_NUMBERING: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:(?:step\s*)?\d+\s*[.):\-]\s*|[-*•]\s+)").ok());

static CHALLENGE_HINT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^(.*?)\s*\(Hint:\s*(.*?)\)\s*$").ok());

// ============================================================================
// Model seam
// ============================================================================

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions.
    System,
    /// The request.
    User,
    /// A previous model reply.
    Assistant,
}

/// One message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A text generator the tutor can call.
pub trait ChatModel: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Completes a conversation and returns the reply text.
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String>>;
}

/// A model that is never available. Every enrichment falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineModel;

impl ChatModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    fn complete<'a>(&'a self, _messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String>> {
        futures::future::ready(Err(QuotientError::llm_not_configured(
            "offline",
            "OPENAI_API_KEY or ANTHROPIC_API_KEY",
        )))
        .boxed()
    }
}

// ============================================================================
// Requests and results
// ============================================================================

/// Which path produced an enrichment result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    /// The model answered within budget.
    Model,
    /// A local fallback was substituted.
    Fallback,
}

/// A value tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enriched<T> {
    /// The result.
    pub value: T,
    /// Where it came from.
    pub source: EnrichmentSource,
}

impl<T> Enriched<T> {
    const fn model(value: T) -> Self {
        Self {
            value,
            source: EnrichmentSource::Model,
        }
    }

    const fn fallback(value: T) -> Self {
        Self {
            value,
            source: EnrichmentSource::Fallback,
        }
    }
}

/// Input for a generated hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRequest {
    /// Problem the hint is for.
    pub problem_id: String,
    /// Prompt text.
    pub stem: String,
    /// The learner's answer, if any.
    pub user_answer: Option<String>,
    /// Accepted answers.
    pub answer_key: Vec<String>,
    /// Topic label.
    pub topic: String,
    /// Problem level.
    pub level: Level,
}

impl HintRequest {
    /// Builds a request for `problem`.
    #[must_use]
    pub fn for_problem(problem: &Problem, user_answer: Option<String>) -> Self {
        Self {
            problem_id: problem.id.clone(),
            stem: problem.stem.clone(),
            user_answer,
            answer_key: problem.answer_key.clone(),
            topic: problem.topic.clone(),
            level: problem.level,
        }
    }
}

/// Input for answer feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    /// Problem answered.
    pub problem_id: String,
    /// Prompt text.
    pub stem: String,
    /// Submitted answer.
    pub user_answer: String,
    /// Accepted answers.
    pub answer_key: Vec<String>,
    /// Grading result.
    pub correct: bool,
}

impl From<&GradedAnswer> for FeedbackRequest {
    fn from(graded: &GradedAnswer) -> Self {
        Self {
            problem_id: graded.problem.id.clone(),
            stem: graded.problem.stem.clone(),
            user_answer: graded.answer.clone(),
            answer_key: graded.problem.answer_key.clone(),
            correct: graded.item.correct,
        }
    }
}

/// A follow-up problem, optionally with a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Problem text.
    pub problem: String,
    /// Hint text from a trailing `(Hint: ...)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Challenge {
    /// Splits `"<problem> (Hint: <hint>)"`. Text without the pattern is all problem.
    ///
    /// ```
    /// use quotient_engine::Challenge;
    ///
    /// let c = Challenge::parse("Add 1/3 and 1/6 (Hint: use sixths)");
    /// assert_eq!(c.problem, "Add 1/3 and 1/6");
    /// assert_eq!(c.hint.as_deref(), Some("use sixths"));
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let captures = CHALLENGE_HINT.as_ref().and_then(|re| re.captures(text));
        if let Some(caps) = captures {
            let problem = caps.get(1).map_or("", |m| m.as_str().trim());
            let hint = caps.get(2).map_or("", |m| m.as_str().trim());
            if !problem.is_empty() {
                return Self {
                    problem: problem.to_string(),
                    hint: (!hint.is_empty()).then(|| hint.to_string()),
                };
            }
        }
        Self {
            problem: text.trim().to_string(),
            hint: None,
        }
    }
}

/// Five study steps and a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPlan {
    /// Ordered steps, without numbering.
    pub steps: Vec<String>,
    /// Follow-up problem.
    pub challenge: Challenge,
}

impl StudyPlan {
    /// The fixed plan used when generation fails.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            steps: fallback_plan_steps(),
            challenge: Challenge::parse(FALLBACK_CHALLENGE),
        }
    }

    /// Parses a model reply.
    ///
    /// The reply may be wrapped in a Markdown code fence and must be a JSON
    /// object with a `plan` array of exactly five non-empty strings and a
    /// non-empty `challenge`. Leading list numbering is removed from steps.
    pub fn parse(reply: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct RawPlan {
            plan: Option<Vec<String>>,
            challenge: Option<String>,
        }

        let body = strip_code_fence(reply);
        let raw: RawPlan = serde_json::from_str(body)
            .map_err(|e| QuotientError::malformed("plan", format!("invalid JSON: {e}")))?;

        let plan = raw
            .plan
            .ok_or_else(|| QuotientError::malformed("plan", "missing 'plan' array"))?;
        let challenge = raw
            .challenge
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| QuotientError::malformed("plan", "missing 'challenge'"))?;

        let steps: Vec<String> = plan.iter().map(|s| strip_numbering(s)).collect();
        if steps.len() != PLAN_STEPS || steps.iter().any(String::is_empty) {
            return Err(QuotientError::malformed(
                "plan",
                format!(
                    "expected {PLAN_STEPS} non-empty steps, got {}",
                    steps.iter().filter(|s| !s.is_empty()).count()
                ),
            ));
        }

        Ok(Self {
            steps,
            challenge: Challenge::parse(&challenge),
        })
    }
}

fn strip_code_fence(reply: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| reply.trim(), |m| m.as_str())
}

fn strip_numbering(step: &str) -> String {
    let stripped = match STEP_NUMBERING.as_ref() {
        Some(re) => re.replace(step, ""),
        None => step.into(),
    };
    stripped.trim().to_string()
}

// ============================================================================
// Prompts
// ============================================================================

fn hint_messages(request: &HintRequest) -> Vec<ChatMessage> {
    let answered = request.user_answer.as_deref().map_or_else(
        || "Student hasn't answered yet".to_string(),
        |a| format!("Student's answer: {a}"),
    );
    vec![
        ChatMessage::system(
            "You are a helpful math tutor. Generate a specific, encouraging hint for a student working on a fraction problem. The hint should guide them toward the correct answer without giving it away. Keep it concise and supportive.",
        ),
        ChatMessage::user(format!(
            "Problem: {}\n{answered}\nCorrect answer: {}\nTopic: {}\nLevel: {}\n\nGenerate a helpful hint that guides the student toward the correct approach.",
            request.stem,
            request.answer_key.join(", "),
            request.topic,
            request.level,
        )),
    ]
}

fn feedback_messages(request: &FeedbackRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a supportive math tutor. Provide personalized feedback for a student's answer to a fraction problem. Be encouraging and educational, explaining why the answer is correct or incorrect and how to improve. Keep it concise and helpful.",
        ),
        ChatMessage::user(format!(
            "Problem: {}\nStudent's answer: {}\nCorrect answer: {}\nWas correct: {}\n\nProvide personalized feedback that explains the result and helps the student learn.",
            request.stem,
            request.user_answer,
            request.answer_key.join(", "),
            request.correct,
        )),
    ]
}

#[allow(clippy::cast_precision_loss)]
fn plan_messages(history: &[HistoryItem], level: Level) -> Vec<ChatMessage> {
    let correct = history.iter().filter(|h| h.correct).count();
    let hints = history.iter().filter(|h| h.used_hint).count();
    let avg_secs = if history.is_empty() {
        0.0
    } else {
        history.iter().map(|h| h.time_ms).sum::<u64>() as f64 / history.len() as f64 / 1000.0
    };
    vec![
        ChatMessage::system(
            "You are an expert math tutor. Generate a personalized 5-step study plan based on a student's fraction practice history. Return each step as a clean sentence WITHOUT numbering. For the challenge, format as: \"Problem text (Hint: hint text)\" if including a hint. Return valid JSON only.",
        ),
        ChatMessage::user(format!(
            "Generate a 5-step study plan based on student's fraction practice history.\nReturn each step as a clean sentence WITHOUT numbering.\nFor challenge, format as: \"Problem text (Hint: hint text)\" if including hint.\nReturn JSON: {{\"plan\": string[], \"challenge\": string}}\n\nStudent's practice history:\n- Total problems: {}\n- Correct answers: {correct}\n- Current level: {level}\n- Average time: {avg_secs:.0} seconds\n- Hints used: {hints}\n\nGenerate a personalized study plan and challenge problem.",
            history.len(),
        )),
    ]
}

// ============================================================================
// Tutor
// ============================================================================

/// Calls the model for enrichment and substitutes fallbacks on failure.
#[derive(Clone)]
pub struct Tutor {
    model: Arc<dyn ChatModel>,
    timeouts: EnrichmentConfig,
}

impl std::fmt::Debug for Tutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tutor")
            .field("model", &self.model.name())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Tutor {
    /// Creates a tutor over `model`.
    pub fn new(model: Arc<dyn ChatModel>, timeouts: EnrichmentConfig) -> Self {
        Self { model, timeouts }
    }

    /// A tutor whose every call falls back.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineModel), EnrichmentConfig::default())
    }

    /// Name of the underlying model.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    async fn call(
        &self,
        operation: &'static str,
        messages: &[ChatMessage],
        budget: Option<Duration>,
    ) -> Result<String> {
        let reply = match budget {
            Some(budget) => tokio::time::timeout(budget, self.model.complete(messages))
                .await
                .map_err(|_| {
                    QuotientError::enrichment_timeout(
                        operation,
                        u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                    )
                })??,
            None => self.model.complete(messages).await?,
        };
        if reply.trim().is_empty() {
            return Err(QuotientError::malformed(operation, "empty reply"));
        }
        Ok(reply.trim().to_string())
    }

    /// A generated hint, or the generic encouragement after the hint budget.
    pub async fn dynamic_hint(&self, request: &HintRequest) -> Enriched<String> {
        let messages = hint_messages(request);
        match self
            .call("hint", &messages, Some(self.timeouts.hint_timeout()))
            .await
        {
            Ok(hint) => {
                tracing::debug!(problem_id = %request.problem_id, "Generated hint");
                Enriched::model(hint)
            }
            Err(e) => {
                tracing::warn!(problem_id = %request.problem_id, error = %e, "Hint generation failed, using fallback");
                Enriched::fallback(GENERIC_HINT.to_string())
            }
        }
    }

    /// Personalized feedback, or a topic explanation on failure.
    ///
    /// Only the model's own request timeout bounds this call.
    pub async fn feedback(&self, request: &FeedbackRequest) -> Enriched<String> {
        let messages = feedback_messages(request);
        match self.call("feedback", &messages, None).await {
            Ok(text) => Enriched::model(text),
            Err(e) => {
                tracing::warn!(problem_id = %request.problem_id, error = %e, "Feedback generation failed, using fallback");
                Enriched::fallback(fallback_feedback(&request.stem, request.correct).to_string())
            }
        }
    }

    /// A five-step plan for `history`, or the fixed plan after the plan budget
    /// or on a malformed reply.
    pub async fn study_plan(&self, history: &[HistoryItem], level: Level) -> Enriched<StudyPlan> {
        let messages = plan_messages(history, level);
        let result = self
            .call("plan", &messages, Some(self.timeouts.plan_timeout()))
            .await
            .and_then(|reply| StudyPlan::parse(&reply));
        match result {
            Ok(plan) => {
                tracing::debug!(steps = plan.steps.len(), "Generated study plan");
                Enriched::model(plan)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Study plan generation failed, using fallback");
                Enriched::fallback(StudyPlan::fallback())
            }
        }
    }
}
