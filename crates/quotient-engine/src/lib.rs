//! Quotient engine
//!
//! Adaptive fraction practice: problem bank, grading, difficulty adaptation,
//! metrics, the session state machine, tutor enrichment with local
//! fallbacks, and the HTTP/WebSocket surface.

pub mod adapter;
pub mod api;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod fallback;
pub mod history;
pub mod llm;
pub mod metrics;
pub mod problem;
pub mod selector;
pub mod service;
pub mod session;
pub mod validator;

pub use adapter::next_level;
pub use api::{create_router, AnswerRequest, ErrorResponse};
pub use config::{Config, EnrichmentConfig, LlmConfig, LlmProvider};
pub use enrichment::{
    ChatMessage, ChatModel, Challenge, Enriched, EnrichmentSource, FeedbackRequest, HintRequest,
    OfflineModel, Role, StudyPlan, Tutor,
};
pub use error::{LlmErrorKind, QuotientError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use fallback::Topic;
pub use history::HistoryItem;
pub use llm::LlmClient;
pub use metrics::{derive_metrics, derive_metrics_with_threshold, Grade, Metrics, PerformanceBand, SpeedBand};
pub use problem::{Level, Problem, ProblemBank, ProblemKind, ProblemView, MAX_BANK_SIZE};
pub use selector::{pick_next, RecencyRing};
pub use service::{AnswerResult, HintResult, NextProblem, SessionService};
pub use session::{
    Feedback, GradedAnswer, HintOutcome, HintStage, PresentOutcome, Rejection, SessionController,
    SessionPhase, SessionPolicy, SessionSnapshot, SubmitOutcome, STARTING_LEVEL,
};
pub use validator::is_correct;
