//! Error types for the Quotient engine.
//!
//! This module defines the error hierarchy for everything outside the pure
//! session core: configuration loading, problem bank loading, and language
//! model interactions. Invalid session input is not an error; the controller
//! reports it through outcome enums instead.

use std::path::PathBuf;

/// A specialized `Result` type for Quotient engine operations.
pub type Result<T> = std::result::Result<T, QuotientError>;

/// Errors that can occur while bootstrapping or enriching a session.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum QuotientError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your quotient.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Problem Bank Errors
    // ========================================================================
    /// Problem bank file was not found at the specified path.
    #[error("Problem bank not found: '{path}'\n\nSuggestion: Check the 'problemBank' field in quotient.json or pass --bank")]
    BankNotFound {
        /// Path where the bank was expected.
        path: PathBuf,
    },

    /// Problem bank file exceeds the 1MB size limit.
    #[error("Problem bank exceeds size limit (1024KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the bank into smaller files")]
    BankTooLarge {
        /// Path to the oversized bank.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Problem bank is not a valid JSON array of problems.
    #[error("Invalid problem bank '{path}': {message}\n\nSuggestion: The bank must be a JSON array of problem objects")]
    BankParseError {
        /// Path to the bank file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Problem bank parsed but contains no problems.
    #[error("Problem bank is empty: '{path}'\n\nSuggestion: Add at least one problem per level")]
    BankEmpty {
        /// Path to the empty bank.
        path: PathBuf,
    },

    /// A problem in the bank violates an entity rule.
    #[error("Invalid problem '{problem_id}': {message}")]
    BankValidationError {
        /// Identifier of the offending problem.
        problem_id: String,
        /// What is wrong with it.
        message: String,
    },

    // ========================================================================
    // Language Model Errors
    // ========================================================================
    /// LLM API returned an error (authentication, rate limiting, etc.).
    #[error("LLM API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    LlmApiError {
        /// The kind of API error (e.g., rate limit, authentication, server).
        kind: LlmErrorKind,
        /// Detailed error message from the API.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The configured provider has no API key in the environment.
    #[error("LLM provider '{provider}' is not configured\n\nSuggestion: Set the {env_var} environment variable or use the 'offline' provider")]
    LlmNotConfigured {
        /// Provider name.
        provider: String,
        /// Environment variable that should hold the key.
        env_var: String,
    },

    /// An enrichment call did not finish within its budget.
    #[error("Enrichment timeout after {timeout_ms}ms: {operation}")]
    EnrichmentTimeout {
        /// Which enrichment operation timed out ("hint", "feedback", "plan").
        operation: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A collaborator replied with content that does not fit its contract.
    #[error("Malformed response from {operation}: {message}")]
    MalformedResponse {
        /// Which enrichment operation produced the response.
        operation: String,
        /// What was wrong with it.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of LLM API errors for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The upstream call budget elapsed.
    Timeout,
    /// The provider answered with an unexpected body.
    MalformedResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl LlmErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key or credentials",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the LLM service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Timeout => "Raise llm.requestTimeoutSecs or check provider latency",
            Self::MalformedResponse => "Check the model name; the provider returned an unexpected body",
            Self::Other => "Check the LLM provider's status page",
        }
    }

    /// Classifies an HTTP status code returned by a provider.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl QuotientError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `BankNotFound` error.
    #[must_use]
    pub fn bank_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BankNotFound { path: path.into() }
    }

    /// Creates a new `BankTooLarge` error.
    #[must_use]
    pub fn bank_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::BankTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `BankParseError`.
    #[must_use]
    pub fn bank_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::BankParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `BankEmpty` error.
    #[must_use]
    pub fn bank_empty(path: impl Into<PathBuf>) -> Self {
        Self::BankEmpty { path: path.into() }
    }

    /// Creates a new `BankValidationError`.
    #[must_use]
    pub fn bank_validation(problem_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BankValidationError {
            problem_id: problem_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `LlmApiError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn llm_api_error(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::LlmApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `LlmNotConfigured` error.
    #[must_use]
    pub fn llm_not_configured(provider: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::LlmNotConfigured {
            provider: provider.into(),
            env_var: env_var.into(),
        }
    }

    /// Creates a new `EnrichmentTimeout` error.
    #[must_use]
    pub fn enrichment_timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::EnrichmentTimeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
