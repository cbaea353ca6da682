//! Configuration types for Quotient.
//!
//! Session policy values (session length, recency window, fast-answer
//! threshold), language model provider selection, and enrichment timeouts
//! are all read from `quotient.json`. Every field has a documented default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuotientError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "quotient.json";

/// Default problem bank path.
fn default_problem_bank() -> String {
    "problems.json".to_string()
}

/// Default number of answers per session.
const fn default_session_limit() -> usize {
    10
}

/// Default size of the recency ring.
const fn default_recency_window() -> usize {
    5
}

/// Default fast-answer threshold in milliseconds.
const fn default_fast_answer_threshold_ms() -> u64 {
    30_000
}

/// Default output directory for reports.
fn default_output_dir() -> String {
    ".".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    20
}

const fn default_max_tokens() -> u32 {
    500
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_hint_timeout_ms() -> u64 {
    3_000
}

const fn default_plan_timeout_ms() -> u64 {
    5_000
}

/// Main configuration for Quotient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the problem bank JSON file.
    #[serde(default = "default_problem_bank")]
    pub problem_bank: String,

    /// Number of answers after which a session is complete.
    #[serde(default = "default_session_limit")]
    pub session_limit: usize,

    /// Number of recently served problem ids excluded from selection.
    #[serde(default = "default_recency_window")]
    pub recency_window: usize,

    /// Answers at or under this many milliseconds count as fast.
    #[serde(default = "default_fast_answer_threshold_ms")]
    pub fast_answer_threshold_ms: u64,

    /// Output directory for generated reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Language model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Enrichment call budgets.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            problem_bank: default_problem_bank(),
            session_limit: default_session_limit(),
            recency_window: default_recency_window(),
            fast_answer_threshold_ms: default_fast_answer_threshold_ms(),
            output_dir: default_output_dir(),
            llm: LlmConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `quotient.json` in the current directory. If not found,
    /// returns the default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            QuotientError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `quotient.json` inside `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `QuotientError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `QuotientError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., a zero session limit, empty paths).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(QuotientError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| QuotientError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.session_limit == 0 {
            return Err(QuotientError::config_validation(
                "sessionLimit must be greater than 0",
                "Set sessionLimit to at least 1 in your quotient.json",
            ));
        }

        if self.fast_answer_threshold_ms == 0 {
            return Err(QuotientError::config_validation(
                "fastAnswerThresholdMs must be greater than 0",
                "Set fastAnswerThresholdMs to at least 1 in your quotient.json",
            ));
        }

        if self.problem_bank.trim().is_empty() {
            return Err(QuotientError::config_validation(
                "problemBank path must not be empty",
                "Provide a valid problem bank path in your quotient.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(QuotientError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your quotient.json (use '.' for current directory)",
            ));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(QuotientError::config_validation(
                "llm.requestTimeoutSecs must be greater than 0",
                "Set llm.requestTimeoutSecs to at least 1 second in your quotient.json",
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(QuotientError::config_validation(
                format!("llm.temperature {} is out of range", self.llm.temperature),
                "Use a temperature between 0.0 and 2.0",
            ));
        }

        if self.enrichment.hint_timeout_ms == 0 || self.enrichment.plan_timeout_ms == 0 {
            return Err(QuotientError::config_validation(
                "enrichment timeouts must be greater than 0",
                "Set enrichment.hintTimeoutMs and enrichment.planTimeoutMs to at least 1",
            ));
        }

        Ok(())
    }
}

/// Supported language model providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProvider {
    /// `OpenAI` chat completions (default).
    #[default]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// No provider; every enrichment call falls back.
    Offline,
}

impl LlmProvider {
    /// Parses a string into an `LlmProvider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    /// Lowercase provider name as written in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Offline => "offline",
        }
    }

    /// Model used when `llm.model` is not set.
    #[must_use]
    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-haiku-20240307",
            Self::Offline => "offline",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    #[must_use]
    pub const fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Offline => None,
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LlmProvider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid LLM provider '{s}': expected one of 'openai', 'anthropic', 'offline'"
            ))
        })
    }
}

impl Serialize for LlmProvider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Provider to call for hints, feedback and study plans.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model override; the provider default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Upstream call budget shared by every enrichment request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// The model to request, falling back to the provider default.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// The upstream request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Budgets for the bounded enrichment calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentConfig {
    /// Dynamic hint budget in milliseconds.
    #[serde(default = "default_hint_timeout_ms")]
    pub hint_timeout_ms: u64,

    /// Study plan budget in milliseconds.
    #[serde(default = "default_plan_timeout_ms")]
    pub plan_timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            hint_timeout_ms: default_hint_timeout_ms(),
            plan_timeout_ms: default_plan_timeout_ms(),
        }
    }
}

impl EnrichmentConfig {
    /// Dynamic hint timeout.
    #[must_use]
    pub const fn hint_timeout(&self) -> Duration {
        Duration::from_millis(self.hint_timeout_ms)
    }

    /// Study plan timeout.
    #[must_use]
    pub const fn plan_timeout(&self) -> Duration {
        Duration::from_millis(self.plan_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.problem_bank, "problems.json");
        assert_eq!(config.session_limit, 10);
        assert_eq!(config.recency_window, 5);
        assert_eq!(config.fast_answer_threshold_ms, 30_000);
        assert_eq!(config.output_dir, ".");
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.request_timeout_secs, 20);
        assert_eq!(config.enrichment.hint_timeout_ms, 3_000);
        assert_eq!(config.enrichment.plan_timeout_ms, 5_000);
    }

    #[test]
    fn test_llm_provider_serialization() {
        assert_eq!(
            serde_json::to_string(&LlmProvider::OpenAi).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::to_string(&LlmProvider::Anthropic).unwrap(),
            "\"anthropic\""
        );
        assert_eq!(
            serde_json::to_string(&LlmProvider::Offline).unwrap(),
            "\"offline\""
        );
    }

    #[test]
    fn test_llm_provider_case_insensitive() {
        let config: Config = serde_json::from_str(r#"{"llm": {"provider": "ANTHROPIC"}}"#).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);

        let config: Config = serde_json::from_str(r#"{"llm": {"provider": "OpenAI"}}"#).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);

        let config: Config = serde_json::from_str(r#"{"llm": {"provider": "Offline"}}"#).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Offline);
    }

    #[test]
    fn test_invalid_llm_provider_error() {
        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{"llm": {"provider": "gemini"}}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid LLM provider"));
        assert!(err.contains("gemini"));
    }

    #[test]
    fn test_model_name_falls_back_to_provider_default() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.model_name(), "gpt-4o-mini");

        llm.provider = LlmProvider::Anthropic;
        assert_eq!(llm.model_name(), "claude-3-haiku-20240307");

        llm.model = Some("gpt-4o".to_string());
        assert_eq!(llm.model_name(), "gpt-4o");
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "problemBank": "bank.json",
            "sessionLimit": 4,
            "enrichment": { "hintTimeoutMs": 100 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.problem_bank, "bank.json");
        assert_eq!(config.session_limit, 4);
        assert_eq!(config.enrichment.hint_timeout_ms, 100);
        assert_eq!(config.enrichment.plan_timeout_ms, 5_000);
        assert_eq!(config.recency_window, 5);
    }

    #[test]
    fn test_load_from_file_valid_json() {
        let config_path = std::env::temp_dir().join("test_quotient_valid.json");
        std::fs::write(
            &config_path,
            r#"{"sessionLimit": 6, "llm": {"provider": "offline"}}"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.session_limit, 6);
        assert_eq!(config.llm.provider, LlmProvider::Offline);
        assert_eq!(config.fast_answer_threshold_ms, 30_000);

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let config_path = std::env::temp_dir().join("test_quotient_invalid.json");
        std::fs::write(&config_path, b"{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, QuotientError::ConfigParseError { path, message } if *path == config_path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(&PathBuf::from("/nonexistent/quotient.json")).unwrap();
        assert_eq!(config.session_limit, 10);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
    }

    #[test]
    fn test_load_from_dir_finds_quotient_json() {
        let temp_dir = std::env::temp_dir().join("test_quotient_dir");
        std::fs::create_dir_all(&temp_dir).unwrap();
        let config_path = temp_dir.join("quotient.json");
        std::fs::write(&config_path, r#"{"problemBank": "dir_bank.json"}"#).unwrap();

        let config = Config::load_from_dir(&temp_dir).unwrap();
        assert_eq!(config.problem_bank, "dir_bank.json");

        std::fs::remove_file(&config_path).ok();
        std::fs::remove_dir(&temp_dir).ok();
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"sessionLimit": 3, "theme": "dark"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.session_limit, 3);
    }

    #[test]
    fn test_config_validation_zero_session_limit() {
        let config = Config {
            session_limit: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sessionLimit"));
    }

    #[test]
    fn test_config_validation_zero_threshold() {
        let config = Config {
            fast_answer_threshold_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(QuotientError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_config_validation_empty_paths() {
        let config = Config {
            problem_bank: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            output_dir: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_enrichment_timeouts() {
        let mut config = Config::default();
        config.enrichment.plan_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_recency_window_is_valid() {
        let config = Config {
            recency_window: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeouts_as_durations() {
        let config = Config::default();
        assert_eq!(config.enrichment.hint_timeout(), Duration::from_secs(3));
        assert_eq!(config.enrichment.plan_timeout(), Duration::from_secs(5));
        assert_eq!(config.llm.request_timeout(), Duration::from_secs(20));
    }
}
