use crate::error::{Error, Result};
use crate::llm::{ModelSettings, Provider, ReasoningEffort};
use crate::ocr::OcrMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,
    /// Falls back to the provider's default model when unset.
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    /// Retries for timeouts and connection failures only. Zero means fail fast.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            reasoning_effort: None,
            api_key_env: None,
            base_url: None,
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn settings(&self) -> Result<ModelSettings> {
        Ok(ModelSettings {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            reasoning_effort: self
                .reasoning_effort
                .as_deref()
                .map(ReasoningEffort::parse)
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_min_reasoning_len")]
    pub min_reasoning_len: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_reasoning_len: default_min_reasoning_len(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub mode: OcrMode,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            mode: OcrMode::default(),
            max_in_flight: default_max_in_flight(),
            temperature: 0.0,
            results_dir: default_results_dir(),
        }
    }
}

/// How the chat agent trims history before each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStrategy {
    #[default]
    Full,
    KeepLast,
    KeepLastWithTools,
    UserOnly,
    TokenGuard,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub history: HistoryStrategy,
    /// Messages kept by the `keep_last*` strategies.
    #[serde(default = "default_keep_messages")]
    pub keep_messages: usize,
    #[serde(default = "default_token_threshold")]
    pub token_threshold: usize,
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_turns: default_max_turns(),
            history: HistoryStrategy::default(),
            keep_messages: default_keep_messages(),
            token_threshold: default_token_threshold(),
            tools: default_tools(),
        }
    }
}

// Defaults
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_min_reasoning_len() -> usize {
    crate::classify::DEFAULT_MIN_REASONING_LEN
}
fn default_max_in_flight() -> usize {
    crate::gate::DEFAULT_MAX_IN_FLIGHT
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("files/results")
}
fn default_system_prompt() -> String {
    "You are a helpful and playful assistant".into()
}
fn default_max_turns() -> u32 {
    crate::agent::DEFAULT_MAX_TURNS
}
fn default_keep_messages() -> usize {
    3
}
fn default_token_threshold() -> usize {
    1000
}
fn default_tools() -> Vec<String> {
    vec!["roll_dice".into()]
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.model().trim().is_empty() {
            return Err(Error::config("llm.model must not be empty"));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::config("llm.max_tokens must be greater than 0"));
        }
        if let Some(t) = self.llm.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(Error::config(format!(
                "llm.temperature must be between 0.0 and 2.0, got {t}"
            )));
        }
        self.llm.settings()?;
        if self.classifier.max_in_flight == 0 || self.ocr.max_in_flight == 0 {
            return Err(Error::config("max_in_flight must be at least 1"));
        }
        for tool in &self.agent.tools {
            if !matches!(tool.as_str(), "roll_dice" | "check_weather") {
                return Err(Error::config(format!(
                    "unknown agent tool '{tool}' (expected roll_dice, check_weather)"
                )));
            }
        }
        Ok(())
    }
}
