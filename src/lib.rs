pub mod agent;
pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod history;
pub mod http;
pub mod llm;
pub mod ocr;
pub mod schema;

pub use classify::{CategorySet, ClassificationRequest, ClassificationResult, Classifier};
pub use error::{Error, FieldViolation, Result};
pub use llm::{GenerationService, LlmClient};

/// CLI override for LLM provider/model.
pub struct LlmOverride {
    pub provider: Option<llm::Provider>,
    pub model: Option<String>,
}

impl LlmOverride {
    /// Apply to a loaded `[llm]` section. A provider change without an explicit model switches to
    /// that provider's default model.
    pub fn apply(&self, config: &mut config::LlmConfig) {
        if let Some(provider) = self.provider
            && provider != config.provider
        {
            config.provider = provider;
            config.model = None;
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::Provider;

    #[test]
    fn provider_override_resets_model() {
        let mut config = config::LlmConfig {
            model: Some("gpt-4.1".into()),
            ..Default::default()
        };
        LlmOverride {
            provider: Some(Provider::Anthropic),
            model: None,
        }
        .apply(&mut config);
        assert_eq!(config.model(), "claude-sonnet-4-5");

        LlmOverride {
            provider: None,
            model: Some("claude-opus-4-1".into()),
        }
        .apply(&mut config);
        assert_eq!(config.model(), "claude-opus-4-1");
    }
}
