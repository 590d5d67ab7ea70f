use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({platform}): {message}")]
    Api {
        platform: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited by {platform}")]
    RateLimit {
        platform: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Schema validation failed: {}", join_violations(.0))]
    SchemaValidation(Vec<FieldViolation>),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Agent stopped after {0} turns without a final answer")]
    TurnLimit(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One field of a structured response that did not match its declared shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub expected: String,
    pub received: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': expected {}, received {}",
            self.field, self.expected, self.received
        )
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn api(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn api_with_status(
        platform: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn schema(violation: FieldViolation) -> Self {
        Self::SchemaValidation(vec![violation])
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Failures that originate at the generation service rather than in the caller's input
    /// or the shape of a response.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Api { .. } | Self::RateLimit { .. }
        )
    }

    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::SchemaValidation(v) => v,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_each_field() {
        let err = Error::SchemaValidation(vec![
            FieldViolation::new("category", "one of [joy, anger]", "\"joyful\""),
            FieldViolation::new("reasoning", "a string", "missing"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("field 'category': expected one of [joy, anger], received \"joyful\""));
        assert!(msg.contains("field 'reasoning': expected a string, received missing"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn upstream_grouping() {
        assert!(Error::http("timeout").is_upstream());
        assert!(Error::api_with_status("api.openai.com", "boom", 500).is_upstream());
        assert!(
            Error::RateLimit {
                platform: "api.openai.com".into(),
                retry_after_secs: Some(3),
            }
            .is_upstream()
        );
        assert!(!Error::invalid_input("empty").is_upstream());
        assert!(!Error::schema(FieldViolation::new("a", "b", "c")).is_upstream());
    }
}
