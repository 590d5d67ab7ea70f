//! Fixed three-class sentiment classification, scored against labelled samples.

use super::{ClassificationRequest, Classifier};
use crate::error::Result;
use crate::llm::GenerationService;
use serde::Serialize;
use tracing::{info, warn};

pub const SENTIMENT_LABELS: [&str; 3] = ["positive", "negative", "neutral"];

/// Built-in product reviews with their expected sentiment.
pub const SAMPLE_REVIEWS: [(&str, &str); 7] = [
    ("This product is absolutely amazing! Best purchase ever!", "positive"),
    ("Terrible quality, broke after one day. Very disappointed.", "negative"),
    ("It's okay, nothing special but does the job.", "neutral"),
    ("I love this! Exceeded all my expectations.", "positive"),
    ("Waste of money. Do not recommend at all.", "negative"),
    ("The product works as advertised. No complaints.", "neutral"),
    ("Outstanding quality and fast shipping!", "positive"),
];

#[derive(Debug, Clone, Serialize)]
pub struct SampleOutcome {
    pub text: String,
    pub expected: String,
    /// `None` when the request failed; the error text is in `error`.
    pub predicted: Option<String>,
    pub reasoning: Option<String>,
    pub error: Option<String>,
}

impl SampleOutcome {
    pub fn is_correct(&self) -> bool {
        self.predicted.as_deref() == Some(self.expected.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentReport {
    pub outcomes: Vec<SampleOutcome>,
    pub correct: usize,
    pub total: usize,
}

impl SentimentReport {
    /// Percentage of samples classified as expected; 0 for an empty run.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }
}

/// Classify each sample as positive, negative or neutral and score against the expected label.
///
/// Failed requests count as incorrect and are recorded rather than aborting the run.
pub async fn evaluate<S: GenerationService>(
    classifier: &Classifier<S>,
    samples: &[(&str, &str)],
) -> Result<SentimentReport> {
    let requests = samples
        .iter()
        .map(|(text, _)| ClassificationRequest::new(*text, SENTIMENT_LABELS, Some("sentiment")))
        .collect::<Result<Vec<_>>>()?;

    let results = classifier.classify_batch(&requests).await;

    let mut outcomes = Vec::with_capacity(samples.len());
    for ((text, expected), result) in samples.iter().zip(results) {
        let outcome = match result {
            Ok(r) => SampleOutcome {
                text: text.to_string(),
                expected: expected.to_string(),
                predicted: Some(r.category),
                reasoning: Some(r.reasoning),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "sentiment sample failed");
                SampleOutcome {
                    text: text.to_string(),
                    expected: expected.to_string(),
                    predicted: None,
                    reasoning: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let correct = outcomes.iter().filter(|o| o.is_correct()).count();
    let report = SentimentReport {
        total: outcomes.len(),
        correct,
        outcomes,
    };
    info!(
        correct = report.correct,
        total = report.total,
        accuracy = format!("{:.1}%", report.accuracy()),
        "sentiment evaluation finished"
    );
    Ok(report)
}
