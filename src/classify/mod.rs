//! Classification into a label set chosen at call time.
//!
//! Each call builds a fresh [`OutputShape`] whose `category` field is a closed
//! enumeration over the caller's labels, sends one request with that shape
//! attached, and checks the decoded answer against it. A category the model
//! invents is an error, never a silent fallback.

pub mod sentiment;

use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::llm::{GenerationRequest, GenerationService};
use crate::schema::{FieldSpec, OutputShape};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFAULT_MIN_REASONING_LEN: usize = 10;
const DEFAULT_DOMAIN: &str = "category";
const SHAPE_NAME: &str = "classification_result";

/// Ordered, duplicate-free, non-empty list of labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    labels: Vec<String>,
}

impl CategorySet {
    /// Labels are trimmed before the empty and duplicate checks.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (i, label) in labels.into_iter().enumerate() {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return Err(Error::invalid_input(format!("category #{i} is empty")));
            }
            if !seen.insert(label.to_string()) {
                return Err(Error::invalid_input(format!(
                    "duplicate category '{label}'"
                )));
            }
            out.push(label.to_string());
        }
        if out.is_empty() {
            return Err(Error::invalid_input("at least one category is required"));
        }
        Ok(Self { labels: out })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Validated input for one classification. Only [`ClassificationRequest::new`] builds one,
/// so the text is never blank and the categories are always a valid set.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    text: String,
    categories: CategorySet,
    domain: Option<String>,
}

impl ClassificationRequest {
    pub fn new<I, S>(text: impl Into<String>, categories: I, domain: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::invalid_input("text to classify is empty"));
        }
        Ok(Self {
            text,
            categories: CategorySet::new(categories)?,
            domain: domain.map(str::to_string),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub reasoning: String,
}

pub struct Classifier<S> {
    service: S,
    gate: AdmissionGate,
    min_reasoning_len: usize,
}

impl<S: GenerationService> Classifier<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            gate: AdmissionGate::default(),
            min_reasoning_len: DEFAULT_MIN_REASONING_LEN,
        }
    }

    pub fn with_min_reasoning_len(mut self, min_len: usize) -> Self {
        self.min_reasoning_len = min_len;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.gate = AdmissionGate::new(max_in_flight);
        self
    }

    pub fn from_config(service: S, config: &crate::config::ClassifierConfig) -> Self {
        Self::new(service)
            .with_min_reasoning_len(config.min_reasoning_len)
            .with_max_in_flight(config.max_in_flight)
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub async fn classify<I, T>(
        &self,
        text: &str,
        categories: I,
        domain: Option<&str>,
    ) -> Result<ClassificationResult>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let request = ClassificationRequest::new(text, categories, domain)?;
        self.classify_request(&request).await
    }

    pub async fn classify_request(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult> {
        let shape = result_shape(&request.categories, self.min_reasoning_len);
        let domain = request.domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
        let generation = GenerationRequest::new(
            system_prompt(&request.categories, domain, self.min_reasoning_len),
            request.text.clone(),
        )
        .with_output(shape.clone());

        debug!(
            categories = request.categories.len(),
            domain,
            "classifying text"
        );
        let completion = self
            .gate
            .run(self.service.generate(&generation))
            .await
            .inspect_err(|e| warn!(error = %e, "classification request failed"))?;

        let fields = shape.decode(&completion.text()).inspect_err(|e| {
            warn!(error = %e, "classification response rejected");
        })?;
        let result: ClassificationResult = serde_json::from_value(fields.into())
            .map_err(|e| Error::parse(format!("decode classification: {e}")))?;

        info!(category = %result.category, "classified");
        Ok(result)
    }

    /// Classify every request concurrently, bounded by the admission gate.
    /// Results come back in input order.
    pub async fn classify_batch(
        &self,
        requests: &[ClassificationRequest],
    ) -> Vec<Result<ClassificationResult>> {
        join_all(requests.iter().map(|r| self.classify_request(r))).await
    }
}

fn result_shape(categories: &CategorySet, min_reasoning_len: usize) -> OutputShape {
    let labels = categories.labels().to_vec();
    OutputShape::new(
        SHAPE_NAME,
        vec![
            FieldSpec::one_of(
                "category",
                format!("Must be one of: {}", labels.join(", ")),
                labels,
            ),
            FieldSpec::text(
                "reasoning",
                "Explanation for classification",
                min_reasoning_len.max(1),
            ),
        ],
    )
}

fn system_prompt(categories: &CategorySet, domain: &str, min_reasoning_len: usize) -> String {
    format!(
        "Classify text into one of these {domain} categories: {}.\n\
         Respond with a JSON object with two fields: \"category\", exactly one of the listed \
         values, and \"reasoning\", an explanation of at least {} characters.",
        categories.labels().join(", "),
        min_reasoning_len.max(1),
    )
}
