use crate::error::{Error, FieldViolation, Result};
use crate::http::{HttpClient, extract_domain};
use crate::schema::OutputShape;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// LLM provider. Determines API format and endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    OpenRouter,
    /// Local Ollama server speaking the OpenAI-compatible API.
    Ollama,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::config(format!(
                "unknown provider '{other}' (expected anthropic, openai, openrouter, ollama)"
            ))),
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Ollama => "OLLAMA_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5",
            Self::OpenAi => "gpt-4o-mini",
            Self::OpenRouter => "openai/gpt-4o-mini",
            Self::Ollama => "bielik_v3_q8_tools",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::config(format!(
                "unknown reasoning effort '{other}' (expected low, medium, high)"
            ))),
        }
    }
}

/// Sampling parameters sent with each request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSettings {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: None,
            reasoning_effort: None,
        }
    }
}

// -- Conversation model (provider-neutral) --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Base64-encoded image bytes.
    Image {
        media_type: String,
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ConversationMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn has_tool_result(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Character count of everything that is sent as text, used for rough token estimates.
    pub fn text_len(&self) -> usize {
        self.content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.chars().count(),
                ContentBlock::Image { .. } => 0,
                ContentBlock::ToolUse { name, input, .. } => {
                    name.chars().count() + input.to_string().chars().count()
                }
                ContentBlock::ToolResult { content, .. } => content.chars().count(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl Completion {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}

/// Everything a single generation round trip needs.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolDef>,
    /// Required response shape; the service must answer with a matching JSON object.
    pub output: Option<OutputShape>,
    /// Overrides the client's default settings for this request.
    pub settings: Option<ModelSettings>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: vec![ConversationMessage::user_text(user_message)],
            ..Default::default()
        }
    }

    pub fn with_output(mut self, shape: OutputShape) -> Self {
        self.output = Some(shape);
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// A text-generation backend. [`LlmClient`] is the HTTP implementation.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Completion>;

    /// Default settings for requests that do not override them.
    fn settings(&self) -> ModelSettings {
        ModelSettings::default()
    }
}

#[async_trait]
impl<T: GenerationService + ?Sized> GenerationService for Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<Completion> {
        (**self).generate(request).await
    }

    fn settings(&self) -> ModelSettings {
        (**self).settings()
    }
}

#[async_trait]
impl<'a, T: GenerationService + ?Sized> GenerationService for &'a T {
    async fn generate(&self, request: &GenerationRequest) -> Result<Completion> {
        (**self).generate(request).await
    }

    fn settings(&self) -> ModelSettings {
        (**self).settings()
    }
}

pub struct LlmClient {
    provider: Provider,
    api_key: String,
    model: String,
    settings: ModelSettings,
    base_url: String,
    http: HttpClient,
}

// -- Anthropic format --

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: Role,
    content: Vec<AnthropicBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// -- OpenAI-compatible format --

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<OpenAiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunction<'a>,
}

#[derive(Serialize)]
struct OpenAiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "default_call_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

fn default_call_kind() -> String {
    "function".into()
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl LlmClient {
    pub fn new(
        provider: Provider,
        api_key: String,
        model: String,
        settings: ModelSettings,
        base_url: Option<String>,
    ) -> Result<Self> {
        let http = HttpClient::new("structured-llm/0.1.0", Duration::from_secs(180))?;
        let base_url = base_url.unwrap_or_else(|| provider.default_base_url().into());
        Ok(Self {
            provider,
            api_key,
            model,
            settings,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build from config, reading the API key from the specified env var.
    pub fn from_config(config: &crate::config::LlmConfig) -> Result<Self> {
        let env_var = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| config.provider.default_api_key_env().into());
        let api_key = std::env::var(&env_var).unwrap_or_default();
        if api_key.is_empty() && config.provider != Provider::Ollama {
            warn!(env = %env_var, "API key not set, requests will likely be rejected");
        }
        let mut client = Self::new(
            config.provider,
            api_key,
            config.model().to_string(),
            config.settings()?,
            config.base_url.clone(),
        )?;
        client.http = HttpClient::new(
            "structured-llm/0.1.0",
            Duration::from_secs(config.timeout_secs),
        )?
        .with_retries(config.max_retries);
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// A 2xx reply whose envelope cannot be read is the service's fault, not the shape's.
    fn malformed(&self, message: impl Into<String>) -> Error {
        Error::api(extract_domain(&self.base_url), message)
    }

    /// Send a single prompt and return the text of the reply.
    pub async fn complete(&self, system: &str, user_message: &str) -> Result<String> {
        let completion = self
            .generate(&GenerationRequest::new(system, user_message))
            .await?;
        Ok(completion.text())
    }

    async fn generate_anthropic(&self, request: &GenerationRequest) -> Result<Completion> {
        let settings = request.settings.unwrap_or(self.settings);
        if settings.reasoning_effort.is_some() {
            debug!("reasoning_effort is not sent to Anthropic");
        }

        let mut tools = request.tools.clone();
        let mut tool_choice = None;
        if let Some(shape) = &request.output {
            tools.push(ToolDef {
                name: shape.name.clone(),
                description: format!("Respond with the final '{}' result.", shape.name),
                input_schema: shape.json_schema(),
            });
            tool_choice = Some(json!({"type": "tool", "name": shape.name}));
        }

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: settings.max_tokens,
            system: &request.system,
            messages: request.messages.iter().map(to_anthropic_message).collect(),
            temperature: settings.temperature,
            tools,
            tool_choice,
        };
        let body = serde_json::to_string(&body)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/messages", self.base_url);
        let response_text = self
            .http
            .post_json_raw(
                &url,
                &body,
                &[
                    ("x-api-key", self.api_key.as_str()),
                    ("anthropic-version", "2023-06-01"),
                ],
            )
            .await
            .map_err(|e| {
                warn!("Anthropic API error: {e}");
                e
            })?;

        let resp: AnthropicResponse = serde_json::from_str(&response_text)
            .map_err(|e| self.malformed(format!("unreadable Anthropic response: {e}")))?;

        let usage = resp
            .usage
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        let mut content = Vec::new();
        let mut structured = None;
        for block in resp.content {
            match block {
                AnthropicResponseBlock::Text { text } => content.push(ContentBlock::Text { text }),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    match &request.output {
                        Some(shape) if shape.name == name => structured = Some(input),
                        _ => content.push(ContentBlock::ToolUse { id, name, input }),
                    }
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        if request.output.is_some() {
            // The forced tool's input is the structured answer.
            let text = structured.map(|v| v.to_string()).unwrap_or_else(|| {
                content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            return Ok(Completion {
                content: vec![ContentBlock::Text { text }],
                stop_reason: StopReason::EndTurn,
                usage,
            });
        }

        let stop_reason = match resp.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };
        Ok(Completion {
            content,
            stop_reason,
            usage,
        })
    }

    async fn generate_openai(&self, request: &GenerationRequest) -> Result<Completion> {
        let settings = request.settings.unwrap_or(self.settings);

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(OpenAiMessage {
                role: "system",
                content: Some(OpenAiContent::Text(request.system.clone())),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        for msg in &request.messages {
            messages.extend(to_openai_messages(msg));
        }

        let body = OpenAiRequest {
            model: &self.model,
            max_tokens: settings.max_tokens,
            messages,
            temperature: settings.temperature,
            reasoning_effort: settings.reasoning_effort,
            tools: request
                .tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function",
                    function: OpenAiFunction {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.input_schema,
                    },
                })
                .collect(),
            response_format: request.output.as_ref().map(|shape| {
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": shape.name,
                        "strict": true,
                        "schema": shape.json_schema(),
                    }
                })
            }),
        };
        let body = serde_json::to_string(&body)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/chat/completions", self.base_url);
        let auth = format!("Bearer {}", self.api_key);
        let response_text = self
            .http
            .post_json_raw(&url, &body, &[("Authorization", auth.as_str())])
            .await
            .map_err(|e| {
                warn!("LLM API error: {e}");
                e
            })?;

        let resp: OpenAiResponse = serde_json::from_str(&response_text)
            .map_err(|e| self.malformed(format!("unreadable completion response: {e}")))?;

        let usage = resp
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.malformed("completion response has no choices"))?;

        if let Some(refusal) = choice.message.refusal {
            let expected = request
                .output
                .as_ref()
                .map(|s| format!("a '{}' object", s.name))
                .unwrap_or_else(|| "an answer".into());
            return Err(Error::schema(FieldViolation::new(
                "(response)",
                expected,
                format!("refusal: {refusal}"),
            )));
        }

        let mut content = Vec::new();
        if let Some(text) = choice.message.content
            && !text.is_empty()
        {
            content.push(ContentBlock::Text { text });
        }
        for call in choice.message.tool_calls {
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments));
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("stop") => StopReason::EndTurn,
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ if content
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolUse { .. })) =>
            {
                StopReason::ToolUse
            }
            _ => StopReason::Other,
        };

        Ok(Completion {
            content,
            stop_reason,
            usage,
        })
    }
}

#[async_trait]
impl GenerationService for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Completion> {
        debug!(
            provider = ?self.provider,
            model = %self.model,
            messages = request.messages.len(),
            structured = request.output.is_some(),
            "sending LLM request"
        );

        match self.provider {
            Provider::Anthropic => self.generate_anthropic(request).await,
            Provider::OpenAi | Provider::OpenRouter | Provider::Ollama => {
                self.generate_openai(request).await
            }
        }
    }

    fn settings(&self) -> ModelSettings {
        self.settings
    }
}

fn to_anthropic_message(msg: &ConversationMessage) -> AnthropicMessage {
    let content = msg
        .content
        .iter()
        .map(|b| match b {
            ContentBlock::Text { text } => AnthropicBlock::Text { text: text.clone() },
            ContentBlock::Image { media_type, data } => AnthropicBlock::Image {
                source: AnthropicImageSource {
                    kind: "base64",
                    media_type: media_type.clone(),
                    data: data.clone(),
                },
            },
            ContentBlock::ToolUse { id, name, input } => AnthropicBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => AnthropicBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
        })
        .collect();
    AnthropicMessage {
        role: msg.role,
        content,
    }
}

/// One neutral message can expand to several OpenAI messages: each tool result is its own
/// `tool` message.
fn to_openai_messages(msg: &ConversationMessage) -> Vec<OpenAiMessage> {
    let mut out = Vec::new();
    match msg.role {
        Role::User => {
            let mut parts = Vec::new();
            for block in &msg.content {
                match block {
                    ContentBlock::Text { text } => parts.push(OpenAiPart::Text { text: text.clone() }),
                    ContentBlock::Image { media_type, data } => parts.push(OpenAiPart::ImageUrl {
                        image_url: OpenAiImageUrl {
                            url: format!("data:{media_type};base64,{data}"),
                        },
                    }),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => out.push(OpenAiMessage {
                        role: "tool",
                        content: Some(OpenAiContent::Text(content.clone())),
                        tool_calls: Vec::new(),
                        tool_call_id: Some(tool_use_id.clone()),
                    }),
                    ContentBlock::ToolUse { .. } => {}
                }
            }
            if !parts.is_empty() {
                let content = match parts.as_slice() {
                    [OpenAiPart::Text { text }] => OpenAiContent::Text(text.clone()),
                    _ => OpenAiContent::Parts(parts),
                };
                out.push(OpenAiMessage {
                    role: "user",
                    content: Some(content),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                });
            }
        }
        Role::Assistant => {
            let text = msg.text();
            let tool_calls: Vec<OpenAiToolCall> = msg
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, name, input } => Some(OpenAiToolCall {
                        id: id.clone(),
                        kind: default_call_kind(),
                        function: OpenAiFunctionCall {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    }),
                    _ => None,
                })
                .collect();
            out.push(OpenAiMessage {
                role: "assistant",
                content: (!text.is_empty()).then_some(OpenAiContent::Text(text)),
                tool_calls,
                tool_call_id: None,
            });
        }
    }
    out
}
