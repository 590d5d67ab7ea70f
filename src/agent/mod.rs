//! Multi-turn chat agent with tool calling and history processing.
//!
//! Each turn the full message list is passed through the configured history
//! processors, checked, and sent to the model. Tool calls in the reply are
//! executed and their results appended as a user message; the loop ends when
//! the model answers without calling a tool or `max_turns` is hit.

pub mod tools;

use crate::error::{Error, Result};
use crate::history::{self, HistoryProcessor};
use crate::llm::{
    ContentBlock, ConversationMessage, GenerationRequest, GenerationService, ModelSettings, Role,
    StopReason, Usage,
};
use tools::Tool;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TURNS: u32 = 8;

/// Outcome of one [`Agent::run`].
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub output: String,
    /// Prior history followed by everything this run added.
    pub messages: Vec<ConversationMessage>,
    /// Index into `messages` where this run's messages begin.
    pub new_messages_start: usize,
    pub usage: Usage,
    pub turns: u32,
}

impl AgentRun {
    pub fn new_messages(&self) -> &[ConversationMessage] {
        &self.messages[self.new_messages_start..]
    }
}

pub struct Agent<S> {
    service: S,
    system: String,
    tools: Vec<Box<dyn Tool>>,
    processors: Vec<Box<dyn HistoryProcessor>>,
    settings: Option<ModelSettings>,
    max_turns: u32,
}

impl<S: GenerationService> Agent<S> {
    pub fn new(service: S, system: impl Into<String>) -> Self {
        Self {
            service,
            system: system.into(),
            tools: Vec::new(),
            processors: Vec::new(),
            settings: None,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    pub fn with_processor(mut self, processor: impl HistoryProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub async fn run(
        &self,
        prompt: &str,
        history: Vec<ConversationMessage>,
    ) -> Result<AgentRun> {
        if prompt.trim().is_empty() {
            return Err(Error::invalid_input("prompt is empty"));
        }
        let new_messages_start = history.len();
        let mut messages = history;
        messages.push(ConversationMessage::user_text(prompt));

        let definitions: Vec<_> = self.tools.iter().map(|t| t.definition()).collect();
        let mut usage = Usage::default();
        let mut turns = 0;

        loop {
            if turns >= self.max_turns {
                warn!(turns, "hit max turns limit");
                return Err(Error::TurnLimit(turns));
            }

            let window = history::apply(&self.processors, messages.clone());
            history::check_history(&window)?;

            let request = GenerationRequest {
                system: self.system.clone(),
                messages: window,
                tools: definitions.clone(),
                output: None,
                settings: self.settings,
            };
            let completion = self.service.generate(&request).await?;
            turns += 1;
            usage.add(&completion.usage);
            debug!(turn = turns, stop = ?completion.stop_reason, "agent turn");

            let calls: Vec<(String, String, serde_json::Value)> = completion
                .tool_calls()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            let output = completion.text();
            let truncated = completion.stop_reason == StopReason::MaxTokens;
            let mut content = completion.content;
            if truncated && !calls.is_empty() {
                // Calls from a cut-off reply are never executed.
                warn!(calls = calls.len(), "reply hit max tokens, dropping its tool calls");
                content.retain(|b| !matches!(b, ContentBlock::ToolUse { .. }));
            }
            if !content.is_empty() {
                messages.push(ConversationMessage {
                    role: Role::Assistant,
                    content,
                });
            }

            if calls.is_empty() || truncated {
                info!(turns, input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, "agent finished");
                return Ok(AgentRun {
                    output,
                    messages,
                    new_messages_start,
                    usage,
                    turns,
                });
            }

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                let (content, is_error) = tools::dispatch(&self.tools, &name, &input).await;
                if is_error {
                    warn!(tool = %name, result = %content, "tool call failed");
                } else {
                    info!(tool = %name, result = %content, "tool call");
                }
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content,
                    is_error,
                });
            }
            messages.push(ConversationMessage {
                role: Role::User,
                content: results,
            });
        }
    }
}
