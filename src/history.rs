//! Conversation history processors, applied in order before every request.

use crate::error::{Error, Result};
use crate::llm::{ContentBlock, ConversationMessage};
use std::collections::HashSet;
use tracing::info;

pub trait HistoryProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage>;
}

/// Keep only the last `n` messages.
#[derive(Debug, Clone, Copy)]
pub struct KeepLast(pub usize);

impl HistoryProcessor for KeepLast {
    fn name(&self) -> &'static str {
        "keep_last"
    }

    fn process(&self, mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        info!(count = messages.len(), keep = self.0, "trimming history");
        if messages.len() > self.0 {
            messages.drain(..messages.len() - self.0);
        }
        messages
    }
}

/// Keep the last `n` messages, widening the window by one when it would otherwise start on a
/// tool result whose call was cut off.
#[derive(Debug, Clone, Copy)]
pub struct KeepLastWithTools(pub usize);

impl HistoryProcessor for KeepLastWithTools {
    fn name(&self) -> &'static str {
        "keep_last_with_tools"
    }

    fn process(&self, mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        info!(
            count = messages.len(),
            keep = self.0,
            "trimming history, keeping tool pairs"
        );
        if messages.len() <= self.0 {
            return messages;
        }
        let mut start = messages.len() - self.0;
        let first = &messages[start];
        if first.is_user() && first.has_tool_result() && start > 0 {
            start -= 1;
        }
        messages.drain(..start);
        messages
    }
}

/// Keep only user messages.
#[derive(Debug, Clone, Copy)]
pub struct UserOnly;

impl HistoryProcessor for UserOnly {
    fn name(&self) -> &'static str {
        "user_only"
    }

    fn process(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        messages.into_iter().filter(|m| m.is_user()).collect()
    }
}

/// Keep only model responses. The result never ends with a request, so a run using it alone
/// is rejected by [`check_history`].
#[derive(Debug, Clone, Copy)]
pub struct ResponsesOnly;

impl HistoryProcessor for ResponsesOnly {
    fn name(&self) -> &'static str {
        "responses_only"
    }

    fn process(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        messages.into_iter().filter(|m| !m.is_user()).collect()
    }
}

/// Drop everything but the latest message once the estimated token count passes `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct TokenGuard {
    pub threshold: usize,
}

impl HistoryProcessor for TokenGuard {
    fn name(&self) -> &'static str {
        "token_guard"
    }

    fn process(&self, mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        let tokens = estimate_tokens(&messages);
        info!(tokens, threshold = self.threshold, "current token usage");
        if tokens > self.threshold && messages.len() > 1 {
            info!("token threshold reached, trimming historical dialogue");
            messages.drain(..messages.len() - 1);
        }
        messages
    }
}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(messages: &[ConversationMessage]) -> usize {
    messages.iter().map(|m| m.text_len()).sum::<usize>().div_ceil(4)
}

pub fn apply(
    processors: &[Box<dyn HistoryProcessor>],
    messages: Vec<ConversationMessage>,
) -> Vec<ConversationMessage> {
    processors
        .iter()
        .fold(messages, |acc, p| p.process(acc))
}

/// Reject a processed history the model could not answer: it must be non-empty, end with a
/// user message, and pair every tool call with exactly one result.
pub fn check_history(messages: &[ConversationMessage]) -> Result<()> {
    let Some(last) = messages.last() else {
        return Err(Error::invalid_input("history is empty after processing"));
    };
    if !last.is_user() {
        return Err(Error::invalid_input(
            "history must end with a user message for the model to respond to",
        ));
    }

    let mut pending = HashSet::new();
    for msg in messages {
        for block in &msg.content {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    pending.insert(id.as_str());
                }
                ContentBlock::ToolResult { tool_use_id, .. } if !pending.remove(tool_use_id.as_str()) => {
                    return Err(Error::invalid_input(format!(
                        "tool result '{tool_use_id}' has no matching tool call in the history window"
                    )));
                }
                _ => {}
            }
        }
    }
    if let Some(id) = pending.into_iter().next() {
        return Err(Error::invalid_input(format!(
            "tool call '{id}' has no result in the history window"
        )));
    }
    Ok(())
}
