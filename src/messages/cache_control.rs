//! Prompt-cache directive reconciliation
//!
//! Callers annotate caching inconsistently: directives on messages, on arbitrary
//! content blocks, several at once, or none at all. [`normalize`] rewrites a message
//! list so that exactly one directive exists, on the last content block of the last
//! message, in the shape the upstream expects.

use serde_json::Value;

use super::types::{CacheDirective, CacheTtl, Content, ContentBlock, Message, CACHE_CONTROL};

/// Which directive shape the upstream expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// `{"type": "ephemeral", "ttl": ...}` (Anthropic)
    Ttl(CacheTtl),
    /// `{"type": "ephemeral"}` (OpenRouter)
    Bare,
}

impl CachePolicy {
    pub fn directive(&self) -> CacheDirective {
        match self {
            CachePolicy::Ttl(ttl) => CacheDirective::ephemeral(Some(*ttl)),
            CachePolicy::Bare => CacheDirective::ephemeral(None),
        }
    }

    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            CachePolicy::Ttl(ttl) => format!("ephemeral ttl={}", ttl),
            CachePolicy::Bare => "ephemeral".to_string(),
        }
    }
}

/// Produce a copy of `messages` carrying a single cache directive at the tail
///
/// The input is never mutated. An empty list is returned as an empty list.
pub fn normalize(messages: &[Message], policy: &CachePolicy) -> Vec<Message> {
    let mut normalized: Vec<Message> = messages.iter().map(stripped).collect();

    if let Some(last) = normalized.last_mut() {
        attach(last, &policy.directive());
    }

    normalized
}

/// Count every cache directive in a message list, nested tool-result blocks included
pub fn count_cache_directives(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|message| {
            let own = usize::from(message.cache_control.is_some());
            let blocks = match &message.content {
                Some(Content::Blocks(blocks)) => blocks.iter().map(count_in_block).sum(),
                _ => 0,
            };
            own + blocks
        })
        .sum()
}

fn count_in_block(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Structured(fields) => {
            let own = usize::from(fields.contains_key(CACHE_CONTROL));
            let nested = match fields.get("content") {
                Some(Value::Array(inner)) => inner.iter().map(count_in_value).sum(),
                _ => 0,
            };
            own + nested
        }
        ContentBlock::Raw(_) => 0,
    }
}

fn count_in_value(value: &Value) -> usize {
    match value {
        Value::Object(fields) => {
            let own = usize::from(fields.contains_key(CACHE_CONTROL));
            let nested = match fields.get("content") {
                Some(Value::Array(inner)) => inner.iter().map(count_in_value).sum(),
                _ => 0,
            };
            own + nested
        }
        _ => 0,
    }
}

/// Deep copy of a message with every directive removed; string content is left as is
fn stripped(message: &Message) -> Message {
    let mut message = message.clone();
    message.cache_control = None;

    if let Some(Content::Blocks(blocks)) = &mut message.content {
        for block in blocks.iter_mut() {
            if let ContentBlock::Structured(fields) = block {
                fields.remove(CACHE_CONTROL);
                if let Some(Value::Array(inner)) = fields.get_mut("content") {
                    inner.iter_mut().for_each(strip_value);
                }
            }
        }
    }

    message
}

/// Tool-result blocks may nest their own block lists
fn strip_value(value: &mut Value) {
    if let Value::Object(fields) = value {
        fields.remove(CACHE_CONTROL);
        if let Some(Value::Array(inner)) = fields.get_mut("content") {
            inner.iter_mut().for_each(strip_value);
        }
    }
}

fn attach(message: &mut Message, directive: &CacheDirective) {
    let content = match message.content.take() {
        Some(Content::Blocks(mut blocks)) => {
            match blocks.last_mut() {
                Some(ContentBlock::Structured(fields)) => {
                    fields.insert(CACHE_CONTROL.to_string(), directive.to_value());
                }
                Some(ContentBlock::Raw(value)) => {
                    let text = block_text(value);
                    blocks.push(ContentBlock::text(text, Some(directive)));
                }
                None => blocks.push(ContentBlock::text("", Some(directive))),
            }
            Content::Blocks(blocks)
        }
        Some(Content::Text(text)) => Content::Blocks(vec![ContentBlock::text(text, Some(directive))]),
        Some(Content::Other(_)) | None => {
            Content::Blocks(vec![ContentBlock::text("", Some(directive))])
        }
    };

    message.content = Some(content);
}

/// Text for the block synthesized after a non-record tail block
///
/// Empty or falsy values yield an empty string.
fn block_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null | Value::Bool(false) => String::new(),
        Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
        Value::Array(items) if items.is_empty() => String::new(),
        other => other.to_string(),
    }
}
