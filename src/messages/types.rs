//! Core request types
//!
//! Only the fields the proxy rewrites are typed. Everything else a caller sends is
//! kept in `extra` maps and forwarded untouched.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which cache directives are attached to messages and content blocks
pub const CACHE_CONTROL: &str = "cache_control";

/// A chat request as accepted from callers
///
/// Parsing never fails for a body that passed [`check`](super::check): fields the
/// proxy only reads or forwards stay as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: Value,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<Value>,
    /// Anthropic-style extended thinking directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
    /// OpenRouter-style reasoning directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,
    // Pass through any extra fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Whether the caller asked for a streamed response
    pub fn is_streaming(&self) -> bool {
        matches!(self.stream, Some(Value::Bool(true)))
    }

    /// Model name for logging; non-string models are rendered as JSON
    pub fn model_name(&self) -> String {
        match &self.model {
            Value::String(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

/// A chat message with role and content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Value,
    /// `None` when the caller sent `"content": null`
    pub content: Option<Content>,
    /// Message-level cache directive, removed during normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: Content) -> Self {
        Self {
            role: Value::String(role.into()),
            content: Some(content),
            cache_control: None,
            extra: Map::new(),
        }
    }
}

/// Message content - either plain text or a sequence of blocks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
    /// Any other JSON shape; replaced wholesale when a directive must be attached
    Other(Value),
}

/// One element of a block sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ContentBlock {
    /// A record block (`{"type": "text", "text": ...}`, images, tool results, ...)
    Structured(Map<String, Value>),
    /// A bare scalar or array standing in a block position
    Raw(Value),
}

impl ContentBlock {
    /// Build a text block, optionally carrying a cache directive
    pub fn text(text: impl Into<String>, cache_control: Option<&CacheDirective>) -> Self {
        let mut block = Map::new();
        block.insert("type".to_string(), Value::String("text".to_string()));
        block.insert("text".to_string(), Value::String(text.into()));
        if let Some(directive) = cache_control {
            block.insert(CACHE_CONTROL.to_string(), directive.to_value());
        }
        ContentBlock::Structured(block)
    }

    pub fn cache_control(&self) -> Option<&Value> {
        match self {
            ContentBlock::Structured(block) => block.get(CACHE_CONTROL),
            ContentBlock::Raw(_) => None,
        }
    }
}

/// Cache kind; the upstream APIs only define `ephemeral`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Ephemeral,
}

/// Lifetime of an ephemeral cache entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CacheTtl {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
}

impl CacheTtl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTtl::FiveMinutes => "5m",
            CacheTtl::OneHour => "1h",
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        CacheTtl::OneHour
    }
}

impl std::fmt::Display for CacheTtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTtl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(CacheTtl::FiveMinutes),
            "1h" => Ok(CacheTtl::OneHour),
            other => Err(format!("unsupported cache TTL '{}', expected '5m' or '1h'", other)),
        }
    }
}

/// The `cache_control` record attached to the tail of a request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheDirective {
    #[serde(rename = "type")]
    pub kind: CacheKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<CacheTtl>,
}

impl CacheDirective {
    pub fn ephemeral(ttl: Option<CacheTtl>) -> Self {
        Self {
            kind: CacheKind::Ephemeral,
            ttl,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut directive = Map::new();
        directive.insert("type".to_string(), Value::String("ephemeral".to_string()));
        if let Some(ttl) = self.ttl {
            directive.insert("ttl".to_string(), Value::String(ttl.as_str().to_string()));
        }
        Value::Object(directive)
    }
}
