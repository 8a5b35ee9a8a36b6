//! Inbound chat request model and the rewrites applied before forwarding
//!
//! Requests arrive as raw JSON, are checked by [`validate`], parsed into
//! [`ChatRequest`], and then rewritten: cache directives are reconciled by
//! [`normalize`] and flavor-specific parameter rewrites from [`params`] run last.

pub mod cache_control;
pub mod params;
pub mod types;
pub mod validate;

pub use cache_control::{count_cache_directives, normalize, CachePolicy};
pub use params::{strip_top_p, thinking_to_reasoning, DEFAULT_REASONING_BUDGET};
pub use types::{CacheDirective, CacheKind, CacheTtl, ChatRequest, Content, ContentBlock, Message};
pub use validate::{check, validate, ValidationError};
