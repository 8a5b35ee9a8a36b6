//! Upstream-specific parameter rewrites applied after cache normalization

use serde_json::{json, Value};

use super::types::ChatRequest;

/// Reasoning budget used when a thinking directive omits `budget_tokens`
pub const DEFAULT_REASONING_BUDGET: u64 = 3276;

/// Remove `top_p` from the request, returning the dropped value
pub fn strip_top_p(request: &mut ChatRequest) -> Option<Value> {
    request.top_p.take()
}

/// Convert an Anthropic-style `thinking` directive into OpenRouter `reasoning`
///
/// `{"type": "enabled", "budget_tokens": N}` becomes
/// `{"enabled": true, "max_tokens": N}`. Without a thinking directive the request
/// gets `{"enabled": false, "max_tokens": 3276}` unless the caller already supplied
/// `reasoning` of their own.
pub fn thinking_to_reasoning(request: &mut ChatRequest) {
    match request.thinking.take() {
        Some(thinking) => {
            let enabled = thinking.get("type").and_then(Value::as_str) == Some("enabled");
            let budget = thinking
                .get("budget_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_REASONING_BUDGET);
            request.reasoning = Some(json!({
                "enabled": enabled,
                "max_tokens": budget,
            }));
        }
        None if request.reasoning.is_some() => {}
        None => {
            request.reasoning = Some(json!({
                "enabled": false,
                "max_tokens": DEFAULT_REASONING_BUDGET,
            }));
        }
    }
}
