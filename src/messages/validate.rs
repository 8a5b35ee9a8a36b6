//! Structural checks run on raw request bodies before anything is forwarded

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    NotAnObject,
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Field 'messages' must be a non-empty list")]
    EmptyMessages,
    #[error("Message at index {0} must be an object")]
    MessageNotObject(usize),
    #[error("Message at index {index} is missing required field '{field}'")]
    MessageMissingField { index: usize, field: &'static str },
}

/// Check request shape: `model` and a non-empty `messages` list whose entries each
/// carry `role` and `content`
///
/// Only key presence is checked; `"content": null` is accepted.
pub fn check(body: &Value) -> Result<(), ValidationError> {
    let fields = body.as_object().ok_or(ValidationError::NotAnObject)?;

    if !fields.contains_key("model") {
        return Err(ValidationError::MissingField("model"));
    }

    let messages = fields
        .get("messages")
        .ok_or(ValidationError::MissingField("messages"))?;
    let messages = match messages.as_array() {
        Some(list) if !list.is_empty() => list,
        _ => return Err(ValidationError::EmptyMessages),
    };

    for (index, message) in messages.iter().enumerate() {
        let message = message
            .as_object()
            .ok_or(ValidationError::MessageNotObject(index))?;
        for field in ["role", "content"] {
            if !message.contains_key(field) {
                return Err(ValidationError::MessageMissingField { index, field });
            }
        }
    }

    Ok(())
}

/// Boolean form of [`check`]
pub fn validate(body: &Value) -> bool {
    check(body).is_ok()
}
