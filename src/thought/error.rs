//! Message model errors

use crate::services::InvalidQueueName;

/// A message payload that is not a usable Thought
#[derive(Debug, thiserror::Error)]
pub enum ThoughtError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message carries no actions")]
    NoActions,
}

/// A single action that cannot be dispatched
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action is not a JSON object")]
    NotAnObject,

    #[error("Action has no type")]
    MissingType,

    #[error("Action type '{0}' is not a known service")]
    UnknownType(String),

    #[error("Action has no queue")]
    MissingQueue,

    #[error(transparent)]
    InvalidQueue(#[from] InvalidQueueName),

    #[error("Action field 'actions' is not a list")]
    InvalidNestedActions,
}

pub type ThoughtResult<T> = Result<T, ThoughtError>;
