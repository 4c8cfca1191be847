//! The message envelope
//!
//! ```json
//! { "data": [ ... ], "actions": [ { "type": "loader", "queue": "webloader_00", ... } ] }
//! ```

use crate::thought::action::Action;
use crate::thought::error::{ActionError, ThoughtError, ThoughtResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shared data plus the actions still to run on it
///
/// `data` travels unchanged from hop to hop. Actions are kept as raw JSON
/// and parsed one by one in [`actions`](Self::actions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    actions: Vec<Value>,
}

impl Thought {
    pub fn new(data: Vec<Value>, actions: &[Action]) -> ThoughtResult<Self> {
        if actions.is_empty() {
            return Err(ThoughtError::NoActions);
        }
        Ok(Self {
            data,
            actions: actions.iter().map(Action::to_value).collect(),
        })
    }

    /// Envelope for forwarding one raw action with the shared data
    pub fn for_forward(data: &[Value], action: Value) -> Self {
        Self {
            data: data.to_vec(),
            actions: vec![action],
        }
    }

    pub fn decode(payload: &[u8]) -> ThoughtResult<Self> {
        let thought: Thought = serde_json::from_slice(payload)?;
        if thought.actions.is_empty() {
            return Err(ThoughtError::NoActions);
        }
        Ok(thought)
    }

    pub fn encode(&self) -> ThoughtResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn raw_actions(&self) -> &[Value] {
        &self.actions
    }

    /// Each action paired with its parse result, in order
    pub fn actions(&self) -> impl Iterator<Item = (&Value, Result<Action, ActionError>)> {
        self.actions.iter().map(|raw| (raw, Action::from_value(raw)))
    }
}
