//! Message model: Thoughts and Actions
//!
//! A [`Thought`] is the unit that travels through the queues: shared `data`
//! and an ordered list of [`Action`]s, each naming the service and queue it
//! belongs to. A service runs the actions addressed to it and forwards the
//! rest, together with the follow-ups of every action it completed.

mod action;
mod envelope;
mod error;

pub use action::Action;
pub use envelope::Thought;
pub use error::{ActionError, ThoughtError, ThoughtResult};
