//! Listener Error Types

use crate::core::error_handling::ContextualError;
use crate::services::Service;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Service {0} has no source queues and cannot host a listener")]
    NoSourceQueues(Service),

    #[error("No processor registered for service {0}")]
    NoProcessor(Service),

    #[error("Cannot spawn listener thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ContextualError for ListenerError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ListenerError::Spawn { .. })
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type ListenerResult<T> = Result<T, ListenerError>;
