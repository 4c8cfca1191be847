//! Application Error Types

use crate::core::config::ConfigError;
use crate::core::context::ContextError;
use crate::core::error_handling::ContextualError;
use crate::listener::ListenerError;
use crate::queue::BrokerError;
use crate::thought::ThoughtError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No service selected; use --service <SERVICE>")]
    NoService,

    #[error("Invalid message payload: {0}")]
    Payload(#[source] ThoughtError),

    #[error("Cannot install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

impl ContextualError for AppError {
    fn is_user_actionable(&self) -> bool {
        match self {
            AppError::NoService | AppError::Payload(_) => true,
            AppError::Signal(_) => false,
            AppError::Config(e) => e.is_user_actionable(),
            AppError::Context(e) => e.is_user_actionable(),
            AppError::Broker(e) => e.is_user_actionable(),
            AppError::Listener(e) => e.is_user_actionable(),
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            AppError::NoService | AppError::Payload(_) => Some(self.to_string()),
            AppError::Signal(_) => None,
            AppError::Config(e) => e.user_message(),
            AppError::Context(e) => e.user_message(),
            AppError::Broker(e) => e.user_message(),
            AppError::Listener(e) => e.user_message(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
