//! Startup error reporting
//!
//! Errors that stop a service instance from booting fall in two groups:
//! operator mistakes (bad config value, unknown service name) whose message
//! should be shown as-is, and system failures (storage path not writable,
//! relay unreachable) where the operation context is more useful than the
//! raw error, which is kept at debug level.

/// Errors that can tell operator mistakes from system failures
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    fn is_user_actionable(&self) -> bool;

    fn user_message(&self) -> Option<String>;
}

/// Log a fatal error with the detail level its kind deserves
///
/// # Examples
/// ```rust,no_run
/// # use crawlgrid::core::error_handling::log_error_with_context;
/// # use crawlgrid::core::config::ConfigError;
/// let error = ConfigError::InvalidValue {
///     key: "grid.broker.threads".to_string(),
///     value: "many".to_string(),
///     expected: "an unsigned integer".to_string(),
/// };
/// log_error_with_context(&error, "Loading configuration");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::error!("FATAL: {}", user_msg);
        }
        _ => {
            log::error!("FATAL: {}", operation_context);
        }
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
