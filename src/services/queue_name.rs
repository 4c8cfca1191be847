//! Validated queue names

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,128}$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid queue name '{name}': expected 1-128 characters from [A-Za-z0-9_.-]")]
pub struct InvalidQueueName {
    pub name: String,
}

/// Name of a queue within one service
///
/// The name doubles as a database file name in the embedded backend, hence
/// the restricted alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidQueueName> {
        let name = name.into();
        if pattern().is_match(&name) {
            Ok(Self(name))
        } else {
            Err(InvalidQueueName { name })
        }
    }

    /// For the compile-time registry; panics on an invalid literal
    pub(crate) fn from_static(name: &'static str) -> Self {
        match Self::new(name) {
            Ok(queue) => queue,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueueName {
    type Error = InvalidQueueName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for QueueName {
    type Err = InvalidQueueName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}
