use serde::{Deserialize, Serialize};
use std::fmt;

/// Locator of the data a file node stands for.
/// The tree store never looks inside, it only stores and returns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalFileName(String);

impl LogicalFileName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LogicalFileName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LogicalFileName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<LogicalFileName> for String {
    fn from(value: LogicalFileName) -> Self {
        value.0
    }
}

impl fmt::Display for LogicalFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
