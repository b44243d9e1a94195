use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the object a task runs against: its type identifier plus the
/// key of the concrete instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub target_type: String,
    pub target_key: String,
}

impl TargetRef {
    pub fn new(target_type: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            target_key: target_key.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.target_type, self.target_key)
    }
}
