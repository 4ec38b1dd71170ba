//! The ordered parts sequence accumulated for one in-flight turn.
//!
//! Parts alternate between content runs and tool-invocation records, in
//! the exact order events arrived. Tool calls are never collected at the
//! end of a turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of a turn's parts sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// A run of assistant text, accumulated from content deltas.
    Content { text: String },
    /// A tool invocation at its true position in the stream.
    Tool(ToolInvocation),
}

/// Lifecycle state of a tool invocation. Transitions are monotonic:
/// pending → started → ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    Pending,
    Started,
    Ended,
}

impl ToolState {
    fn rank(self) -> u8 {
        match self {
            ToolState::Pending => 0,
            ToolState::Started => 1,
            ToolState::Ended => 2,
        }
    }

    /// Whether moving to `next` respects the monotonic ordering.
    pub fn can_advance_to(self, next: ToolState) -> bool {
        next.rank() > self.rank()
    }
}

/// A tool invocation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Assigned when the invocation starts; pending records have none yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ToolState,
}

impl ToolInvocation {
    /// Creates a pending record announced before its id is known.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            args: None,
            result: None,
            error: None,
            state: ToolState::Pending,
        }
    }

    /// Creates a started record.
    pub fn started(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            args: Some(args),
            result: None,
            error: None,
            state: ToolState::Started,
        }
    }
}
