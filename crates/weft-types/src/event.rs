//! Typed events for a streamed assistant turn.
//!
//! The wire decoder produces these; the transcript builder consumes them.
//! Events are serializable so recorded turns can be replayed in tests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events dispatched during a streamed turn.
///
/// Exactly one `Done` or `Error` terminates a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Incremental visible text from the assistant.
    Content { text: String },

    /// The stream has opened; a turn begins on the first event after this.
    StreamStarted,

    /// A new model/tool round-trip within the same turn.
    IterationStart {
        #[serde(default)]
        n: u32,
    },

    /// The model has decided to call a tool; arguments not yet available.
    ToolPending { index: u32, name: String },

    /// A tool invocation has started executing.
    ToolStart {
        id: String,
        name: String,
        #[serde(default)]
        args: Value,
    },

    /// A tool invocation has finished, successfully or not.
    ToolEnd {
        id: String,
        name: String,
        #[serde(default)]
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The client should refetch canonical state.
    Reload,

    /// Back-compat text chunk from the pre-typed protocol.
    LegacyChunk { text: String },

    /// Terminal: the turn completed.
    Done {
        #[serde(default)]
        ephemeral: bool,
    },

    /// Terminal: the turn failed.
    Error { message: String },
}

impl TurnEvent {
    /// Returns true if this event terminates the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done { .. } | TurnEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_names_match_wire_protocol() {
        let event = TurnEvent::ToolPending {
            index: 0,
            name: "search".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_pending""#));

        let event = TurnEvent::Done { ephemeral: true };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""ephemeral":true"#));
    }

    #[test]
    fn test_done_ephemeral_defaults_to_false() {
        let event: TurnEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(event, TurnEvent::Done { ephemeral: false });
    }

    #[test]
    fn test_terminal_events() {
        assert!(TurnEvent::Done { ephemeral: false }.is_terminal());
        assert!(
            TurnEvent::Error {
                message: "boom".to_string()
            }
            .is_terminal()
        );
        assert!(!TurnEvent::Reload.is_terminal());
    }
}
