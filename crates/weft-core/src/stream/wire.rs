//! Wire-record decoding for the turn event protocol.
//!
//! Each record is one line: a `data: ` prefix followed by a JSON object
//! carrying a `type` discriminator, or — for back-compat — a bare `chunk`
//! string field. Decoding sniffs a `serde_json::Value` first: a top-level
//! `error` field aborts the turn regardless of anything else on the line.

use serde_json::Value;
use weft_types::event::TurnEvent;

use super::StreamError;

/// Prefix marker carried by every wire record.
pub const DATA_PREFIX: &str = "data: ";

/// Legacy in-band reload sentinel (pre-typed protocol). A `chunk`
/// containing it is a pure reload signal, honored identically to a
/// `type: reload` record.
pub const LEGACY_RELOAD_SENTINEL: &str = "[[reload]]";

/// Outcome of decoding one complete line.
#[derive(Debug, Clone, PartialEq)]
pub enum WireRecord {
    /// A decoded turn event.
    Event(TurnEvent),
    /// Top-level `error` field: abort the turn immediately.
    Abort { message: String },
    /// Nothing actionable on this line (blank).
    Empty,
}

/// Decodes one complete line into a wire record.
///
/// # Errors
/// Returns a `Protocol` error describing the malformation; the caller
/// logs it and skips the line — malformed records never abort a turn.
pub fn decode_line(line: &str) -> Result<WireRecord, StreamError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Ok(WireRecord::Empty);
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Err(StreamError::protocol(format!(
            "missing `{}` prefix",
            DATA_PREFIX.trim_end()
        )));
    };

    let value: Value = serde_json::from_str(payload.trim())
        .map_err(|err| StreamError::protocol(format!("invalid JSON payload: {err}")))?;

    if let Some(error) = value.get("error") {
        let message = error
            .as_str()
            .map_or_else(|| error.to_string(), str::to_string);
        return Ok(WireRecord::Abort { message });
    }

    if value.get("type").is_none() {
        if let Some(chunk) = value.get("chunk").and_then(Value::as_str) {
            if chunk.contains(LEGACY_RELOAD_SENTINEL) {
                return Ok(WireRecord::Event(TurnEvent::Reload));
            }
            return Ok(WireRecord::Event(TurnEvent::LegacyChunk {
                text: chunk.to_string(),
            }));
        }
        return Err(StreamError::protocol("record has neither `type` nor `chunk`"));
    }

    let event: TurnEvent = serde_json::from_value(value)
        .map_err(|err| StreamError::protocol(format!("unrecognized or malformed record: {err}")))?;
    Ok(WireRecord::Event(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_content_record() {
        let record = decode_line(r#"data: {"type":"content","text":"Hi"}"#).unwrap();
        assert_eq!(
            record,
            WireRecord::Event(TurnEvent::Content {
                text: "Hi".to_string()
            })
        );
    }

    #[test]
    fn test_decode_tool_lifecycle_records() {
        let record =
            decode_line(r#"data: {"type":"tool_pending","index":0,"name":"search"}"#).unwrap();
        assert_eq!(
            record,
            WireRecord::Event(TurnEvent::ToolPending {
                index: 0,
                name: "search".to_string()
            })
        );

        let record = decode_line(
            r#"data: {"type":"tool_end","id":"t1","name":"search","result":"ok"}"#,
        )
        .unwrap();
        assert_eq!(
            record,
            WireRecord::Event(TurnEvent::ToolEnd {
                id: "t1".to_string(),
                name: "search".to_string(),
                result: "ok".to_string(),
                error: None,
            })
        );
    }

    #[test]
    fn test_top_level_error_field_aborts() {
        let record = decode_line(r#"data: {"error":"backend unavailable"}"#).unwrap();
        assert_eq!(
            record,
            WireRecord::Abort {
                message: "backend unavailable".to_string()
            }
        );

        // The error field wins even when a type is also present.
        let record = decode_line(r#"data: {"type":"content","text":"x","error":"nope"}"#).unwrap();
        assert!(matches!(record, WireRecord::Abort { .. }));
    }

    #[test]
    fn test_legacy_chunk_and_reload_sentinel() {
        let record = decode_line(r#"data: {"chunk":"hello"}"#).unwrap();
        assert_eq!(
            record,
            WireRecord::Event(TurnEvent::LegacyChunk {
                text: "hello".to_string()
            })
        );

        // Both reload spellings decode to the same event.
        let sentinel = decode_line(r#"data: {"chunk":"[[reload]]"}"#).unwrap();
        let typed = decode_line(r#"data: {"type":"reload"}"#).unwrap();
        assert_eq!(sentinel, WireRecord::Event(TurnEvent::Reload));
        assert_eq!(sentinel, typed);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        assert_eq!(decode_line("").unwrap(), WireRecord::Empty);
        assert_eq!(decode_line("   \r").unwrap(), WireRecord::Empty);
        let record = decode_line("data: {\"type\":\"reload\"}\r").unwrap();
        assert_eq!(record, WireRecord::Event(TurnEvent::Reload));
    }

    #[test]
    fn test_malformed_lines_are_protocol_errors() {
        use crate::stream::StreamErrorKind;

        for line in [
            "noise without prefix",
            "data: {not json",
            r#"data: {"neither":"field"}"#,
            r#"data: {"type":"wat"}"#,
        ] {
            let err = decode_line(line).expect_err("line should be rejected");
            assert_eq!(err.kind, StreamErrorKind::Protocol);
        }
    }
}
