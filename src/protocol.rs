//! JSON message decoder.
//!
//! Decodes exactly two client command shapes, both top-level JSON objects:
//!
//! ```json
//! {"method":"handshake","user":"<username>","project_id":"<room-id>"}
//! {"method":"set","name":"<var-name>","value":<string or primitive>}
//! ```
//!
//! The top-level object is deserialized into a `HashMap<&str, &RawValue>` so
//! every field's exact source span is available without re-encoding — this is
//! what lets a `set` message's `value` be stored verbatim later. Extra
//! top-level fields are simply never looked up, matching "key lookup walks the
//! first level only; nested objects are never inspected".

use std::collections::HashMap;

use serde_json::value::RawValue;

pub const MAX_ROOM_NAME_LENGTH: usize = 128;
pub const MAX_VARIABLE_NAME_LENGTH: usize = 128;
pub const MAX_VARIABLE_VALUE_LENGTH: usize = 100_000;

/// Why a raw payload could not be decoded into a [`ClientMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON, or not a JSON object at the top level.
    InvalidJson,
    /// `method` missing, not a string, or not one of the known commands.
    UnknownMethod,
    /// Handshake's `user` field missing or not a string.
    HandshakeBadUser,
    /// Handshake's `project_id` field missing or not a string.
    HandshakeBadProjectId,
    /// `set`'s `name` field missing or not a string, or `value` missing or not
    /// a string/primitive.
    SetBadShape,
}

/// A decoded client command.
#[derive(Debug)]
pub enum ClientMessage {
    Handshake { user: String, project_id: String },
    Set { name: String, value: Box<RawValue> },
}

/// Decode a single reassembled message.
pub fn decode(payload: &str) -> Result<ClientMessage, DecodeError> {
    let fields: HashMap<&str, &RawValue> =
        serde_json::from_str(payload).map_err(|_| DecodeError::InvalidJson)?;

    let method = fields
        .get("method")
        .and_then(|raw| as_str(raw))
        .ok_or(DecodeError::UnknownMethod)?;

    match method {
        "handshake" => {
            let user = fields
                .get("user")
                .and_then(|raw| as_str(raw))
                .ok_or(DecodeError::HandshakeBadUser)?
                .to_string();
            let project_id = fields
                .get("project_id")
                .and_then(|raw| as_str(raw))
                .ok_or(DecodeError::HandshakeBadProjectId)?
                .to_string();
            Ok(ClientMessage::Handshake { user, project_id })
        }
        "set" => {
            let name = fields
                .get("name")
                .and_then(|raw| as_str(raw))
                .ok_or(DecodeError::SetBadShape)?
                .to_string();
            let value = fields.get("value").ok_or(DecodeError::SetBadShape)?;
            if !is_scalar(value.get()) {
                return Err(DecodeError::SetBadShape);
            }
            Ok(ClientMessage::Set {
                name,
                value: (*value).to_owned(),
            })
        }
        _ => Err(DecodeError::UnknownMethod),
    }
}

/// Interpret a raw JSON token as a string, or `None` if it isn't one.
fn as_str(raw: &RawValue) -> Option<&str> {
    serde_json::from_str::<&str>(raw.get()).ok()
}

/// A JSON value token is a string or primitive (number, bool, null) — never an
/// object or array. `raw` is the exact source span, already known to be valid
/// JSON, so checking the first non-whitespace byte is sufficient.
fn is_scalar(raw: &str) -> bool {
    !matches!(raw.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}
