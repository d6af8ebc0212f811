//! Wire payload codec for the session protocol.

use ocast_core::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Destination of events addressed to every connected controller.
pub const DST_BROADCAST: &str = "*";
/// Reserved source id for device settings events.
pub const SRC_SETTINGS: &str = "settings";

/// Frame kind carried in the `type` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Command,
    Reply,
    Event,
}

/// Status embedded in `reply` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    JsonFormatError,
    ValueFormatError,
    MissingMandatoryField,
    InternalError,
    Unknown,
}

impl ReplyStatus {
    /// Decode a wire status string, case-insensitively. Anything
    /// unrecognized maps to [`ReplyStatus::Unknown`].
    pub fn from_wire(text: &str) -> Self {
        let text = text.to_ascii_lowercase();
        match text.as_str() {
            "ok" => ReplyStatus::Ok,
            "json_format_error" => ReplyStatus::JsonFormatError,
            "value_format_error" => ReplyStatus::ValueFormatError,
            "missing_mandatory_field" => ReplyStatus::MissingMandatoryField,
            "internal_error" => ReplyStatus::InternalError,
            _ => ReplyStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Ok => "ok",
            ReplyStatus::JsonFormatError => "json_format_error",
            ReplyStatus::ValueFormatError => "value_format_error",
            ReplyStatus::MissingMandatoryField => "missing_mandatory_field",
            ReplyStatus::InternalError => "internal_error",
            ReplyStatus::Unknown => "unknown",
        }
    }

    pub fn is_ok(self) -> bool {
        self == ReplyStatus::Ok
    }
}

/// One frame exchanged over a session link.
///
/// `id` correlates a command with its reply; `status` only appears on
/// replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub dst: String,
    pub src: String,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub message: Value,
}

impl Payload {
    /// Build a command frame addressed to `dst`.
    pub fn command(dst: impl Into<String>, src: impl Into<String>, id: u32, message: Value) -> Self {
        Payload {
            dst: dst.into(),
            src: src.into(),
            kind: PayloadKind::Command,
            id,
            status: None,
            message,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The decoded reply status; replies without one read as `Unknown`.
    pub fn reply_status(&self) -> ReplyStatus {
        self.status
            .as_deref()
            .map(ReplyStatus::from_wire)
            .unwrap_or(ReplyStatus::Unknown)
    }
}
