//! Event normalizer: turns a raw OTP delivery payload into a `DeliveryEvent`.
//!
//! Payloads are short JSON arrays whose layout depends on position 0:
//!
//!   modern:  [tag, masked_display, fallback, full_contact, status]
//!            tag ∈ { "text", "email", "call", "voice" }
//!   legacy:  [email_or_null, "xxx-xxx-1234", status]
//!
//! Each tag has its own decoder. Legacy rows, and phone rows with no full
//! number logged, only carry the masked phone, so they decode to
//! `Channel::Unknown` and are never compared. A full number that is present
//! but unusable is a `MissingDestination` failure.

use crate::{
    config::PhonePolicy,
    contact::{canonical_email, canonical_phone, is_masked_phone},
    snapshot::RawDelivery,
    types::{Channel, SubjectId, Timestamp},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One OTP dispatch attempt, decoded. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub event_id: i64,
    pub subject_id: Option<SubjectId>,
    pub username: Option<String>,
    pub timestamp: Timestamp,
    pub channel: Channel,
    /// Where the passcode actually went. `None` when only a masked copy exists.
    pub destination: Option<String>,
    /// The masked copy shown at position 1, kept for the investigator.
    pub masked_display: Option<String>,
    pub ip_address: Option<String>,
    pub raw_payload: String,
}

/// Why a payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum ParseFailure {
    Malformed { reason: String },
    UnrecognizedChannel { tag: String },
    MissingDestination { channel: Channel },
}

impl ParseFailure {
    /// Stable key used in the parse-failure tally.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::UnrecognizedChannel { .. } => "unrecognized_channel",
            Self::MissingDestination { .. } => "missing_destination",
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed payload: {reason}"),
            Self::UnrecognizedChannel { tag } => write!(f, "unrecognized channel tag '{tag}'"),
            Self::MissingDestination { channel } => {
                write!(f, "no usable destination for {channel} payload")
            }
        }
    }
}

/// Channel tag at position 0 of a modern payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadTag {
    Text,
    Email,
    Call,
    Voice,
}

impl PayloadTag {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "email" => Some(Self::Email),
            "call" => Some(Self::Call),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }

    fn channel(&self) -> Channel {
        match self {
            Self::Text => Channel::Sms,
            Self::Email => Channel::Email,
            Self::Call | Self::Voice => Channel::Voice,
        }
    }
}

const DISPLAY_POS: usize = 1;
const FULL_CONTACT_POS: usize = 3;

/// Decoded destination fields, before the row metadata is attached.
struct Decoded {
    channel: Channel,
    destination: Option<String>,
    masked_display: Option<String>,
}

/// Decode one delivery row. Pure; never panics on bad input.
pub fn normalize(raw: &RawDelivery, policy: &PhonePolicy) -> Result<DeliveryEvent, ParseFailure> {
    let fields = decode_fields(&raw.payload)?;
    let decoded = match field_str(&fields, 0).as_deref().and_then(PayloadTag::parse) {
        Some(tag) => decode_tagged(tag, &fields)?,
        None => decode_legacy(&fields, policy)?,
    };
    Ok(DeliveryEvent {
        event_id: raw.event_id,
        subject_id: raw.subject_id.clone(),
        username: raw.username.clone(),
        timestamp: raw.timestamp,
        channel: decoded.channel,
        destination: decoded.destination,
        masked_display: decoded.masked_display,
        ip_address: raw.ip_address.clone(),
        raw_payload: raw.payload.clone(),
    })
}

fn decode_tagged(tag: PayloadTag, fields: &[Value]) -> Result<Decoded, ParseFailure> {
    match tag {
        PayloadTag::Email => {
            let destination = field_str(fields, DISPLAY_POS)
                .filter(|d| canonical_email(d).is_valid())
                .ok_or(ParseFailure::MissingDestination { channel: Channel::Email })?;
            Ok(Decoded {
                channel: Channel::Email,
                destination: Some(destination),
                masked_display: None,
            })
        }
        PayloadTag::Text | PayloadTag::Call | PayloadTag::Voice => {
            let masked_display = field_str(fields, DISPLAY_POS);
            if is_absent(fields, FULL_CONTACT_POS) {
                // Only the masked copy was logged; nothing to compare.
                return Ok(Decoded {
                    channel: Channel::Unknown,
                    destination: None,
                    masked_display,
                });
            }
            let destination = field_str(fields, FULL_CONTACT_POS)
                .filter(|p| canonical_phone(p).is_valid())
                .ok_or(ParseFailure::MissingDestination { channel: tag.channel() })?;
            Ok(Decoded {
                channel: tag.channel(),
                destination: Some(destination),
                masked_display,
            })
        }
    }
}

fn decode_legacy(fields: &[Value], policy: &PhonePolicy) -> Result<Decoded, ParseFailure> {
    let head = field_str(fields, 0);
    let head_is_email_or_null = match &head {
        Some(s) => s.contains('@'),
        None => fields.first().map_or(false, Value::is_null),
    };
    let masked = field_str(fields, DISPLAY_POS).filter(|m| is_masked_phone(m, policy.mask_char));

    match (head_is_email_or_null, masked) {
        (true, Some(masked)) => Ok(Decoded {
            channel: Channel::Unknown,
            destination: None,
            masked_display: Some(masked),
        }),
        _ => Err(ParseFailure::UnrecognizedChannel {
            tag: head.unwrap_or_else(|| "null".into()),
        }),
    }
}

/// Parse the payload into its positional fields. Double-encoded payloads
/// (a JSON string holding the array) and backslash-escaped quotes are accepted.
fn decode_fields(payload: &str) -> Result<Vec<Value>, ParseFailure> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Malformed { reason: "empty payload".into() });
    }
    let mut value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(first_err) => serde_json::from_str(&trimmed.replace("\\\"", "\""))
            .map_err(|_| ParseFailure::Malformed { reason: first_err.to_string() })?,
    };
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner.trim())
            .map_err(|e| ParseFailure::Malformed { reason: e.to_string() })?;
    }
    match value {
        Value::Array(items) if items.is_empty() => {
            Err(ParseFailure::Malformed { reason: "empty array".into() })
        }
        Value::Array(items) => Ok(items),
        other => Err(ParseFailure::Malformed {
            reason: format!("expected array, got {}", json_type(&other)),
        }),
    }
}

/// String field at `pos` with quoting artifacts stripped. Non-strings and
/// blank strings are `None`.
fn field_str(fields: &[Value], pos: usize) -> Option<String> {
    let s = fields.get(pos)?.as_str()?;
    let cleaned = s
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '\\')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Field missing, null, or a blank string.
fn is_absent(fields: &[Value], pos: usize) -> bool {
    match fields.get(pos) {
        None | Some(Value::Null) => true,
        Some(Value::String(_)) => field_str(fields, pos).is_none(),
        Some(_) => false,
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
