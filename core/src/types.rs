//! Shared primitive types used across the entire audit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable member identifier (survives username changes).
pub type SubjectId = String;

/// The canonical audit run identifier.
pub type RunId = String;

/// When an event was recorded by the source system.
pub type Timestamp = chrono::NaiveDateTime;

/// The kind of contact value a member declares on their profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Phone,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            _ => None,
        }
    }

    /// Map a digital-banking activity category onto the contact kind it changes.
    pub fn from_change_category(category: &str) -> Option<Self> {
        match category.trim() {
            "Change Primary email" | "Change Alternate email" => Some(Self::Email),
            "Change Phone Number" => Some(Self::Phone),
            _ => None,
        }
    }
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel of a single OTP dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Voice,
    Unknown,
}

impl Channel {
    /// The profile contact kind this channel is compared against.
    /// `None` for `Unknown`; such events are never compared.
    pub fn contact_kind(&self) -> Option<ContactKind> {
        match self {
            Self::Email => Some(ContactKind::Email),
            Self::Sms | Self::Voice => Some(ContactKind::Phone),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Voice => "voice",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
