//! Contact normalization: makes independently formatted contact values
//! comparable.
//!
//! Email: lower-case and trim, nothing else. Plus-tags and dots are kept
//! because the source systems never canonicalize them either.
//! Phone: digits only, trailing CANONICAL_PHONE_DIGITS retained. Anything
//! shorter is `Invalid` and never coerced.

use crate::types::ContactKind;
use serde::{Deserialize, Serialize};

pub const CANONICAL_PHONE_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "form", content = "value", rename_all = "snake_case")]
pub enum CanonicalContact {
    Email(String),
    Phone(String),
    Invalid,
}

impl CanonicalContact {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Email(v) | Self::Phone(v) => Some(v),
            Self::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// Canonicalize `raw` as a contact of `kind`.
pub fn canonicalize(kind: ContactKind, raw: &str) -> CanonicalContact {
    match kind {
        ContactKind::Email => canonical_email(raw),
        ContactKind::Phone => canonical_phone(raw),
    }
}

pub fn canonical_email(raw: &str) -> CanonicalContact {
    let value = raw.trim().to_lowercase();
    match split_email(&value) {
        Some(_) => CanonicalContact::Email(value),
        None => CanonicalContact::Invalid,
    }
}

pub fn canonical_phone(raw: &str) -> CanonicalContact {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < CANONICAL_PHONE_DIGITS {
        return CanonicalContact::Invalid;
    }
    CanonicalContact::Phone(digits[digits.len() - CANONICAL_PHONE_DIGITS..].to_string())
}

/// Split an address into (local-part, domain). The last `@` wins,
/// both halves must be non-empty.
pub fn split_email(value: &str) -> Option<(&str, &str)> {
    let (local, domain) = value.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some((local, domain))
}

pub fn email_domain(value: &str) -> Option<&str> {
    split_email(value).map(|(_, domain)| domain)
}

/// Count of differing positions. Only defined for equal-length strings.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    if a.chars().count() != b.chars().count() {
        return None;
    }
    Some(a.chars().zip(b.chars()).filter(|(x, y)| x != y).count() as u32)
}

/// `xxx-xxx-1234`-style display phone: two masked groups and four digits.
pub fn is_masked_phone(value: &str, mask_char: char) -> bool {
    let chars: Vec<char> = value.trim().chars().collect();
    if chars.len() != 12 {
        return false;
    }
    let is_mask = |c: char| c.eq_ignore_ascii_case(&mask_char);
    chars.iter().enumerate().all(|(i, &c)| match i {
        3 | 7 => c == '-',
        0..=6 => is_mask(c),
        _ => c.is_ascii_digit(),
    })
}

/// Render a canonical 10-digit phone as `NNN-NNN-NNNN` for reports.
pub fn format_phone(canonical: &str) -> String {
    if canonical.len() == CANONICAL_PHONE_DIGITS && canonical.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &canonical[..3], &canonical[3..6], &canonical[6..])
    } else {
        canonical.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keeps_trailing_ten_digits() {
        assert_eq!(
            canonical_phone("+1 (619) 555-1234"),
            CanonicalContact::Phone("6195551234".into())
        );
    }

    #[test]
    fn email_without_at_sign_is_invalid() {
        assert_eq!(canonical_email("not-an-address"), CanonicalContact::Invalid);
        assert_eq!(canonical_email("  "), CanonicalContact::Invalid);
        assert_eq!(canonical_email("@example.com"), CanonicalContact::Invalid);
    }

    #[test]
    fn masked_phone_shape() {
        assert!(is_masked_phone("xxx-xxx-1234", 'x'));
        assert!(is_masked_phone("XXX-XXX-9876", 'x'));
        assert!(!is_masked_phone("619-555-1234", 'x'));
        assert!(!is_masked_phone("xxx-xxx-123", 'x'));
        assert!(!is_masked_phone("***-***-1234", 'x'));
        assert!(is_masked_phone("***-***-1234", '*'));
    }

    #[test]
    fn format_phone_groups_digits() {
        assert_eq!(format_phone("6195551234"), "619-555-1234");
        assert_eq!(format_phone("12345"), "12345");
    }
}
