//! Sighting input model and normalization.
//!
//! # Responsibility
//! - Represent one validated `(email, phone)` observation to reconcile.
//! - Re-check and normalize what the transport layer promises: lowercased
//!   email, `+`-prefixed digit-only phone, at least one field present.
//!
//! # Invariants
//! - A constructed sighting always carries at least one field.
//! - Stored values are already normalized; comparisons elsewhere are exact
//!   string equality.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

const EMAIL_MAX_CHARS: usize = 255;
const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// Validation errors for sighting input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SightingError {
    /// Neither email nor phone was supplied.
    MissingContactField,
    /// Email does not match the accepted address shape.
    InvalidEmail(String),
    /// Email exceeds the persisted length cap.
    EmailTooLong { length: usize, max: usize },
    /// Phone has too few digits after normalization.
    PhoneTooShort { digits: usize, min: usize },
    /// Phone has too many digits after normalization.
    PhoneTooLong { digits: usize, max: usize },
}

impl Display for SightingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactField => {
                write!(f, "at least one of email or phone must be provided")
            }
            Self::InvalidEmail(value) => write!(f, "invalid email format: `{value}`"),
            Self::EmailTooLong { length, max } => {
                write!(f, "email too long: {length} chars exceeds max {max}")
            }
            Self::PhoneTooShort { digits, min } => {
                write!(f, "phone too short: {digits} digits, minimum {min}")
            }
            Self::PhoneTooLong { digits, max } => {
                write!(f, "phone too long: {digits} digits, maximum {max}")
            }
        }
    }
}

impl Error for SightingError {}

/// One validated `(email, phone)` observation to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    email: Option<String>,
    phone: Option<String>,
}

impl Sighting {
    /// Validates and normalizes raw transport input into a sighting.
    ///
    /// # Errors
    /// - `MissingContactField` when both fields are absent.
    /// - Email/phone shape errors for malformed values.
    pub fn new(email: Option<&str>, phone: Option<&str>) -> Result<Self, SightingError> {
        let email = email.map(normalize_email).transpose()?;
        let phone = phone.map(normalize_phone).transpose()?;

        if email.is_none() && phone.is_none() {
            return Err(SightingError::MissingContactField);
        }

        Ok(Self { email, phone })
    }

    /// Normalized email, when the sighting carries one.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Normalized phone, when the sighting carries one.
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

fn normalize_email(raw: &str) -> Result<String, SightingError> {
    let normalized = raw.trim().to_lowercase();

    if !EMAIL_RE.is_match(&normalized) {
        return Err(SightingError::InvalidEmail(normalized));
    }
    if normalized.chars().count() > EMAIL_MAX_CHARS {
        return Err(SightingError::EmailTooLong {
            length: normalized.chars().count(),
            max: EMAIL_MAX_CHARS,
        });
    }

    Ok(normalized)
}

fn normalize_phone(raw: &str) -> Result<String, SightingError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.len() < PHONE_MIN_DIGITS {
        return Err(SightingError::PhoneTooShort {
            digits: digits.len(),
            min: PHONE_MIN_DIGITS,
        });
    }
    if digits.len() > PHONE_MAX_DIGITS {
        return Err(SightingError::PhoneTooLong {
            digits: digits.len(),
            max: PHONE_MAX_DIGITS,
        });
    }

    Ok(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::{Sighting, SightingError};

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let sighting = Sighting::new(Some("  Customer@Example.COM "), None).unwrap();
        assert_eq!(sighting.email(), Some("customer@example.com"));
        assert_eq!(sighting.phone(), None);
    }

    #[test]
    fn phone_is_reduced_to_prefixed_digits() {
        let sighting = Sighting::new(None, Some("+91-987-654-3210")).unwrap();
        assert_eq!(sighting.phone(), Some("+919876543210"));

        let bare = Sighting::new(None, Some("1234567890")).unwrap();
        assert_eq!(bare.phone(), Some("+1234567890"));
    }

    #[test]
    fn empty_sighting_is_rejected() {
        assert_eq!(
            Sighting::new(None, None),
            Err(SightingError::MissingContactField)
        );
    }

    #[test]
    fn malformed_email_is_rejected() {
        assert!(matches!(
            Sighting::new(Some("invalid-email"), None),
            Err(SightingError::InvalidEmail(_))
        ));
    }

    #[test]
    fn phone_length_bounds_are_enforced() {
        assert_eq!(
            Sighting::new(None, Some("123")),
            Err(SightingError::PhoneTooShort { digits: 3, min: 7 })
        );
        assert_eq!(
            Sighting::new(None, Some("12345678901234567890")),
            Err(SightingError::PhoneTooLong {
                digits: 20,
                max: 15
            })
        );
    }
}
