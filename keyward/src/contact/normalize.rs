//! Email and phone normalization.
//!
//! Values are normalized before they reach storage or cache keys, so the
//! uniqueness constraints and confirmation-code lookups compare like with like.

use crate::errors::{IdentityError, IdentityResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$").ok()
});

/// Two-digit ITU country calling codes. One-digit codes are 1 and 7; every
/// other valid prefix not listed here is three digits long.
const TWO_DIGIT_COUNTRY_CODES: &[u16] = &[
    20, 27, 30, 31, 32, 33, 34, 36, 39, 40, 41, 43, 44, 45, 46, 47, 48, 49, 51, 52, 53, 54, 55,
    56, 57, 58, 60, 61, 62, 63, 64, 65, 66, 81, 82, 84, 86, 90, 91, 92, 93, 94, 95, 98,
];

const MAX_EMAIL_LEN: usize = 254;
const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

/// Normalize an email address: trimmed, lowercased, syntactically valid.
///
/// # Errors
///
/// * `IdentityError::IncorrectEmail` - The value is not an email address
pub fn normalize_email(raw: &str) -> IdentityResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.contains("..") {
        return Err(IdentityError::IncorrectEmail);
    }

    let pattern = EMAIL_PATTERN
        .as_ref()
        .ok_or_else(|| IdentityError::Store("email pattern failed to compile".to_string()))?;
    if pattern.is_match(&email) {
        Ok(email)
    } else {
        Err(IdentityError::IncorrectEmail)
    }
}

/// Phone number in E.164 form, split into country code and full value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPhone {
    /// `+` followed by country code and subscriber number
    pub e164: String,
    pub country_code: u16,
}

/// Normalize a phone number to E.164.
///
/// Accepts a leading `+` or `00` international prefix and ignores spaces,
/// dashes, dots and parentheses.
///
/// # Errors
///
/// * `IdentityError::IncorrectPhone` - The value is not an international number
pub fn normalize_phone(raw: &str) -> IdentityResult<NormalizedPhone> {
    let trimmed = raw.trim();
    let rest = if let Some(rest) = trimmed.strip_prefix('+') {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("00") {
        rest
    } else {
        return Err(IdentityError::IncorrectPhone);
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(IdentityError::IncorrectPhone),
        }
    }

    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS || digits.starts_with('0')
    {
        return Err(IdentityError::IncorrectPhone);
    }

    let country_code = country_code_of(&digits).ok_or(IdentityError::IncorrectPhone)?;
    Ok(NormalizedPhone {
        e164: format!("+{digits}"),
        country_code,
    })
}

fn country_code_of(digits: &str) -> Option<u16> {
    let prefix_len = if digits.starts_with('1') || digits.starts_with('7') {
        1
    } else {
        let two: u16 = digits.get(..2)?.parse().ok()?;
        if TWO_DIGIT_COUNTRY_CODES.contains(&two) { 2 } else { 3 }
    };
    digits.get(..prefix_len)?.parse().ok()
}
