//! Contact handling: email/phone normalization and confirmation codes.

pub mod codes;
pub mod normalize;

pub use codes::{CODE_LENGTH, ConfirmationCodes, Subject};
pub use normalize::{NormalizedPhone, normalize_email, normalize_phone};
