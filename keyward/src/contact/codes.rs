//! One-time confirmation codes held in the shared cache.

use crate::cache::DistributedCache;
use crate::context::CallContext;
use crate::errors::{IdentityError, IdentityResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use subtle::ConstantTimeEq;

/// Length of issued confirmation codes
pub const CODE_LENGTH: usize = 6;

/// Wrong guesses after which a pending code is discarded
pub const DEFAULT_MAX_ATTEMPTS: u64 = 5;

/// The contact a confirmation code proves control of (already normalized).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Subject {
    Email(String),
    Phone(String),
}

impl Subject {
    pub fn cache_key(&self) -> String {
        match self {
            Subject::Email(email) => format!("code:email:{email}"),
            Subject::Phone(phone) => format!("code:phone:{phone}"),
        }
    }

    fn attempts_key(&self) -> String {
        format!("{}:attempts", self.cache_key())
    }

    pub fn value(&self) -> &str {
        match self {
            Subject::Email(value) | Subject::Phone(value) => value,
        }
    }

    fn not_found(&self) -> IdentityError {
        match self {
            Subject::Email(_) => IdentityError::EmailConfirmationCodeNotFound,
            Subject::Phone(_) => IdentityError::PhoneConfirmationCodeNotFound,
        }
    }

    fn mismatch(&self) -> IdentityError {
        match self {
            Subject::Email(_) => IdentityError::IncorrectEmailCode,
            Subject::Phone(_) => IdentityError::IncorrectPhoneCode,
        }
    }
}

/// Issues and checks confirmation codes; one active code per subject.
#[derive(Clone)]
pub struct ConfirmationCodes {
    cache: Arc<dyn DistributedCache>,
    ttl: Duration,
    max_attempts: u64,
}

impl ConfirmationCodes {
    pub fn new(cache: Arc<dyn DistributedCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Issue a fresh code, replacing any pending one and resetting its
    /// attempt budget
    pub async fn issue(&self, ctx: &CallContext, subject: &Subject) -> IdentityResult<String> {
        let code = generate_code();
        ctx.run(self.cache.delete(&subject.attempts_key())).await?;
        ctx.run(self.cache.set(&subject.cache_key(), &code, self.ttl))
            .await?;
        Ok(code)
    }

    /// Currently pending code, if any
    pub async fn pending(
        &self,
        ctx: &CallContext,
        subject: &Subject,
    ) -> IdentityResult<Option<String>> {
        ctx.run(self.cache.get(&subject.cache_key())).await
    }

    /// Compare a presented code with the pending one. A matching code stays
    /// valid until it expires; after `max_attempts` mismatches it is
    /// discarded.
    ///
    /// # Errors
    ///
    /// * `*ConfirmationCodeNotFound` - No code pending for the subject
    /// * `Incorrect*Code` - The presented code does not match
    pub async fn verify(
        &self,
        ctx: &CallContext,
        subject: &Subject,
        presented: &str,
    ) -> IdentityResult<()> {
        let pending = self
            .pending(ctx, subject)
            .await?
            .ok_or_else(|| subject.not_found())?;

        if bool::from(pending.as_bytes().ct_eq(presented.as_bytes())) {
            return Ok(());
        }

        let attempts = ctx
            .run(self.cache.incr(&subject.attempts_key(), self.ttl))
            .await?;
        if attempts >= self.max_attempts {
            log::warn!(
                "Discarded confirmation code for {} after {} attempts",
                subject.value(),
                attempts
            );
            ctx.run(self.cache.delete(&subject.cache_key())).await?;
            ctx.run(self.cache.delete(&subject.attempts_key())).await?;
        }
        Err(subject.mismatch())
    }
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
