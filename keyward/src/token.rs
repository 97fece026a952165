//! HS256 session tokens signed with rotating secrets.
//!
//! The verification key is chosen by the secret id carried inside the token,
//! so decoding happens in two phases: [`TokenCodec::decode_unverified`]
//! recovers the id from an untrusted token, and
//! [`TokenCodec::decode_verified`] checks signature and time claims against
//! the secret fetched for that id.

use crate::db::UserId;
use crate::errors::{IdentityError, IdentityResult};
use crate::secrets::{Secret, SecretId};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

/// Access token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: UserId,
    /// Role titles at issuance
    pub roles: Vec<String>,
    /// Whether the admin role was held at issuance
    pub admin: bool,
    /// Id of the signing secret
    pub sid: SecretId,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Not valid before (Unix timestamp)
    pub nbf: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Token encoder/decoder
#[derive(Debug, Clone)]
pub struct TokenCodec {
    admin_role: String,
}

impl TokenCodec {
    /// Create a codec that derives the admin flag from `admin_role`
    pub fn new(admin_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
        }
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Sign a token for a user
    ///
    /// # Arguments
    ///
    /// * `user_id` - Subject
    /// * `roles` - Role titles held by the subject
    /// * `secret` - Signing secret; its id is embedded as `sid` and `kid`
    /// * `expires_at` - Expiry instant
    pub fn encode(
        &self,
        user_id: UserId,
        roles: &[String],
        secret: &Secret,
        expires_at: DateTime<Utc>,
    ) -> IdentityResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            roles: roles.to_vec(),
            admin: roles.iter().any(|role| *role == self.admin_role),
            sid: secret.id,
            exp: expires_at.timestamp(),
            nbf: now,
            iat: now,
        };

        self.encode_claims(&claims, secret)
    }

    /// Sign arbitrary claims with `secret`
    pub fn encode_claims(&self, claims: &Claims, secret: &Secret) -> IdentityResult<String> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(secret.id.to_string());

        encode(
            &header,
            claims,
            &EncodingKey::from_secret(secret.key_bytes()),
        )
        .map_err(|e| IdentityError::Encoding(e.to_string()))
    }

    /// Parse claims without checking signature or time claims.
    ///
    /// The result is untrusted and only good for selecting the verification key.
    pub fn decode_unverified(&self, token: &str) -> IdentityResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|_| IdentityError::IncorrectToken)
    }

    /// Verify signature, then expiry and not-before, with zero leeway
    ///
    /// # Errors
    ///
    /// * `IdentityError::IncorrectToken` - Malformed token or signature mismatch
    /// * `IdentityError::InvalidToken` - Correctly signed but expired or not yet valid
    pub fn decode_verified(&self, token: &str, secret: &Secret) -> IdentityResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.key_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                IdentityError::InvalidToken
            }
            _ => IdentityError::IncorrectToken,
        })?;

        if data.claims.sid != secret.id {
            return Err(IdentityError::IncorrectToken);
        }

        Ok(data.claims)
    }
}
