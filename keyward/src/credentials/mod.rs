//! Credential backends and the scheme registry.
//!
//! An `Authorization` value is `"<Scheme> <token>"`. The scheme selects a
//! [`CredentialBackend`] variant, which resolves the presented token to an
//! [`Identity`].

pub mod basic;
pub mod bearer;

pub use basic::BasicBackend;
pub use bearer::BearerBackend;

use crate::context::CallContext;
use crate::db::UserId;
use crate::errors::{IdentityError, IdentityResult};
use crate::projection::Repaired;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported authorization schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Basic,
    Bearer,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Basic => "Basic",
            Scheme::Bearer => "Bearer",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("basic") {
            Ok(Scheme::Basic)
        } else if s.eq_ignore_ascii_case("bearer") {
            Ok(Scheme::Bearer)
        } else {
            Err(IdentityError::UnsupportedScheme(s.to_string()))
        }
    }
}

/// Authenticated subject with its authorization context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub admin: bool,
    pub roles: Vec<String>,
}

/// Credential backend, one variant per scheme
pub enum CredentialBackend {
    Basic(BasicBackend),
    Bearer(BearerBackend),
}

impl CredentialBackend {
    pub fn scheme(&self) -> Scheme {
        match self {
            CredentialBackend::Basic(_) => Scheme::Basic,
            CredentialBackend::Bearer(_) => Scheme::Bearer,
        }
    }

    /// Resolve the presented credential (without the scheme prefix)
    ///
    /// Bearer tokens carry their own roles, so only Basic can repair a view.
    pub async fn resolve_user(
        &self,
        ctx: &CallContext,
        presented: &str,
    ) -> IdentityResult<Repaired<Identity>> {
        match self {
            CredentialBackend::Basic(backend) => backend.resolve_user(ctx, presented).await,
            CredentialBackend::Bearer(backend) => backend
                .resolve_user(ctx, presented)
                .await
                .map(Repaired::clean),
        }
    }
}

/// Scheme → backend lookup table
pub struct Authenticator {
    backends: HashMap<Scheme, CredentialBackend>,
}

impl Authenticator {
    pub fn new(backends: impl IntoIterator<Item = CredentialBackend>) -> Self {
        Self {
            backends: backends
                .into_iter()
                .map(|backend| (backend.scheme(), backend))
                .collect(),
        }
    }

    /// Authenticate an `Authorization` header value
    ///
    /// # Errors
    ///
    /// * `IdentityError::CredentialsNotProvided` - Empty value or missing token
    /// * `IdentityError::UnsupportedScheme` - Unknown or unregistered scheme
    /// * Any error of the selected backend
    pub async fn authenticate(
        &self,
        ctx: &CallContext,
        authorization: &str,
    ) -> IdentityResult<Repaired<Identity>> {
        let (scheme, presented) = split_authorization(authorization)?;
        let backend = self
            .backends
            .get(&scheme)
            .ok_or_else(|| IdentityError::UnsupportedScheme(scheme.to_string()))?;

        backend.resolve_user(ctx, presented).await
    }
}

/// Split `"<Scheme> <token>"`, validating the scheme name
pub fn split_authorization(authorization: &str) -> IdentityResult<(Scheme, &str)> {
    let authorization = authorization.trim();
    if authorization.is_empty() {
        return Err(IdentityError::CredentialsNotProvided);
    }

    let (scheme, presented) = authorization
        .split_once(char::is_whitespace)
        .unwrap_or((authorization, ""));
    let scheme: Scheme = scheme.parse()?;

    let presented = presented.trim();
    if presented.is_empty() {
        return Err(IdentityError::CredentialsNotProvided);
    }
    Ok((scheme, presented))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parsing_is_case_insensitive() {
        assert_eq!("basic".parse::<Scheme>().unwrap(), Scheme::Basic);
        assert_eq!("BEARER".parse::<Scheme>().unwrap(), Scheme::Bearer);
        assert!(matches!(
            "Digest".parse::<Scheme>().unwrap_err(),
            IdentityError::UnsupportedScheme(name) if name == "Digest"
        ));
    }

    #[test]
    fn test_split_authorization() {
        let (scheme, token) = split_authorization("Bearer abc.def.ghi").unwrap();
        assert_eq!(scheme, Scheme::Bearer);
        assert_eq!(token, "abc.def.ghi");

        assert!(matches!(
            split_authorization("   ").unwrap_err(),
            IdentityError::CredentialsNotProvided
        ));
        assert!(matches!(
            split_authorization("Basic").unwrap_err(),
            IdentityError::CredentialsNotProvided
        ));
        assert!(matches!(
            split_authorization("Negotiate abc").unwrap_err(),
            IdentityError::UnsupportedScheme(_)
        ));
    }

    #[tokio::test]
    async fn test_unregistered_scheme_is_unsupported() {
        let authenticator = Authenticator::new(Vec::new());
        let err = authenticator
            .authenticate(&CallContext::new(), "Bearer token")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::UnsupportedScheme(name) if name == "Bearer"));
    }
}
