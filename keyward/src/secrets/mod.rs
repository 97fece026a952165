//! Signing secrets and their three storage tiers.
//!
//! Lookups go process-local cache → shared cache → durable store, writing a
//! lower-tier hit back into every tier above it. Exactly one secret is the
//! "actual" one used to sign new tokens; older secrets keep verifying until
//! their cache entries age out.

pub mod models;
pub mod store;

pub use models::{KEY_BYTES, Secret, SecretId};
pub use store::{ACTUAL_SECRET_KEY, SecretStore, SecretTtl, secret_key};
