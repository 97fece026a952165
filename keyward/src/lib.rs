//! # Keyward
//!
//! Identity core: verifies presented credentials, signs and validates access
//! tokens with rotating secrets, issues and renews sessions, and keeps a
//! denormalized view of every user for cheap reads.
//!
//! ## Architecture
//!
//! Every operation flows through an [`IdentityService`], which drives the
//! [`IdentityController`] and publishes the notifications its writes produce:
//!
//! - **SecretStore**: signing secrets in a local cache, a shared cache and the
//!   durable store, plus the designated "actual" secret used for new tokens
//! - **TokenCodec**: signed access tokens bound to a secret by id
//! - **CredentialBackends**: one backend per `Authorization` scheme (Basic and Bearer)
//! - **SessionManager**: refresh-token sessions and access-token minting
//! - **ProjectionEngine**: user views recomputed after every write that moves them
//!
//! ## Core Modules
//!
//! - [`controller`]: write/read orchestration and the service wrapper
//! - [`db`]: durable store contract with Postgres and in-memory implementations
//! - [`cache`]: distributed cache contract with Redis and in-memory implementations
//! - [`events`]: change notifications and their background publication
//!
//! ## Example
//!
//! ```
//! use keyward::contact::normalize_email;
//!
//! assert_eq!(normalize_email(" Alice@Example.COM ").unwrap(), "alice@example.com");
//! ```

/// Local and distributed caches.
pub mod cache;

/// Identity configuration loaded from the environment.
pub mod config;

/// Contact normalization and confirmation codes.
pub mod contact;

/// Per-call deadline and cancellation.
pub mod context;

/// Identity controller and service.
pub mod controller;

/// Credential backends and the scheme dispatcher.
pub mod credentials;

/// Durable storage.
pub mod db;

/// Error and status-code taxonomy.
pub mod errors;

/// Change notifications.
pub mod events;

/// Password hashing.
pub mod password;

/// User view projection.
pub mod projection;

/// Signing secrets.
pub mod secrets;

/// Refresh-token sessions.
pub mod session;

/// Access token codec.
pub mod token;

pub use config::{ConfigError, IdentityConfig};
pub use context::CallContext;
pub use controller::{IdentityController, IdentityService, Mutation};
pub use credentials::{Identity, Scheme};
pub use errors::{IdentityError, IdentityResult, StatusCode, status_pair};
pub use events::{EventDispatcher, EventPublisher, Notification, Topic};
pub use session::{RenewRequest, Session};
