//! Session lifecycle: issue, renew, bind to a client fingerprint and secret.

pub mod manager;
pub mod models;

pub use manager::SessionManager;
pub use models::{RenewRequest, Session};
