//! HTTP boundary and process bootstrap for the keyward identity provider.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
