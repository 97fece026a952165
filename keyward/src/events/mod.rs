//! Change notifications and their publication.
//!
//! Writes return [`Notification`] values instead of publishing inline. The
//! [`EventDispatcher`] publishes them in the background; a failed publish is
//! logged and counted, never reported to the writer.

pub mod memory;

pub use memory::{MemoryPublisher, Published};

use crate::context::CallContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Current payload schema version
pub const ENVELOPE_VERSION: u32 = 1;

/// Default budget for a single publish call
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Notification topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    UserCreated,
    UserDeleted,
    EmailAttached,
    PhoneAttached,
    PasswordCreated,
    RoleCreated,
    RoleRenamed,
    UserRoleCreated,
    UserRoleDeleted,
    UserViewsChanged,
    ConfirmationCodeIssued,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::UserCreated => "identity.user.created",
            Topic::UserDeleted => "identity.user.deleted",
            Topic::EmailAttached => "identity.email.attached",
            Topic::PhoneAttached => "identity.phone.attached",
            Topic::PasswordCreated => "identity.password.created",
            Topic::RoleCreated => "identity.role.created",
            Topic::RoleRenamed => "identity.role.renamed",
            Topic::UserRoleCreated => "identity.user_role.created",
            Topic::UserRoleDeleted => "identity.user_role.deleted",
            Topic::UserViewsChanged => "identity.user_views.changed",
            Topic::ConfirmationCodeIssued => "identity.confirmation_code.issued",
        }
    }
}

/// Versioned notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// A change produced by a write, waiting to be published
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub topic: Topic,
    pub envelope: Envelope,
}

impl Notification {
    pub fn new(topic: Topic, data: serde_json::Value) -> Self {
        Self {
            topic,
            envelope: Envelope {
                version: ENVELOPE_VERSION,
                occurred_at: Utc::now(),
                data,
            },
        }
    }
}

/// Publication errors
#[derive(Debug, Error)]
pub enum PublishError {
    /// The publisher no longer accepts messages
    #[error("Publisher closed")]
    Closed,

    /// Broker transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Message-bus contract
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: Topic, envelope: &Envelope) -> Result<(), PublishError>;
}

/// Fire-and-forget publication of notifications
#[derive(Clone)]
pub struct EventDispatcher {
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
    failures: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_timeout(publisher, DEFAULT_PUBLISH_TIMEOUT)
    }

    pub fn with_timeout(publisher: Arc<dyn EventPublisher>, timeout: Duration) -> Self {
        Self {
            publisher,
            timeout,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish in the background, in order.
    ///
    /// The returned task resolves to the number of failed publishes; callers
    /// are free to drop it.
    pub fn dispatch(&self, notifications: Vec<Notification>) -> Option<JoinHandle<usize>> {
        if notifications.is_empty() {
            return None;
        }

        let publisher = self.publisher.clone();
        let failures = self.failures.clone();
        let timeout = self.timeout;

        Some(tokio::spawn(async move {
            let mut failed = 0;
            for notification in notifications {
                let ctx = CallContext::with_timeout(timeout);
                let topic = notification.topic;
                if let Err(e) = ctx
                    .run(publisher.publish(topic, &notification.envelope))
                    .await
                {
                    log::error!("Failed to publish {}: {}", topic.as_str(), e);
                    failures.fetch_add(1, Ordering::Relaxed);
                    failed += 1;
                }
            }
            failed
        }))
    }

    /// Total failed publishes since creation
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
