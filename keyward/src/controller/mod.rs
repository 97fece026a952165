//! Identity controller and the orchestration service around it.
//!
//! [`IdentityController`] performs writes and returns each result together
//! with the notifications it produced. [`IdentityService`] publishes those
//! notifications and reports infrastructure failures.

pub mod manager;
pub mod service;

pub use manager::IdentityController;
pub use service::IdentityService;

use crate::events::Notification;
use serde::{Deserialize, Serialize};

/// Result of a write plus the changes it has to announce
#[derive(Debug)]
#[must_use = "notifications must be dispatched"]
pub struct Mutation<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

impl<T> Mutation<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            notifications: Vec::new(),
        }
    }

    pub fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn notify_opt(self, notification: Option<Notification>) -> Self {
        match notification {
            Some(notification) => self.notify(notification),
            None => self,
        }
    }

    pub fn into_parts(self) -> (T, Vec<Notification>) {
        (self.value, self.notifications)
    }
}

/// A contact value with the confirmation code proving control of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactProof {
    pub value: String,
    pub code: String,
}

/// User registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<ContactProof>,
    #[serde(default)]
    pub phone: Option<ContactProof>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Delivery channel of a confirmation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Phone,
}

/// Confirmation code request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRequest {
    pub channel: Channel,
    pub value: String,
}
