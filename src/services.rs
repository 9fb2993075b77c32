//! External collaborator seams: contacts, email delivery, and the event log.
//!
//! The engine never talks to a mail provider or an analytics pipeline
//! directly. It depends on the three traits here, injected at construction
//! time, so the stepper and processors stay testable and the process entry
//! point decides what backs each seam.
//!
//! In-memory implementations ship alongside the traits. They are real
//! implementations, not test doubles: [`InMemoryEmailDelivery`] performs the
//! same record-keeping and tracking-pixel injection a production delivery
//! service would, it just stops short of an SMTP handshake.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Failures raised by a collaborator backend.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("email delivery failed: {message}")]
    #[diagnostic(code(dripline::services::delivery))]
    Delivery { message: String },

    #[error("collaborator backend error: {message}")]
    #[diagnostic(code(dripline::services::backend))]
    Backend { message: String },
}

/// A contact as the engine sees it: identity plus free-form profile fields.
///
/// `fields` is flattened so `{"firstName": "Jane"}` sits next to `email` in
/// the serialized form, which is exactly the shape the template context
/// expects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Contact {
    pub fn new(organization_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            email: email.into(),
            fields: Map::new(),
        }
    }

    /// Set one profile field (builder style).
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// By-id contact lookup. Absence is an expected outcome, not an error.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find_contact(&self, id: Uuid) -> Result<Option<Contact>, ServiceError>;
}

/// An outbound email handed to the delivery collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct SendEmail {
    pub organization_id: Uuid,
    pub contact_id: Uuid,
    pub execution_id: Uuid,
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

/// Receipt returned by a successful send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub email_id: Uuid,
}

/// Sends an email and persists the outbound record (including the tracking
/// artifact). Failures propagate and fail the enclosing step.
#[async_trait]
pub trait EmailDelivery: Send + Sync {
    async fn send(&self, email: SendEmail) -> Result<SendReceipt, ServiceError>;
}

/// One timestamped tracked event (e.g. a pixel-recorded open).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub organization_id: Uuid,
    pub contact_id: Uuid,
    pub kind: String,
    pub at: DateTime<Utc>,
}

impl TrackedEvent {
    pub fn now(organization_id: Uuid, contact_id: Uuid, kind: impl Into<String>) -> Self {
        Self {
            organization_id,
            contact_id,
            kind: kind.into(),
            at: Utc::now(),
        }
    }
}

/// Append-only event log queried by condition nodes.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: TrackedEvent) -> Result<(), ServiceError>;

    /// Whether any event of `kind` exists for this contact, optionally
    /// restricted to a lookback window in hours.
    async fn recorded(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
        kind: &str,
        within_hours: Option<i64>,
    ) -> Result<bool, ServiceError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// Contact directory backed by a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryContacts {
    contacts: Mutex<FxHashMap<Uuid, Contact>>,
}

impl InMemoryContacts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contact: Contact) {
        self.contacts
            .lock()
            .expect("contacts mutex poisoned")
            .insert(contact.id, contact);
    }
}

#[async_trait]
impl ContactDirectory for InMemoryContacts {
    async fn find_contact(&self, id: Uuid) -> Result<Option<Contact>, ServiceError> {
        Ok(self
            .contacts
            .lock()
            .expect("contacts mutex poisoned")
            .get(&id)
            .cloned())
    }
}

/// A delivered email as retained by [`InMemoryEmailDelivery`].
#[derive(Clone, Debug, PartialEq)]
pub struct SentEmail {
    pub email_id: Uuid,
    pub organization_id: Uuid,
    pub contact_id: Uuid,
    pub execution_id: Uuid,
    pub to: String,
    pub subject: String,
    /// Body with the tracking pixel already appended.
    pub body_html: String,
    pub tracking_pixel_url: String,
    pub sent_at: DateTime<Utc>,
}

/// Email delivery that records every send and injects the tracking pixel,
/// without a real transport behind it.
#[derive(Debug)]
pub struct InMemoryEmailDelivery {
    base_url: String,
    sent: Mutex<Vec<SentEmail>>,
}

impl Default for InMemoryEmailDelivery {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

impl InMemoryEmailDelivery {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Everything sent so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

#[async_trait]
impl EmailDelivery for InMemoryEmailDelivery {
    async fn send(&self, email: SendEmail) -> Result<SendReceipt, ServiceError> {
        let email_id = Uuid::new_v4();
        let tracking_pixel_url = format!(
            "{}/o/{}/{}.png",
            self.base_url, email.organization_id, email_id
        );
        let body_html = format!(
            "{}<br><img src=\"{}\" width=\"1\" height=\"1\" style=\"display:none;\" />",
            email.body_html, tracking_pixel_url
        );
        debug!(%email_id, to = %email.to, subject = %email.subject, "email recorded");
        self.sent.lock().expect("sent mutex poisoned").push(SentEmail {
            email_id,
            organization_id: email.organization_id,
            contact_id: email.contact_id,
            execution_id: email.execution_id,
            to: email.to,
            subject: email.subject,
            body_html,
            tracking_pixel_url,
            sent_at: Utc::now(),
        });
        Ok(SendReceipt { email_id })
    }
}

/// Event log backed by a process-local vector.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<TrackedEvent>>,
}

impl InMemoryEventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: TrackedEvent) -> Result<(), ServiceError> {
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(event);
        Ok(())
    }

    async fn recorded(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
        kind: &str,
        within_hours: Option<i64>,
    ) -> Result<bool, ServiceError> {
        let cutoff = within_hours.map(|h| Utc::now() - Duration::hours(h));
        let events = self.events.lock().expect("events mutex poisoned");
        Ok(events.iter().any(|e| {
            e.organization_id == organization_id
                && e.contact_id == contact_id
                && e.kind == kind
                && cutoff.is_none_or(|c| e.at > c)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_appends_tracking_pixel() {
        let delivery = InMemoryEmailDelivery::new("https://track.example");
        let org = Uuid::new_v4();
        let receipt = delivery
            .send(SendEmail {
                organization_id: org,
                contact_id: Uuid::new_v4(),
                execution_id: Uuid::new_v4(),
                to: "jane@example.com".into(),
                subject: "Hi".into(),
                body_html: "<p>Hello</p>".into(),
            })
            .await
            .unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        let expected_pixel = format!("https://track.example/o/{org}/{}.png", receipt.email_id);
        assert_eq!(sent[0].tracking_pixel_url, expected_pixel);
        assert!(sent[0].body_html.starts_with("<p>Hello</p><br><img"));
        assert!(sent[0].body_html.contains(&expected_pixel));
    }

    #[tokio::test]
    async fn event_log_respects_lookback_window() {
        let log = InMemoryEventLog::new();
        let org = Uuid::new_v4();
        let contact = Uuid::new_v4();
        let mut old = TrackedEvent::now(org, contact, "email_opened");
        old.at = Utc::now() - Duration::hours(48);
        log.append(old).await.unwrap();

        assert!(log.recorded(org, contact, "email_opened", None).await.unwrap());
        assert!(!log
            .recorded(org, contact, "email_opened", Some(24))
            .await
            .unwrap());
        assert!(!log.recorded(org, contact, "email_clicked", None).await.unwrap());
    }

    #[tokio::test]
    async fn contact_lookup_absence_is_ok_none() {
        let contacts = InMemoryContacts::new();
        assert_eq!(contacts.find_contact(Uuid::new_v4()).await.unwrap(), None);
    }
}
