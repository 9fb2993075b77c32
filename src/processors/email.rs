//! The `email` processor: render and dispatch one email to the contact.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::definition::NodeDef;
use crate::execution::WorkflowExecution;
use crate::services::{ContactDirectory, EmailDelivery, SendEmail};
use crate::template::render;

use super::{NodeOutcome, NodeProcessor, ProcessorError, parse_config, template_context};

/// Body used when a node configures no template of its own.
const DEFAULT_TEMPLATE: &str = "Default Template";

/// Typed schema of an `email` node's config map.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub subject: String,
    /// HTML body template; falls back to a stock body when absent.
    pub template: Option<String>,
}

/// Resolves the contact, renders subject/body against the contact's profile
/// fields overlaid with the execution's accumulated data, and delegates the
/// send to the delivery collaborator.
///
/// A missing contact fails the step: unlike a stale execution, an email
/// without a recipient is a real error, not a tolerable race.
pub struct EmailProcessor {
    contacts: Arc<dyn ContactDirectory>,
    delivery: Arc<dyn EmailDelivery>,
}

impl EmailProcessor {
    pub fn new(contacts: Arc<dyn ContactDirectory>, delivery: Arc<dyn EmailDelivery>) -> Self {
        Self { contacts, delivery }
    }
}

#[async_trait]
impl NodeProcessor for EmailProcessor {
    async fn process(
        &self,
        node: &NodeDef,
        execution: &WorkflowExecution,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: EmailConfig = parse_config(node)?;

        let contact = self
            .contacts
            .find_contact(execution.contact_id)
            .await?
            .ok_or(ProcessorError::ContactNotFound {
                contact_id: execution.contact_id,
            })?;

        let contact_json =
            serde_json::to_value(&contact).map_err(|source| ProcessorError::Context { source })?;
        let context = template_context(contact_json, &execution.data)?;

        let subject = render(&config.subject, &context);
        let body = render(config.template.as_deref().unwrap_or(DEFAULT_TEMPLATE), &context);

        debug!(node_id = %node.id, to = %contact.email, "sending workflow email");
        let receipt = self
            .delivery
            .send(SendEmail {
                organization_id: execution.organization_id,
                contact_id: execution.contact_id,
                execution_id: execution.id,
                to: contact.email,
                subject,
                body_html: body,
            })
            .await?;

        Ok(NodeOutcome::of(json!({
            "status": "sent",
            "emailId": receipt.email_id,
        })))
    }
}
