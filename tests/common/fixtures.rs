use dripline::config::EngineConfig;
use dripline::definition::{NodeDef, TriggerType, WorkflowDefinition};
use dripline::engine::WorkflowEngine;
use dripline::services::{Contact, InMemoryContacts, InMemoryEmailDelivery, InMemoryEventLog};
use dripline::stores::{InMemoryDefinitionStore, InMemoryExecutionStore};
use dripline::types::NodeType;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Engine wired to shared in-memory collaborators, with handles to every
/// collaborator so tests can seed and inspect them directly.
#[allow(dead_code)]
pub struct Harness {
    pub engine: WorkflowEngine,
    pub org_id: Uuid,
    /// A contact seeded into the directory (jane@example.com, firstName Jane).
    pub contact: Contact,
    pub contacts: Arc<InMemoryContacts>,
    pub delivery: Arc<InMemoryEmailDelivery>,
    pub events: Arc<InMemoryEventLog>,
    pub definitions: Arc<InMemoryDefinitionStore>,
    pub executions: Arc<InMemoryExecutionStore>,
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

#[allow(dead_code)]
pub fn harness_with(config: EngineConfig) -> Harness {
    let org_id = Uuid::new_v4();
    let contacts = Arc::new(InMemoryContacts::new());
    let contact = Contact::new(org_id, "jane@example.com").with_field("firstName", json!("Jane"));
    contacts.insert(contact.clone());

    let delivery = Arc::new(InMemoryEmailDelivery::new("https://track.example"));
    let events = Arc::new(InMemoryEventLog::new());
    let definitions = Arc::new(InMemoryDefinitionStore::new());
    let executions = Arc::new(InMemoryExecutionStore::new());

    let engine = WorkflowEngine::builder()
        .with_config(config)
        .with_definition_store(definitions.clone())
        .with_execution_store(executions.clone())
        .with_contacts(contacts.clone())
        .with_email_delivery(delivery.clone())
        .with_event_log(events.clone())
        .build();

    Harness {
        engine,
        org_id,
        contact,
        contacts,
        delivery,
        events,
        definitions,
        executions,
    }
}

#[allow(dead_code)]
pub fn email_node(id: &str, subject: &str) -> NodeDef {
    NodeDef::new(id, NodeType::Email).with_config("subject", json!(subject))
}

#[allow(dead_code)]
pub fn wait_node(id: &str, days: u64, hours: u64) -> NodeDef {
    NodeDef::new(id, NodeType::Wait)
        .with_config("days", json!(days))
        .with_config("hours", json!(hours))
}

#[allow(dead_code)]
pub fn condition_node(id: &str, condition: &str) -> NodeDef {
    NodeDef::new(id, NodeType::Condition).with_config("condition", json!(condition))
}

#[allow(dead_code)]
pub fn manual_workflow(org_id: Uuid, name: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(org_id, name, TriggerType::Manual)
}

/// A workflow of `count` sequential email nodes (ids n1, n2, ...).
#[allow(dead_code)]
pub fn sequential_emails(org_id: Uuid, count: usize) -> WorkflowDefinition {
    let mut def = manual_workflow(org_id, "sequential");
    for i in 1..=count {
        let id = format!("n{i}");
        let subject = format!("Message {i} for {{{{firstName}}}}");
        def = def.with_node(email_node(&id, &subject));
    }
    def
}
