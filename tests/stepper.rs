use dripline::definition::WorkflowDefinition;
use dripline::execution::WorkflowExecution;
use dripline::processors::ProcessorRegistry;
use dripline::queue::StepTask;
use dripline::services::{Contact, InMemoryContacts, InMemoryEmailDelivery, InMemoryEventLog};
use dripline::stepper::Stepper;
use dripline::stores::{
    DefinitionStore, ExecutionStore, InMemoryDefinitionStore, InMemoryExecutionStore,
};
use dripline::types::{ExecutionStatus, NodeType};
use serde_json::{Map, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

mod common;
use common::*;

/// Stepper wired to in-memory stores and a recording queue, so each test
/// drives exactly one step and inspects the scheduling decision.
struct Rig {
    definitions: Arc<InMemoryDefinitionStore>,
    executions: Arc<InMemoryExecutionStore>,
    delivery: Arc<InMemoryEmailDelivery>,
    queue: Arc<RecordingQueue>,
    stepper: Stepper,
    org_id: Uuid,
    contact: Contact,
}

fn rig() -> Rig {
    let org_id = Uuid::new_v4();
    let contacts = Arc::new(InMemoryContacts::new());
    let contact = Contact::new(org_id, "jane@example.com").with_field("firstName", json!("Jane"));
    contacts.insert(contact.clone());

    let delivery = Arc::new(InMemoryEmailDelivery::new("https://track.example"));
    let events = Arc::new(InMemoryEventLog::new());
    let definitions = Arc::new(InMemoryDefinitionStore::new());
    let executions = Arc::new(InMemoryExecutionStore::new());
    let queue = Arc::new(RecordingQueue::new());

    let registry =
        ProcessorRegistry::with_defaults(contacts.clone(), delivery.clone(), events.clone());
    let stepper = Stepper::new(
        definitions.clone(),
        executions.clone(),
        registry,
        queue.clone(),
    );

    Rig {
        definitions,
        executions,
        delivery,
        queue,
        stepper,
        org_id,
        contact,
    }
}

/// Insert `def` and a fresh execution for `contact_id` pointing at its
/// first node.
async fn start(rig: &Rig, def: &WorkflowDefinition, contact_id: Uuid) -> WorkflowExecution {
    rig.definitions
        .insert_definition(def.clone())
        .await
        .unwrap();
    let first = def
        .first_node()
        .map(|n| n.id.clone())
        .unwrap_or_else(|| "end".to_string());
    let exec = WorkflowExecution::new(def.id, def.organization_id, contact_id, first, Map::new());
    rig.executions.insert_execution(exec.clone()).await.unwrap();
    exec
}

#[tokio::test]
async fn stale_execution_task_is_a_silent_noop() {
    let rig = rig();
    let task = StepTask::new(Uuid::new_v4(), "n1");
    rig.stepper.step(&task).await.unwrap();
    assert!(rig.queue.recorded().is_empty());
}

#[tokio::test]
async fn stale_definition_task_is_a_silent_noop() {
    let rig = rig();
    let exec = WorkflowExecution::new(
        Uuid::new_v4(), // definition never stored
        rig.org_id,
        rig.contact.id,
        "n1",
        Map::new(),
    );
    rig.executions.insert_execution(exec.clone()).await.unwrap();

    rig.stepper
        .step(&StepTask::new(exec.id, "n1"))
        .await
        .unwrap();

    assert!(rig.queue.recorded().is_empty());
    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Running);
    assert_eq!(stored, exec);
}

#[tokio::test]
async fn unresolvable_node_completes_the_execution() {
    let rig = rig();
    let def = manual_workflow(rig.org_id, "one").with_node(email_node("n1", "Hi"));
    let exec = start(&rig, &def, rig.contact.id).await;

    rig.stepper
        .step(&StepTask::new(exec.id, "never-existed"))
        .await
        .unwrap();

    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert!(rig.queue.recorded().is_empty());
    assert!(rig.delivery.sent().is_empty());
}

#[tokio::test]
async fn wait_node_marks_waiting_and_delays_the_next_task() {
    let rig = rig();
    let def = manual_workflow(rig.org_id, "pause")
        .with_node(wait_node("n1", 0, 2))
        .with_node(email_node("n2", "Later"));
    let exec = start(&rig, &def, rig.contact.id).await;

    rig.stepper
        .step(&StepTask::new(exec.id, "n1"))
        .await
        .unwrap();

    let enqueued = rig.queue.recorded();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].0, StepTask::new(exec.id, "n2"));
    assert_eq!(enqueued[0].1, Duration::from_secs(2 * 60 * 60));

    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Waiting);
    assert_eq!(stored.data["n1"]["requestedDelay"], json!(7_200_000));
}

#[tokio::test]
async fn condition_branch_without_table_entry_terminates() {
    let rig = rig();
    // Only the true branch is routed; with no events recorded the condition
    // evaluates false, which has no entry.
    let def = manual_workflow(rig.org_id, "half-branch")
        .with_node(condition_node("c1", "email_opened").with_branch("true", "thanks"))
        .with_node(email_node("thanks", "Thanks"));
    let exec = start(&rig, &def, rig.contact.id).await;

    rig.stepper
        .step(&StepTask::new(exec.id, "c1"))
        .await
        .unwrap();

    assert!(rig.queue.recorded().is_empty());
    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.data["c1"]["branch"], json!("false"));
}

#[tokio::test]
async fn unregistered_kind_records_empty_result_and_continues() {
    let rig = rig();
    let def = manual_workflow(rig.org_id, "mixed")
        .with_node(dripline::definition::NodeDef::new(
            "n1",
            NodeType::Other("webhook".to_string()),
        ))
        .with_node(email_node("n2", "After"));
    let exec = start(&rig, &def, rig.contact.id).await;

    rig.stepper
        .step(&StepTask::new(exec.id, "n1"))
        .await
        .unwrap();

    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.data["n1"], json!({}));
    assert_eq!(stored.status, ExecutionStatus::Running);

    let enqueued = rig.queue.recorded();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].0, StepTask::new(exec.id, "n2"));
    assert_eq!(enqueued[0].1, Duration::ZERO);
}

#[tokio::test]
async fn processor_failure_is_persisted_then_propagated() {
    let rig = rig();
    let def = manual_workflow(rig.org_id, "orphan").with_node(email_node("n1", "Hi"));
    // Execution for a contact that was never seeded.
    let exec = start(&rig, &def, Uuid::new_v4()).await;

    let err = rig
        .stepper
        .step(&StepTask::new(exec.id, "n1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("n1"));

    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert!(stored.error_message.unwrap().contains("not found"));
    // The attempted node was persisted before processing.
    assert_eq!(stored.current_node_id, "n1");
    assert_eq!(stored.current_node_type, Some(NodeType::Email));
    assert!(rig.queue.recorded().is_empty());
}

#[tokio::test]
async fn last_node_completes_without_scheduling() {
    let rig = rig();
    let def = manual_workflow(rig.org_id, "single").with_node(email_node("n1", "Only one"));
    let exec = start(&rig, &def, rig.contact.id).await;

    rig.stepper
        .step(&StepTask::new(exec.id, "n1"))
        .await
        .unwrap();

    let stored = rig.executions.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.data["n1"]["status"], json!("sent"));
    assert!(rig.queue.recorded().is_empty());
    assert_eq!(rig.delivery.sent().len(), 1);
}
