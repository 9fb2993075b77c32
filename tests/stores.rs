#![cfg(feature = "sqlite")]

use dripline::engine::WorkflowEngine;
use dripline::execution::WorkflowExecution;
use dripline::services::{Contact, InMemoryContacts, InMemoryEmailDelivery, InMemoryEventLog};
use dripline::stores::{DefinitionStore, ExecutionStore, SqliteStores};
use dripline::types::ExecutionStatus;
use serde_json::{Map, json};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

mod common;
use common::*;

async fn sqlite_stores() -> (TempDir, SqliteStores) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("dripline.db").display());
    let stores = SqliteStores::connect(&url).await.unwrap();
    (dir, stores)
}

#[tokio::test]
async fn definition_roundtrip_preserves_branches_and_config() {
    let (_dir, stores) = sqlite_stores().await;
    let org_id = Uuid::new_v4();
    let def = manual_workflow(org_id, "branchy")
        .with_node(email_node("n1", "Hi {{firstName}}"))
        .with_node(
            condition_node("c1", "email_opened")
                .with_config("timeframe_hours", json!(24))
                .with_branch("true", "n1")
                .with_branch("false", "c1"),
        );
    stores.insert_definition(def.clone()).await.unwrap();

    let loaded = stores.find_definition(def.id).await.unwrap().unwrap();
    assert_eq!(loaded, def);
    assert!(stores.find_definition(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn execution_updates_are_persisted() {
    let (_dir, stores) = sqlite_stores().await;
    let mut exec = WorkflowExecution::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "n1",
        Map::new(),
    );
    stores.insert_execution(exec.clone()).await.unwrap();

    exec.record_result("n1", json!({"status": "sent"}));
    exec.mark_completed();
    stores.update_execution(&exec).await.unwrap();

    let loaded = stores.find_execution(exec.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Completed);
    assert_eq!(loaded.data["n1"]["status"], json!("sent"));
    assert!(loaded.completed_at.is_some());
}

#[tokio::test]
async fn updating_a_deleted_execution_is_a_noop() {
    let (_dir, stores) = sqlite_stores().await;
    let exec = WorkflowExecution::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "n1",
        Map::new(),
    );
    // Never inserted: the update matches zero rows and succeeds.
    stores.update_execution(&exec).await.unwrap();
    assert!(stores.find_execution(exec.id).await.unwrap().is_none());
}

#[tokio::test]
async fn records_survive_a_reconnect() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("dripline.db").display());

    let def = manual_workflow(Uuid::new_v4(), "durable").with_node(email_node("n1", "Hi"));
    {
        let stores = SqliteStores::connect(&url).await.unwrap();
        stores.insert_definition(def.clone()).await.unwrap();
    }

    let stores = SqliteStores::connect(&url).await.unwrap();
    let loaded = stores.find_definition(def.id).await.unwrap().unwrap();
    assert_eq!(loaded, def);
}

#[tokio::test]
async fn engine_runs_end_to_end_over_sqlite() {
    let (_dir, stores) = sqlite_stores().await;
    let org_id = Uuid::new_v4();
    let contacts = Arc::new(InMemoryContacts::new());
    let contact = Contact::new(org_id, "jane@example.com").with_field("firstName", json!("Jane"));
    contacts.insert(contact.clone());
    let delivery = Arc::new(InMemoryEmailDelivery::new("https://track.example"));

    let engine = WorkflowEngine::builder()
        .with_definition_store(Arc::new(stores.clone()))
        .with_execution_store(Arc::new(stores.clone()))
        .with_contacts(contacts)
        .with_email_delivery(delivery.clone())
        .with_event_log(Arc::new(InMemoryEventLog::new()))
        .build();

    let def = manual_workflow(org_id, "welcome")
        .with_node(email_node("n1", "Hello {{firstName}}"))
        .with_node(email_node("n2", "Bye"));
    let workflow_id = engine.create_workflow(def).await.unwrap();
    let execution_id = engine
        .trigger(workflow_id, contact.id, Map::new())
        .await
        .unwrap();
    engine.drain().await;

    let exec = stores.find_execution(execution_id).await.unwrap().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(delivery.sent().len(), 2);
}
