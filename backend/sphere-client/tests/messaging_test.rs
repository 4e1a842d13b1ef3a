/// Integration tests for conversations and direct messages
mod common;

use common::{backend, client, drain, other_device, signed_up, wait_until};
use document_store::{DocumentStore, InMemoryBackend, Query};
use serde_json::json;
use sphere_client::domain::UserProfile;
use sphere_client::{ClientError, SphereClient};
use std::sync::Arc;

async fn profile(backend: &InMemoryBackend, uid: &str) -> UserProfile {
    backend
        .documents
        .get("users", uid)
        .await
        .unwrap()
        .expect("profile missing")
        .decode()
        .unwrap()
}

async fn wait_for_conversations(client: &SphereClient, count: usize) {
    let mut watch = client.conversations_watch().await.expect("messaging not open");
    wait_until(&mut watch, |s| !s.is_loading() && s.items().len() == count).await;
}

/// Ada and Grace signed in on two devices, both with messaging open
async fn pair(backend: &InMemoryBackend) -> (Arc<SphereClient>, Arc<SphereClient>, String, String) {
    let ada = client(backend);
    let grace = other_device(backend);
    let ada_uid = signed_up(&ada, "ada@example.com", "Ada").await;
    let grace_uid = signed_up(&grace, "grace@example.com", "Grace").await;
    ada.open_messaging().await.unwrap();
    grace.open_messaging().await.unwrap();
    wait_for_conversations(&ada, 0).await;
    wait_for_conversations(&grace, 0).await;
    (ada, grace, ada_uid, grace_uid)
}

#[tokio::test]
async fn test_start_creates_then_reuses_conversation() {
    let backend = backend();
    let (ada, grace, ada_uid, grace_uid) = pair(&backend).await;
    let grace_profile = profile(&backend, &grace_uid).await;
    let mut notices = ada.notices();

    let started = ada.start_conversation(&grace_profile).await.unwrap();
    assert!(started.created);
    assert_eq!(ada.selected_conversation().await, Some(started.id.clone()));

    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Conversation started");
    assert_eq!(notices[0].description, "Started conversation with Grace");

    wait_for_conversations(&ada, 1).await;
    let again = ada.start_conversation(&grace_profile).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.id, started.id);

    // The other side reuses it too once it is loaded there
    wait_for_conversations(&grace, 1).await;
    let ada_profile = profile(&backend, &ada_uid).await;
    let from_grace = grace.start_conversation(&ada_profile).await.unwrap();
    assert!(!from_grace.created);
    assert_eq!(from_grace.id, started.id);

    assert_eq!(backend.documents.document_count("conversations").await, 1);
}

#[tokio::test]
async fn test_conversation_document_carries_both_participants() {
    let backend = backend();
    let (ada, _grace, ada_uid, grace_uid) = pair(&backend).await;
    let grace_profile = profile(&backend, &grace_uid).await;

    let started = ada.start_conversation(&grace_profile).await.unwrap();
    wait_for_conversations(&ada, 1).await;

    let conversation = ada
        .conversations()
        .await
        .into_iter()
        .find(|c| c.id == started.id)
        .unwrap();
    assert_eq!(conversation.participants, vec![ada_uid.clone(), grace_uid.clone()]);
    assert_eq!(conversation.participant_names[&ada_uid], "Ada");
    assert_eq!(conversation.participant_names[&grace_uid], "Grace");
    assert_eq!(conversation.participant_photos[&grace_uid], "");
    assert!(conversation.created_at.is_some());

    let other = conversation.other_participant(&ada_uid).unwrap();
    assert_eq!(other.uid, grace_uid);
    assert_eq!(other.name, "Grace");
    assert_eq!(other.photo, None);
}

#[tokio::test]
async fn test_simultaneous_starts_create_duplicates() {
    let backend = backend();
    let (ada, grace, ada_uid, grace_uid) = pair(&backend).await;
    let ada_profile = profile(&backend, &ada_uid).await;
    let grace_profile = profile(&backend, &grace_uid).await;

    // Neither side sees the other's document before deciding
    backend.documents.pause_delivery();
    let from_ada = ada.start_conversation(&grace_profile).await.unwrap();
    let from_grace = grace.start_conversation(&ada_profile).await.unwrap();
    backend.documents.resume_delivery().await;

    assert!(from_ada.created);
    assert!(from_grace.created);
    assert_ne!(from_ada.id, from_grace.id);
    assert_eq!(backend.documents.document_count("conversations").await, 2);

    wait_for_conversations(&ada, 2).await;
    wait_for_conversations(&grace, 2).await;
}

#[tokio::test]
async fn test_send_resolves_receiver_and_updates_last_message() {
    let backend = backend();
    let (ada, grace, ada_uid, grace_uid) = pair(&backend).await;
    let grace_profile = profile(&backend, &grace_uid).await;

    let started = ada.start_conversation(&grace_profile).await.unwrap();
    wait_for_conversations(&ada, 1).await;

    ada.send_message("  Hi Grace  ").await.unwrap();

    let mut messages = ada.messages_watch().await.unwrap();
    let state = wait_until(&mut messages, |s| s.items().len() == 1).await;
    let message = &state.items()[0];
    assert_eq!(message.text, "Hi Grace");
    assert_eq!(message.conversation_id, started.id);
    assert_eq!(message.sender_id, ada_uid);
    assert_eq!(message.sender_name, "Ada");
    assert_eq!(message.receiver_id.as_deref(), Some(grace_uid.as_str()));

    let mut conversations = grace.conversations_watch().await.unwrap();
    let state = wait_until(&mut conversations, |s| {
        s.items().first().and_then(|c| c.last_message.as_deref()) == Some("Hi Grace")
    })
    .await;
    assert!(state.items()[0].last_message_time.is_some());

    // Grace answers in the same conversation
    grace.select_conversation(Some(started.id.as_str())).await.unwrap();
    grace.send_message("Hello Ada").await.unwrap();
    let state = wait_until(&mut messages, |s| s.items().len() == 2).await;
    let texts: Vec<&str> = state.items().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["Hi Grace", "Hello Ada"]);
    assert_eq!(state.items()[1].receiver_id.as_deref(), Some(ada_uid.as_str()));
}

#[tokio::test]
async fn test_switching_selection_replaces_message_subscription() {
    let backend = backend();
    let ada = client(&backend);
    let ada_uid = signed_up(&ada, "ada@example.com", "Ada").await;
    let grace = other_device(&backend);
    let grace_uid = signed_up(&grace, "grace@example.com", "Grace").await;
    let alan = other_device(&backend);
    let alan_uid = signed_up(&alan, "alan@example.com", "Alan").await;
    ada.open_messaging().await.unwrap();

    let with_grace = ada.start_conversation(&profile(&backend, &grace_uid).await).await.unwrap();
    wait_for_conversations(&ada, 1).await;
    let with_alan = ada.start_conversation(&profile(&backend, &alan_uid).await).await.unwrap();
    wait_for_conversations(&ada, 2).await;

    assert_eq!(backend.documents.subscriber_count("messages"), 1);
    assert_eq!(ada.selected_conversation().await, Some(with_alan.id.clone()));

    ada.send_message("to alan").await.unwrap();
    ada.select_conversation(Some(with_grace.id.as_str())).await.unwrap();
    assert_eq!(backend.documents.subscriber_count("messages"), 1);

    let mut messages = ada.messages_watch().await.unwrap();
    let state = wait_until(&mut messages, |s| !s.is_loading()).await;
    assert!(state.items().is_empty());

    let sent = backend
        .documents
        .query(&Query::collection("messages").where_eq("senderId", ada_uid.as_str()))
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);

    ada.select_conversation(None).await.unwrap();
    assert_eq!(backend.documents.subscriber_count("messages"), 0);
    assert!(ada.messages().await.is_empty());
}

#[tokio::test]
async fn test_send_without_selection_is_rejected_quietly() {
    let backend = backend();
    let (ada, _grace, _, _) = pair(&backend).await;
    let mut notices = ada.notices();

    let err = ada.send_message("hello?").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));
    assert!(drain(&mut notices).is_empty());
    assert_eq!(backend.documents.document_count("messages").await, 0);
}

#[tokio::test]
async fn test_failed_send_publishes_notice() {
    let backend = backend();
    let (ada, _grace, _, grace_uid) = pair(&backend).await;
    ada.start_conversation(&profile(&backend, &grace_uid).await)
        .await
        .unwrap();
    let mut notices = ada.notices();

    backend.documents.fail_writes("messages", "The service is currently unavailable.");
    let err = ada.send_message("lost").await.unwrap_err();

    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Failed to send message");
    assert_eq!(notices[0].description, err.to_string());
    assert!(notices[0].is_destructive());
}

#[tokio::test]
async fn test_send_succeeds_when_last_message_update_fails() {
    let backend = backend();
    let (ada, _grace, _, grace_uid) = pair(&backend).await;
    let started = ada
        .start_conversation(&profile(&backend, &grace_uid).await)
        .await
        .unwrap();
    let mut notices = ada.notices();

    backend
        .documents
        .fail_writes("conversations", "The service is currently unavailable.");
    let id = ada.send_message("delivered").await.unwrap();

    let message = backend.documents.get("messages", &id).await.unwrap().unwrap();
    assert_eq!(message.get("text"), Some(&json!("delivered")));
    assert_eq!(backend.documents.document_count("messages").await, 1);

    // The cached preview is stale but the send is not reported as failed
    let conversation = backend
        .documents
        .get("conversations", &started.id)
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.get("lastMessage").is_none());
    assert!(drain(&mut notices).iter().all(|n| !n.is_destructive()));
}

#[tokio::test]
async fn test_sign_out_tears_down_messaging() {
    let backend = backend();
    let (ada, _grace, _, grace_uid) = pair(&backend).await;
    ada.start_conversation(&profile(&backend, &grace_uid).await)
        .await
        .unwrap();
    assert_eq!(backend.documents.subscriber_count("messages"), 1);

    ada.sign_out().await.unwrap();
    assert_eq!(backend.documents.subscriber_count("messages"), 0);
    assert!(ada.conversations_watch().await.is_none());
    assert!(ada.session().current_user().is_none());
}
