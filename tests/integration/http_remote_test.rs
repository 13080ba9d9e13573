//! Queue draining against a PostgREST-style backend

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zenith::client::remote::HttpRemote;
use zenith::client::sync::SyncOutcome;
use zenith::client::{AppState, Config, Session, SessionState};
use zenith::shared::config::AppConfig;
use zenith::shared::record::{record_from, RecordId, Table};

use crate::assert_pending;
use crate::common::*;

async fn http_state(server: &MockServer, db: &TestDatabase) -> AppState {
    let config = Config::from_app(
        AppConfig::builder()
            .server_url(server.uri())
            .api_key("anon-key")
            .data_dir(db.data_dir())
            .build()
            .unwrap(),
    );
    let session = SessionState::new();
    let remote = Arc::new(HttpRemote::from_config(&config, session.clone()).unwrap());
    AppState::open_with_session(config, session, remote).await.unwrap()
}

async fn mount_empty_collections(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/v1/[a-z]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_offline_note_is_posted_and_refetched() {
    let server = MockServer::start().await;
    let db = TestDatabase::new();
    let state = http_state(&server, &db).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notes"))
        .and(header("Authorization", "Bearer user-jwt"))
        .and(body_json(json!([{"title": "Plan", "content": "", "user_id": "user-1"}])))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{"id": 9, "title": "Plan", "content": "", "user_id": "user-1"}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/notes"))
        .and(query_param("order", "updated_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 9, "title": "Plan", "content": ""}])))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    state.network().set_online(false);
    state.sign_in(Session::new("user-1").with_token("user-jwt")).await;
    let temp = state.mutations().create(Table::Notes, note("Plan")).await.unwrap();
    assert!(temp.is_temporary());

    state.network().set_online(true);
    let outcome = state.sync().request_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { applied: 1 });

    let notes = state.cache().records(Table::Notes).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["id"], json!(9));
    assert!(state.cache().get(Table::Notes, &temp).await.is_none());
}

#[tokio::test]
async fn test_server_errors_keep_entry_queued() {
    let server = MockServer::start().await;
    let db = TestDatabase::new();
    let state = http_state(&server, &db).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/budgets"))
        .and(query_param("category", "eq.Food"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    state.network().set_online(false);
    state.sign_in(Session::new("user-1")).await;
    state
        .mutations()
        .mutate(
            zenith::client::offline::Mutation::update(Table::Budgets, "Food", record_from(json!({"amount": 500})))
                .with_match_field("category"),
        )
        .await
        .unwrap();

    state.network().set_online(true);
    let outcome = state.sync().request_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Incomplete { remaining: 1 });

    let entries = state.queue().snapshot().await.unwrap();
    assert_eq!(entries[0].attempts, 3);
    assert_eq!(entries[0].match_value, Some(RecordId::from("Food")));
    assert!(entries[0].last_error.as_deref().unwrap().contains("503"));
    assert!(state.queue().dead_letters().await.unwrap().is_empty());
    assert_pending!(state.queue(), 1);
}
