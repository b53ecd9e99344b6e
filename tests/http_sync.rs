#![cfg(feature = "server")]

use axum::{http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quote_sync::server::{router, AppState};
use quote_sync::{
    push_quote, sync_once, FetchError, HttpRemoteSource, MemoryStore, Origin, PayloadFormat,
    PushOutcome, Quote, ReconciliationEngine, RecordSet, Store, SyncError,
};

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn source(url: String, format: PayloadFormat) -> HttpRemoteSource {
    HttpRemoteSource::new(&url, format, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn sync_and_push_against_mock_server() {
    let server_store = Arc::new(MemoryStore::new(RecordSet::from_quotes(vec![
        Quote::remote("Be kind", "B", Some(7)).unwrap(),
        Quote::remote("From the server", "Server", Some(8)).unwrap(),
    ])));
    let addr = spawn(router(AppState::new(server_store.clone()))).await;
    let remote = source(format!("http://{}/api/quotes", addr), PayloadFormat::Quotes);

    let client = MemoryStore::new(RecordSet::from_quotes(vec![
        Quote::local("Be kind", "A").unwrap(),
        Quote::local("Only here", "Mine").unwrap(),
    ]));

    let result = sync_once(&client, &remote, &ReconciliationEngine::new())
        .await
        .unwrap();

    assert_eq!(result.additions.len(), 1);
    assert_eq!(result.overwrites.len(), 1);

    let local = client.load().unwrap();
    let texts: Vec<&str> = local.iter().map(|q| q.text()).collect();
    assert_eq!(texts, vec!["Be kind", "Only here", "From the server"]);
    assert_eq!(local.get("Be kind").unwrap().id(), Some(7));
    assert_eq!(local.get("Only here").unwrap().origin(), Origin::Local);

    // Push-on-add lands upstream with the next id
    let outcome = push_quote(&client, &remote, Quote::local("Fresh idea", "Work").unwrap())
        .await
        .unwrap();
    match outcome {
        PushOutcome::Pushed(accepted) => assert_eq!(accepted.id(), Some(9)),
        other => panic!("expected Pushed, got {:?}", other),
    }
    assert!(server_store.load().unwrap().contains("Fresh idea"));

    // The pushed quote comes back as remote data on the next sync
    let again = sync_once(&client, &remote, &ReconciliationEngine::new())
        .await
        .unwrap();
    assert_eq!(again.overwrites.len(), 1);
    assert_eq!(again.overwrites[0].text, "Fresh idea");
    assert_eq!(
        client.load().unwrap().get("Fresh idea").unwrap().origin(),
        Origin::Remote
    );
}

#[tokio::test]
async fn posts_payload_maps_titles() {
    let app = Router::new().route(
        "/posts",
        get(|| async {
            Json(serde_json::json!([
                {"userId": 1, "id": 1, "title": "sunt aut facere", "body": "quia et suscipit"},
                {"userId": 1, "id": 2, "title": "", "body": "empty title is dropped"},
                {"userId": 1, "id": 3, "title": "ea molestias quasi", "body": "et iusto sed"}
            ]))
        }),
    );
    let addr = spawn(app).await;
    let remote = source(format!("http://{}/posts", addr), PayloadFormat::Posts);

    let client = MemoryStore::new(RecordSet::new());
    let result = sync_once(&client, &remote, &ReconciliationEngine::new())
        .await
        .unwrap();

    assert_eq!(result.additions.len(), 2);
    let merged = client.load().unwrap();
    assert_eq!(merged.get("sunt aut facere").unwrap().category(), "Server");
    assert_eq!(merged.get("ea molestias quasi").unwrap().id(), Some(3));
}

#[tokio::test]
async fn server_error_leaves_local_untouched() {
    let app = Router::new().route("/quotes", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let addr = spawn(app).await;
    let remote = source(format!("http://{}/quotes", addr), PayloadFormat::Quotes);

    let client = MemoryStore::new(RecordSet::from_quotes(vec![
        Quote::local("Keep me", "Mine").unwrap(),
    ]));
    let before = client.load().unwrap().fingerprint();

    let err = sync_once(&client, &remote, &ReconciliationEngine::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Fetch(FetchError::Status { status: 500, .. })
    ));
    assert_eq!(client.load().unwrap().fingerprint(), before);
    assert_eq!(client.save_count().unwrap(), 0);
}

#[tokio::test]
async fn unreachable_remote_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = source(format!("http://{}/quotes", addr), PayloadFormat::Quotes);
    let client = MemoryStore::new(RecordSet::new());

    let err = sync_once(&client, &remote, &ReconciliationEngine::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Fetch(FetchError::Unavailable(_))));
    assert!(client.load().unwrap().is_empty());
}
