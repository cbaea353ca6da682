//! Integration tests for the HTTP API and WebSocket event stream.
//!
//! Each test spawns a real server on a free local port and talks to it over
//! HTTP with reqwest and over WebSocket with tokio-tungstenite.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use quotient_engine::{
    create_router, EventBroadcaster, ProblemBank, SessionController, SessionPolicy,
    SessionService, Tutor,
};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    base_url: String,
    ws_url: String,
    bank: Arc<ProblemBank>,
    _handle: tokio::task::JoinHandle<()>,
}

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

fn fixture_bank() -> Arc<ProblemBank> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/problems.json");
    Arc::new(ProblemBank::load(path).expect("fixture bank"))
}

async fn spawn_test_server(session_limit: usize) -> TestServer {
    let bank = fixture_bank();
    let policy = SessionPolicy {
        session_limit,
        ..SessionPolicy::default()
    };
    let controller = SessionController::new(Arc::clone(&bank), policy);
    let service = SessionService::new(controller, Tutor::offline(), EventBroadcaster::default());

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    let router = create_router(service);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base_url: format!("http://{addr}/api"),
        ws_url: format!("ws://{addr}/ws"),
        bank,
        _handle: handle,
    }
}

async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Next text frame as JSON, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let response = client.post(url).json(&body).send().await.expect("request");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json body"))
}

async fn get(client: &reqwest::Client, url: String) -> (u16, Value) {
    let response = client.get(url).send().await.expect("request");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json body"))
}

fn answer_for(bank: &ProblemBank, problem: &Value) -> String {
    let id = problem["id"].as_str().expect("problem id");
    bank.get(id)
        .and_then(|p| p.canonical_answer())
        .expect("known problem")
        .to_string()
}

// ============================================================================
// HTTP
// ============================================================================

#[tokio::test]
async fn test_session_endpoint_returns_idle_snapshot() {
    let server = spawn_test_server(10).await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, format!("{}/session", server.base_url)).await;

    assert_eq!(status, 200);
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["level"], "medium");
    assert_eq!(body["answered"], 0);
    assert_eq!(body["complete"], false);
}

#[tokio::test]
async fn test_problem_answer_round_over_http() {
    let server = spawn_test_server(10).await;
    let client = reqwest::Client::new();

    let (status, body) = post(&client, format!("{}/problems/next", server.base_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "presented");
    let problem = body["problem"].clone();
    assert!(problem.get("answerKey").is_none());
    assert!(problem.get("answer_key").is_none());

    // A second problem cannot be requested while one is active.
    let (status, body) = post(&client, format!("{}/problems/next", server.base_url), json!({})).await;
    assert_eq!(status, 409);
    assert!(body["error"].as_str().is_some());

    let answer = answer_for(&server.bank, &problem);
    let (status, body) = post(
        &client,
        format!("{}/answers", server.base_url),
        json!({ "answer": answer }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["correct"], true);
    assert_eq!(body["problemId"], problem["id"]);
    assert_eq!(body["answered"], 1);
    assert_eq!(body["feedbackSource"], "fallback");

    let (status, metrics) = get(&client, format!("{}/metrics", server.base_url)).await;
    assert_eq!(status, 200);
    assert_eq!(metrics["attempts"], 1);
    assert_eq!(metrics["accuracy"], 100);
}

#[tokio::test]
async fn test_answer_without_problem_is_conflict() {
    let server = spawn_test_server(10).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{}/answers", server.base_url),
        json!({ "answer": "1/2" }),
    )
    .await;

    assert_eq!(status, 409);
    assert_eq!(body["error"], "no problem is active");
}

#[tokio::test]
async fn test_hints_then_plan_and_reset() {
    let server = spawn_test_server(10).await;
    let client = reqwest::Client::new();

    post(&client, format!("{}/problems/next", server.base_url), json!({})).await;

    let (status, first) = post(&client, format!("{}/hints", server.base_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(first["stage"], "static");
    assert_eq!(first["hints"].as_array().map(Vec::len), Some(1));

    let (_, second) = post(&client, format!("{}/hints", server.base_url), json!({})).await;
    assert_eq!(second["stage"], "dynamic");
    assert_eq!(second["source"], "fallback");

    let (status, plan) = post(&client, format!("{}/plan", server.base_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(plan["source"], "fallback");
    assert_eq!(plan["value"]["steps"].as_array().map(Vec::len), Some(5));

    let (_, before) = get(&client, format!("{}/session", server.base_url)).await;
    let (status, after) = post(&client, format!("{}/reset", server.base_url), json!({})).await;
    assert_eq!(status, 200);
    assert_ne!(after["sessionId"], before["sessionId"]);
    assert_eq!(after["phase"], "idle");
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let server = spawn_test_server(10).await;

    let mut ws = connect_client(&server.ws_url).await;
    let event = receive_event(&mut ws).await;

    assert_eq!(event["event"], "connected");
    assert_eq!(event["payload"]["snapshot"]["phase"], "idle");
    assert_eq!(event["payload"]["snapshot"]["answered"], 0);
}

#[tokio::test]
async fn test_events_follow_http_actions() {
    let server = spawn_test_server(10).await;
    let client = reqwest::Client::new();
    let mut ws = connect_client(&server.ws_url).await;
    assert_eq!(receive_event(&mut ws).await["event"], "connected");

    let (_, body) = post(&client, format!("{}/problems/next", server.base_url), json!({})).await;
    let problem = body["problem"].clone();

    let presented = receive_event(&mut ws).await;
    assert_eq!(presented["event"], "problem_presented");
    assert_eq!(presented["payload"]["number"], 1);
    assert_eq!(presented["payload"]["problem"]["id"], problem["id"]);

    post(
        &client,
        format!("{}/answers", server.base_url),
        json!({ "answer": "definitely wrong" }),
    )
    .await;

    let graded = receive_event(&mut ws).await;
    assert_eq!(graded["event"], "answer_graded");
    assert_eq!(graded["payload"]["problemId"], problem["id"]);
    assert_eq!(graded["payload"]["correct"], false);
    assert_eq!(graded["payload"]["answered"], 1);
}

#[tokio::test]
async fn test_level_change_and_completion_are_broadcast() {
    let server = spawn_test_server(2).await;
    let client = reqwest::Client::new();
    let mut ws = connect_client(&server.ws_url).await;
    receive_event(&mut ws).await;

    // Two correct answers at medium would move to hard, but the second one
    // ends a two-problem session, so no level change is broadcast.
    let mut events = Vec::new();
    for _ in 0..2 {
        let (_, body) = post(&client, format!("{}/problems/next", server.base_url), json!({})).await;
        let answer = answer_for(&server.bank, &body["problem"]);
        post(
            &client,
            format!("{}/answers", server.base_url),
            json!({ "answer": answer }),
        )
        .await;
    }
    loop {
        let event = receive_event(&mut ws).await;
        let name = event["event"].as_str().unwrap_or_default().to_string();
        events.push(name.clone());
        if name == "session_complete" {
            assert_eq!(event["payload"]["metrics"]["attempts"], 2);
            break;
        }
    }

    assert_eq!(
        events,
        vec![
            "problem_presented",
            "answer_graded",
            "problem_presented",
            "answer_graded",
            "session_complete",
        ]
    );

    let (status, body) = post(&client, format!("{}/problems/next", server.base_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "session_complete");
}

#[tokio::test]
async fn test_multiple_clients_receive_same_events() {
    let server = spawn_test_server(10).await;
    let client = reqwest::Client::new();
    let mut first = connect_client(&server.ws_url).await;
    let mut second = connect_client(&server.ws_url).await;
    receive_event(&mut first).await;
    receive_event(&mut second).await;

    post(&client, format!("{}/problems/next", server.base_url), json!({})).await;

    let a = receive_event(&mut first).await;
    let b = receive_event(&mut second).await;
    assert_eq!(a["event"], "problem_presented");
    assert_eq!(a, b);
}
