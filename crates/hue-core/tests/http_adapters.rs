//! HTTP adapters against a local mock server.
//!
//! Covers the xAI chat transport (success, model fallback over the wire,
//! auth, rate limit, malformed body, timeout, refused connection, placeholder key) and the SerpAPI search
//! adapter (answer box, organic hits, service error).

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hue_core::{
    ChatMessage, ChatRequest, CompletionClient, CompletionTransport, ContextAugmenter, ErrorKind,
    SamplingParams, SearchBackend, SerpApiSearch, TransportError, ViolationLog, XaiChatTransport,
};

const KEY: &str = "xai-mock-key";

fn transport(server: &MockServer) -> XaiChatTransport {
    XaiChatTransport::with_base_url(&server.uri(), KEY, Duration::from_secs(5)).unwrap()
}

fn request(model: &str) -> ChatRequest {
    ChatRequest {
        model: model.into(),
        messages: vec![ChatMessage::user("Hello")],
        sampling: SamplingParams::default(),
    }
}

fn reply_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }]
    })
}

// ── xAI chat transport ─────────────────────────────────────────────────

#[tokio::test]
async fn chat_success_sends_bearer_and_sampling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer xai-mock-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "grok-3",
            "max_tokens": 2000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Hi there.")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(&server).send(&request("grok-3")).await.unwrap();
    assert_eq!(reply, "Hi there.");
}

#[tokio::test]
async fn client_falls_back_when_model_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "model": "grok-3" })))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error":"Model not found: grok-3"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "model": "grok-beta" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Fallback reply.")))
        .expect(1)
        .mount(&server)
        .await;

    let log = ViolationLog::new();
    let client = CompletionClient::new(
        Arc::new(transport(&server)),
        vec!["grok-3".into(), "grok-beta".into(), "grok-2".into()],
        log.clone(),
    );
    let reply = client.complete("hello", None).await.unwrap();
    assert_eq!(reply, "Fallback reply.");
    assert!(log.is_empty());
}

#[tokio::test]
async fn unauthorized_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Incorrect API key"))
        .mount(&server)
        .await;

    let err = transport(&server).send(&request("grok-3")).await.unwrap_err();
    assert!(matches!(err, TransportError::Unauthorized { status: 401, .. }));
}

#[tokio::test]
async fn rate_limit_stops_the_model_walk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .expect(1)
        .mount(&server)
        .await;

    let log = ViolationLog::new();
    let client = CompletionClient::new(
        Arc::new(transport(&server)),
        vec!["grok-3".into(), "grok-beta".into()],
        log.clone(),
    );
    let err = client.complete("hello", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RequestError(429));
    assert!(err.user_message().contains("Rate limit"));
    assert_eq!(log.len(), 1);
    assert!(log.snapshot()[0].message.starts_with("Completion failed:"));
}

#[tokio::test]
async fn server_error_is_a_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let err = transport(&server).send(&request("grok-3")).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            status: 500,
            body: "internal".into()
        }
    );
}

#[tokio::test]
async fn malformed_and_empty_bodies_are_invalid_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "model": "broken" })))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "model": "empty" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .mount(&server)
        .await;

    let t = transport(&server);
    assert!(matches!(
        t.send(&request("broken")).await,
        Err(TransportError::InvalidResponse { status: 200, .. })
    ));
    assert!(matches!(
        t.send(&request("empty")).await,
        Err(TransportError::InvalidResponse { status: 200, .. })
    ));
}

#[tokio::test]
async fn placeholder_key_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("nope")))
        .expect(0)
        .mount(&server)
        .await;

    let t = XaiChatTransport::with_base_url(
        &server.uri(),
        "your-grok-api-key-here",
        Duration::from_secs(5),
    )
    .unwrap();
    let client = CompletionClient::new(Arc::new(t), vec!["grok-3".into()], ViolationLog::new());
    let err = client.complete("hello", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthError);
    assert!(err.user_message().contains("GROK_API_KEY"));
}

#[tokio::test]
async fn slow_reply_hits_the_client_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(reply_body("too late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let t = XaiChatTransport::with_base_url(&server.uri(), KEY, Duration::from_millis(100)).unwrap();
    let err = t.send(&request("grok-3")).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)), "got {err:?}");

    let log = ViolationLog::new();
    let client = CompletionClient::new(Arc::new(t), vec!["grok-3".into()], log.clone());
    let err = client.complete("hello", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn refused_connection_is_a_connect_failure() {
    // Bind then release a port so nothing is listening on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let t = XaiChatTransport::with_base_url(
        &format!("http://127.0.0.1:{port}"),
        KEY,
        Duration::from_secs(2),
    )
    .unwrap();
    let err = t.send(&request("grok-3")).await.unwrap_err();
    assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");

    let client = CompletionClient::new(Arc::new(t), vec!["grok-3".into()], ViolationLog::new());
    let err = client.complete("hello", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionError);
}

// ── SerpAPI search ─────────────────────────────────────────────────────

#[tokio::test]
async fn serpapi_parses_answer_box_and_organic_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("engine", "google"))
        .and(query_param("q", "The moon landing was in 1969"))
        .and(query_param("num", "3"))
        .and(query_param("api_key", "serp-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "answer_box": { "answer": "July 20, 1969" },
            "organic_results": [
                { "title": "Apollo 11", "snippet": "First crewed landing." },
                { "title": "NASA", "snippet": "" },
                { "title": "History", "snippet": "Armstrong and Aldrin." }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let search = Arc::new(SerpApiSearch::with_base_url(
        &server.uri(),
        "serp-key",
        Duration::from_secs(5),
    )
    .unwrap());
    let augmenter = ContextAugmenter::new(search, ViolationLog::new());
    let context = augmenter
        .augment("The moon landing was in 1969. Tell me more")
        .await;
    assert_eq!(
        context.as_deref(),
        Some("Direct answer: July 20, 1969 | Apollo 11: First crewed landing. | History: Armstrong and Aldrin.")
    );
}

#[tokio::test]
async fn serpapi_error_field_becomes_search_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "error": "Invalid API key." })),
        )
        .mount(&server)
        .await;

    let search = SerpApiSearch::with_base_url(&server.uri(), "bad", Duration::from_secs(5)).unwrap();
    let err = search.search("anything", 3).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SearchUnavailable);
    assert_eq!(err.detail, "Invalid API key.");
}

#[tokio::test]
async fn serpapi_http_failure_degrades_to_no_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let log = ViolationLog::new();
    let search = Arc::new(SerpApiSearch::with_base_url(
        &server.uri(),
        "serp-key",
        Duration::from_secs(5),
    )
    .unwrap());
    let augmenter = ContextAugmenter::new(search, log.clone());
    assert!(augmenter.augment("what is the weather").await.is_none());
    assert_eq!(log.len(), 1);
    assert!(log.snapshot()[0].message.starts_with("Web search failed: SerpAPI error 503"));
}
