use factsum::{
    completion::{
        BackendReply, CompletionClient, CompletionOutcome, GeminiClient, StaticClient, Usage,
    },
    prompt::{build, Fact, Message, Role},
};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn failing_backend_yields_error_sentinel() {
    let client = StaticClient::failing("stub", "quota exceeded");
    let prompt = build("Q", &[Fact::new("X", "Y")]);

    let result = client.complete(prompt.messages(), 0.4).await;

    assert_eq!(result.in_tokens, 0);
    assert_eq!(result.out_tokens, 0);
    assert!(result.text().starts_with("error: "));
    assert_eq!(result.text(), "error: quota exceeded");
    assert!(result.latency_seconds >= 0.0);
}

#[tokio::test]
async fn empty_messages_short_circuit() {
    let client = StaticClient::text("stub", "never", 1, 1);

    let result = client.complete(&[], 0.4).await;

    assert_eq!(result.outcome, CompletionOutcome::NoMessages);
    assert_eq!(result.text(), "no messages");
    assert_eq!((result.in_tokens, result.out_tokens), (0, 0));
    assert_eq!(result.latency_seconds, 0.0);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn blank_text_is_blocked() {
    let client = StaticClient::reply(
        "stub",
        BackendReply {
            text: Some("   \n".into()),
            usage: Some(Usage {
                prompt_tokens: 12,
                candidates_tokens: 0,
            }),
        },
    );
    let result = client
        .complete(&[Message::new(Role::User, "hi")], 0.0)
        .await;
    assert_eq!(result.outcome, CompletionOutcome::Blocked);
    assert_eq!(result.text(), "blocked or empty");
    assert_eq!(result.in_tokens, 0);
}

#[tokio::test]
async fn missing_usage_counts_as_zero() {
    let client = StaticClient::reply(
        "stub",
        BackendReply {
            text: Some("  answer \n".into()),
            usage: None,
        },
    );
    let result = client
        .complete(&[Message::new(Role::User, "hi")], 0.0)
        .await;
    assert_eq!(result.outcome, CompletionOutcome::Text("answer".into()));
    assert_eq!((result.in_tokens, result.out_tokens), (0, 0));
}

#[tokio::test]
async fn only_last_message_is_sent() {
    let client = StaticClient::text("stub", "ok", 3, 4);
    let prompt = build("Q", &[Fact::new("X", "Y")]);

    let result = client.complete(prompt.messages(), 0.4).await;

    assert!(result.is_text());
    assert_eq!((result.in_tokens, result.out_tokens), (3, 4));
    assert_eq!(client.last_user_text(), Some(prompt.user().content.clone()));
}

fn gemini(server: &MockServer) -> GeminiClient {
    GeminiClient::builder("test-key", "gemini-test")
        .base_url(server.uri())
        .build()
        .unwrap()
}

#[tokio::test]
async fn gemini_success_reports_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
            "generationConfig": {"maxOutputTokens": 500}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": " Summary. "}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 42, "candidatesTokenCount": 7, "totalTokenCount": 49}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = [
        Message::new(Role::System, "ignored"),
        Message::new(Role::User, "hello"),
    ];
    let result = gemini(&server).complete(&messages, 0.4).await;

    assert_eq!(result.outcome, CompletionOutcome::Text("Summary.".into()));
    assert_eq!((result.in_tokens, result.out_tokens), (42, 7));
}

#[tokio::test]
async fn gemini_http_error_becomes_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"))
        .mount(&server)
        .await;

    let result = gemini(&server)
        .complete(&[Message::new(Role::User, "hello")], 0.4)
        .await;

    let text = result.text();
    assert!(text.starts_with("error: "), "{text}");
    assert!(text.contains("429"));
    assert!(text.contains("RESOURCE_EXHAUSTED"));
    assert_eq!((result.in_tokens, result.out_tokens), (0, 0));
}

#[tokio::test]
async fn gemini_safety_block_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"},
            "usageMetadata": {"promptTokenCount": 9}
        })))
        .mount(&server)
        .await;

    let result = gemini(&server)
        .complete(&[Message::new(Role::User, "hello")], 0.4)
        .await;

    assert_eq!(result.outcome, CompletionOutcome::Blocked);
    assert_eq!(result.in_tokens, 0);
}

#[tokio::test]
async fn gemini_unreachable_becomes_sentinel() {
    let client = GeminiClient::builder("k", "m")
        .base_url("http://127.0.0.1:9")
        .build()
        .unwrap();
    let result = client
        .complete(&[Message::new(Role::User, "hello")], 0.4)
        .await;
    assert!(result.text().starts_with("error: "));
}
