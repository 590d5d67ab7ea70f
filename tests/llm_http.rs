use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;
use structured_llm::http::HttpClient;
use structured_llm::llm::{
    GenerationRequest, GenerationService, LlmClient, ModelSettings, Provider, ReasoningEffort,
    StopReason, ToolDef,
};
use structured_llm::{Classifier, Error};

fn client(provider: Provider, server: &MockServer) -> LlmClient {
    LlmClient::new(
        provider,
        "test-key".into(),
        "test-model".into(),
        ModelSettings::default(),
        Some(server.base_url()),
    )
    .unwrap()
}

#[tokio::test]
async fn openai_classification_sends_json_schema() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains(r#""type":"json_schema""#)
                .body_contains(r#""enum":["positive","negative","neutral"]"#)
                .body_contains(r#""strict":true"#);
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {
                        "content": "{\"category\":\"positive\",\"reasoning\":\"Strong enthusiastic language\"}"
                    },
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 42, "completion_tokens": 12}
            }));
        })
        .await;

    let classifier = Classifier::new(client(Provider::OpenAi, &server));
    let result = classifier
        .classify(
            "This product is absolutely amazing!",
            ["positive", "negative", "neutral"],
            Some("sentiment"),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.category, "positive");
    assert_eq!(result.reasoning, "Strong enthusiastic language");
}

#[tokio::test]
async fn rate_limit_is_upstream_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).header("retry-after", "7").body("slow down");
        })
        .await;

    let err = Classifier::new(client(Provider::OpenAi, &server))
        .classify("text", ["a", "b"], None)
        .await
        .unwrap_err();
    assert!(err.is_upstream());
    match err {
        Error::RateLimit {
            retry_after_secs, ..
        } => assert_eq!(retry_after_secs, Some(7)),
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_upstream_with_status() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        })
        .await;

    let err = Classifier::new(client(Provider::OpenAi, &server))
        .classify("text", ["a", "b"], None)
        .await
        .unwrap_err();
    // No retries by default: exactly one attempt.
    mock.assert_hits_async(1).await;
    match err {
        Error::Api {
            status_code,
            message,
            ..
        } => {
            assert_eq!(status_code, Some(503));
            assert_eq!(message, "overloaded");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn refusal_is_schema_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {"content": null, "refusal": "I can't help with that."},
                    "finish_reason": "stop"
                }]
            }));
        })
        .await;

    let err = Classifier::new(client(Provider::OpenAi, &server))
        .classify("text", ["a", "b"], None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaValidation(_)));
    assert!(err.to_string().contains("refusal"));
}

#[tokio::test]
async fn anthropic_classification_forces_result_tool() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", "2023-06-01")
                .body_contains(r#""tool_choice":{"name":"classification_result","type":"tool"}"#)
                .body_contains(r#""enum":["joy","sadness","anger"]"#);
            then.status(200).json_body(json!({
                "content": [{
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "classification_result",
                    "input": {"category": "anger", "reasoning": "Cancelled flight without any notice"}
                }],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 50, "output_tokens": 20}
            }));
        })
        .await;

    let result = Classifier::new(client(Provider::Anthropic, &server))
        .classify(
            "I can't believe they cancelled my flight without notice!",
            ["joy", "sadness", "anger"],
            Some("emotion"),
        )
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(result.category, "anger");
}

#[tokio::test]
async fn anthropic_out_of_set_category_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/messages");
            then.status(200).json_body(json!({
                "content": [{
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "classification_result",
                    "input": {"category": "joyful", "reasoning": "Sounds like a happy message"}
                }],
                "stop_reason": "tool_use"
            }));
        })
        .await;

    let err = Classifier::new(client(Provider::Anthropic, &server))
        .classify("Hooray", ["joy", "sadness", "anger"], None)
        .await
        .unwrap_err();
    assert_eq!(err.violations()[0].field, "category");
}

#[tokio::test]
async fn settings_override_is_sent() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains(r#""temperature":0.5"#)
                .body_contains(r#""reasoning_effort":"high""#)
                .body_contains(r#""max_tokens":256"#);
            then.status(200).json_body(json!({
                "choices": [{"message": {"content": "Paris"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 1}
            }));
        })
        .await;

    let llm = client(Provider::OpenAi, &server);
    let request = GenerationRequest::new("", "What is the capital of France? Answer briefly.")
        .with_settings(ModelSettings {
            max_tokens: 256,
            temperature: Some(0.5),
            reasoning_effort: Some(ReasoningEffort::High),
        });
    let completion = llm.generate(&request).await.unwrap();
    mock.assert_async().await;
    assert_eq!(completion.text(), "Paris");
    assert_eq!(completion.usage.input_tokens, 10);
    assert_eq!(completion.usage.output_tokens, 1);
}

#[tokio::test]
async fn openai_tool_calls_are_parsed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains(r#""tools":[{"type":"function""#);
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "check_weather", "arguments": "{\"city\":\"Warsaw\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }));
        })
        .await;

    let llm = client(Provider::Ollama, &server);
    let mut request = GenerationRequest::new("", "What's the weather in Warsaw?");
    request.tools.push(ToolDef {
        name: "check_weather".into(),
        description: "Get the current weather for a city.".into(),
        input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    });
    let completion = llm.generate(&request).await.unwrap();
    assert_eq!(completion.stop_reason, StopReason::ToolUse);
    let calls: Vec<_> = completion.tool_calls().collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "call_1");
    assert_eq!(calls[0].1, "check_weather");
    assert_eq!(calls[0].2["city"], "Warsaw");
}

#[tokio::test]
async fn empty_choices_is_upstream_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        })
        .await;

    let err = Classifier::new(client(Provider::OpenAi, &server))
        .classify("text", ["a", "b"], None)
        .await
        .unwrap_err();
    assert!(err.is_upstream(), "{err:?}");
    assert!(err.to_string().contains("no choices"));
}

#[tokio::test]
async fn non_json_success_body_is_upstream_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/messages");
            then.status(200).body("<html>gateway hiccup</html>");
        })
        .await;

    let err = Classifier::new(client(Provider::Anthropic, &server))
        .classify("text", ["a", "b"], None)
        .await
        .unwrap_err();
    assert!(err.is_upstream(), "{err:?}");
    assert!(err.violations().is_empty());
}

fn retrying_client(max_retries: u32, timeout: Duration) -> HttpClient {
    HttpClient::new("test", timeout)
        .unwrap()
        .with_retries(max_retries)
        .with_base_delay(Duration::from_millis(10))
}

#[tokio::test]
async fn status_errors_are_never_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        })
        .await;

    let http = retrying_client(2, Duration::from_secs(5));
    let err = http
        .post_json_raw(&server.url("/chat/completions"), "{}", &[])
        .await
        .unwrap_err();
    mock.assert_hits_async(1).await;
    assert!(matches!(err, Error::Api { status_code: Some(503), .. }));
}

#[tokio::test]
async fn timeouts_are_retried_when_enabled() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .delay(Duration::from_millis(500))
                .body("{}");
        })
        .await;

    let http = retrying_client(1, Duration::from_millis(100));
    let err = http
        .post_json_raw(&server.url("/chat/completions"), "{}", &[])
        .await
        .unwrap_err();
    mock.assert_hits_async(2).await;
    assert!(err.is_upstream());
    assert!(err.to_string().contains("after 2 attempt(s)"), "{err}");
}

#[tokio::test]
async fn connect_failures_use_every_attempt() {
    let http = retrying_client(2, Duration::from_secs(5));
    let err = http
        .post_json_raw("http://127.0.0.1:1/chat/completions", "{}", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert!(err.to_string().contains("after 3 attempt(s)"), "{err}");

    let http = retrying_client(0, Duration::from_secs(5));
    let err = http
        .post_json_raw("http://127.0.0.1:1/chat/completions", "{}", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("after 1 attempt(s)"), "{err}");
}
