mod common;

use std::sync::Arc;

use common::{MockFactory, MockLlmProvider, test_config, write_call};
use futures::StreamExt;
use superdesign::llm::{GenerateOptions, LlmService, Usage};
use superdesign::{AgentError, ExecutionContext, LlmResponse, Message, ToolRegistry};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const REPLY: &str = "A calm onboarding flow with three steps and a progress bar.";

fn service(responses: Vec<LlmResponse>) -> LlmService {
    LlmService::with_factory(
        test_config(),
        Arc::new(MockFactory(MockLlmProvider::with_responses(responses))),
    )
    .expect("valid config")
}

#[tokio::test]
async fn test_stream_concatenation_matches_materialized_content() {
    let history = [Message::user("onboarding ideas")];

    let materialized = service(vec![LlmResponse::text(REPLY)])
        .generate_response(&history, GenerateOptions::default())
        .await
        .expect("generation succeeds");

    let streaming = service(vec![LlmResponse::text(REPLY)])
        .generate_streaming_response(&history, GenerateOptions::default())
        .expect("stream starts");
    let fragments: Vec<String> = streaming
        .stream
        .map(|f| f.expect("fragment"))
        .collect()
        .await;

    assert!(fragments.len() > 1);
    assert_eq!(fragments.concat(), materialized.content);
}

#[tokio::test]
async fn test_stream_executes_tools_between_steps() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let mut last = LlmResponse::text("Saved it.");
    last.usage = Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 4,
        total_tokens: 14,
    });
    let svc = service(vec![
        LlmResponse::with_tool_calls("Saving now. ", vec![write_call("w1", "flow.html", "<ol/>")]),
        last,
    ]);
    let tools = ToolRegistry::with_default_tools()
        .to_provider_format(&ExecutionContext::new(tmp_dir.path(), "stream"));

    let streaming = svc
        .generate_streaming_response(
            &[Message::user("save the flow")],
            GenerateOptions {
                tools: Some(tools),
                ..Default::default()
            },
        )
        .expect("stream starts");
    let usage = streaming.usage.clone();
    assert!(usage.get().is_none());

    let text: String = streaming
        .stream
        .map(|f| f.expect("fragment"))
        .collect::<Vec<_>>()
        .await
        .concat();

    assert_eq!(text, "Saving now. Saved it.");
    assert!(tmp_dir.path().join("flow.html").exists());
    assert!(usage.is_complete());
    assert_eq!(usage.get().map(|u| u.total_tokens), Some(14));
}

#[tokio::test]
async fn test_stream_surfaces_provider_errors() {
    let svc = LlmService::with_factory(
        test_config(),
        Arc::new(MockFactory(MockLlmProvider::failing("overloaded"))),
    )
    .unwrap();

    let mut stream = svc
        .generate_streaming_response(&[Message::user("x")], GenerateOptions::default())
        .unwrap()
        .stream;
    let first = stream.next().await.expect("one item");
    let err = first.unwrap_err();
    assert!(err.to_string().contains("overloaded"));
}

#[tokio::test]
async fn test_stream_stops_with_cancelled_between_chunks() {
    let token = CancellationToken::new();
    let mut stream = service(vec![LlmResponse::text(REPLY)])
        .generate_streaming_response(
            &[Message::user("onboarding ideas")],
            GenerateOptions {
                cancel: Some(token.clone()),
                ..Default::default()
            },
        )
        .expect("stream starts")
        .stream;

    let first = stream.next().await.expect("first fragment");
    assert_eq!(first.expect("fragment"), "A ");

    token.cancel();
    let next = stream.next().await.expect("cancellation item");
    assert!(matches!(next, Err(AgentError::Cancelled)));
    assert!(stream.next().await.is_none());
}
