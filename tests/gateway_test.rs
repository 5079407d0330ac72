mod helpers;

use std::sync::Arc;

use mockito::Matcher;
use parley::gateway::{GatewayError, Generator, ModelGateway, TRACE_NAME};
use parley::trace::{Level, MemorySink, TraceRecorder};
use serde_json::json;

async fn gateway(endpoint: &str) -> (ModelGateway, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let gateway =
        ModelGateway::new(&helpers::model_config(endpoint), TraceRecorder::new(sink.clone()))
            .unwrap();
    (gateway, sink)
}

#[tokio::test]
async fn success_returns_response_verbatim_and_traces_default_level() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3.2",
            "prompt": "hello",
            "stream": false
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"model":"llama3.2","response":"Hi there.\n","done":true}"#)
        .create_async()
        .await;

    let (gateway, sink) = gateway(&server.url()).await;
    let text = gateway.generate("hello", &["llama3.2"]).await.unwrap();

    assert_eq!(text, "Hi there.\n");
    mock.assert_async().await;

    let traces = sink.traces();
    assert_eq!(traces.len(), 1);
    let trace = &traces[0];
    assert_eq!(trace.name, TRACE_NAME);
    assert_eq!(trace.input, "hello");
    assert_eq!(trace.output.as_deref(), Some("Hi there.\n"));
    assert_eq!(trace.level, Level::Default);
    assert_eq!(trace.tags, vec!["llama3.2"]);
    assert_eq!(trace.model.as_deref(), Some("llama3.2"));
    assert!(trace.latency().unwrap() >= 0.0);
}

#[tokio::test]
async fn error_field_is_a_soft_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(404)
        .with_body(r#"{"error":"model 'llama3.2' not found"}"#)
        .create_async()
        .await;

    let (gateway, sink) = gateway(&server.url()).await;
    let text = gateway.generate("hello", &["personal"]).await.unwrap();

    assert_eq!(text, "[Ollama API Error] model 'llama3.2' not found");
    let traces = sink.traces();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].level, Level::Error);
    assert_eq!(
        traces[0].output.as_deref(),
        Some("model 'llama3.2' not found")
    );
    assert!(traces[0].status_message.is_some());
}

#[tokio::test]
async fn unexpected_shape_is_a_soft_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(r#"{"status":"loading"}"#)
        .create_async()
        .await;

    let (gateway, sink) = gateway(&server.url()).await;
    let text = gateway.generate("hello", &[]).await.unwrap();

    assert!(text.starts_with("[Ollama API Unexpected Response]"));
    assert!(text.contains("loading"));
    assert_eq!(sink.traces()[0].level, Level::Error);
}

#[tokio::test]
async fn non_json_body_is_fatal_but_still_traced() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let (gateway, sink) = gateway(&server.url()).await;
    let err = gateway.generate("hello", &[]).await.unwrap_err();

    assert!(matches!(err, GatewayError::Decode(_)));
    let traces = sink.traces();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].level, Level::Error);
}

#[tokio::test]
async fn connection_refused_is_fatal() {
    // Bind then drop a listener to get a port with nothing behind it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let (gateway, sink) = gateway(&format!("http://127.0.0.1:{port}")).await;
    let err = gateway.generate("hello", &[]).await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport(_)));
    assert_eq!(sink.traces().len(), 1);
    assert_eq!(sink.traces()[0].level, Level::Error);
}

#[tokio::test]
async fn each_call_produces_its_own_trace() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(r#"{"response":"ok"}"#)
        .expect(3)
        .create_async()
        .await;

    let (gateway, sink) = gateway(&format!("{}/", server.url())).await;
    for prompt in ["a", "b", "c"] {
        gateway.generate(prompt, &[]).await.unwrap();
    }

    let traces = sink.traces();
    assert_eq!(traces.len(), 3);
    let inputs: Vec<_> = traces.iter().map(|t| t.input.as_str()).collect();
    assert_eq!(inputs, ["a", "b", "c"]);
    assert_ne!(traces[0].id, traces[1].id);
}
