use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use switchyard_protocol::wire::CallOperationResult;
use switchyard_protocol::{ProviderDescriptor, ProviderState};
use switchyard_providers::{
    CallError, ConnectionManager, DiscoveryOptions, ProviderRegistry, StdioConnector,
};
use tempfile::TempDir;

const DEMO: &str = env!("CARGO_BIN_EXE_switchyard-demo-provider");

fn demo(name: &str, extra: &[&str]) -> ProviderDescriptor {
    ProviderDescriptor::new(name, DEMO)
        .with_args(["--name", name])
        .with_args(extra.iter().copied())
}

fn manager_for(descriptors: Vec<ProviderDescriptor>) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(ProviderRegistry::from_descriptors(descriptors)),
        Arc::new(StdioConnector),
    )
}

fn text_of(value: serde_json::Value) -> String {
    serde_json::from_value::<CallOperationResult>(value)
        .expect("call result")
        .joined_text()
}

#[tokio::test]
async fn connects_and_calls_demo_operations() {
    let manager = manager_for(vec![demo("math", &[])]);
    let summary = manager.connect_all().await;
    assert_eq!(summary.succeeded, vec!["math".to_string()]);

    let mut names: Vec<String> = manager
        .all_operations()
        .into_iter()
        .map(|op| op.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["add", "echo", "listDirectory", "multiply"]);

    let sum = manager
        .call_operation("math", "add", json!({ "a": 4, "b": 5 }))
        .await
        .expect("add");
    assert_eq!(text_of(sum), "9");

    let echoed = manager
        .call_operation("math", "echo", json!({ "text": "hello" }))
        .await
        .expect("echo");
    assert_eq!(text_of(echoed), "hello");

    manager.shutdown().await;
    assert_eq!(manager.state("math"), Some(ProviderState::Discovered));
}

#[tokio::test]
async fn skips_log_lines_between_responses() {
    let manager = manager_for(vec![demo("noisy", &["--chatty"])]);
    assert_eq!(manager.connect(&demo("noisy", &["--chatty"])).await, true);
    let product = manager
        .call_operation("noisy", "multiply", json!({ "a": 6, "b": 7 }))
        .await
        .expect("multiply");
    assert_eq!(text_of(product), "42");
    manager.shutdown().await;
}

#[tokio::test]
async fn remote_failure_marks_only_that_provider_errored() {
    let manager = manager_for(vec![demo("bad", &["--fail-on", "add"]), demo("good", &[])]);
    manager.connect_all().await;

    let err = manager
        .call_operation("bad", "add", json!({ "a": 1, "b": 2 }))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::RemoteFailure { .. }));
    assert_eq!(manager.state("bad"), Some(ProviderState::Errored));
    assert_eq!(manager.state("good"), Some(ProviderState::Connected));

    let still_fine = manager
        .call_operation("good", "add", json!({ "a": 1, "b": 2 }))
        .await
        .expect("good add");
    assert_eq!(text_of(still_fine), "3");
    manager.shutdown().await;
}

#[tokio::test]
async fn missing_executable_is_recorded_not_raised() {
    let manager = manager_for(vec![ProviderDescriptor::new(
        "ghost",
        "/nonexistent/switchyard-provider",
    )]);
    let summary = manager.connect_all().await;
    assert_eq!(summary.failed, vec!["ghost".to_string()]);
    let info = manager.connections().pop().expect("connection");
    assert_eq!(info.state, ProviderState::Errored);
    assert_eq!(info.last_error.is_some(), true);
}

// Hardening: calls are bounded by the configured timeout.
#[tokio::test]
async fn slow_call_times_out_as_remote_failure() {
    let manager = manager_for(vec![demo("slow", &["--delay-ms", "2000"])])
        .with_call_timeout(Duration::from_millis(100));
    manager.connect_all().await;
    let err = manager
        .call_operation("slow", "echo", json!({ "text": "late" }))
        .await
        .unwrap_err();
    match err {
        CallError::RemoteFailure { message, .. } => assert!(message.contains("did not answer")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.state("slow"), Some(ProviderState::Errored));
}

#[tokio::test]
async fn discovers_providers_from_config_file() {
    let temp = TempDir::new().expect("tmp");
    fs::write(
        temp.path().join("mcp.json"),
        json!({
            "mcpServers": {
                "demo": { "command": DEMO, "args": ["--name", "demo"] },
                "skipped": { "command": DEMO, "disabled": true }
            }
        })
        .to_string(),
    )
    .expect("write");
    let registry = ProviderRegistry::new(DiscoveryOptions {
        include_user_paths: false,
        ..DiscoveryOptions::new(temp.path())
    });
    let manager = ConnectionManager::new(Arc::new(registry), Arc::new(StdioConnector));
    let summary = manager.connect_all().await;
    assert_eq!(summary.succeeded, vec!["demo".to_string()]);
    assert_eq!(
        manager.find_owner("listDirectory").map(|op| op.provider),
        Some("demo".to_string())
    );
    manager.shutdown().await;
}
