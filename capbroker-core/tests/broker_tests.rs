//! End-to-end tests for the capability broker
//!
//! These drive the public API the way an embedding host would: load a config
//! file, register a handful of tools, and push requests through the pipeline.

use async_trait::async_trait;
use capbroker_core::prelude::*;
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct KnowledgeBase;

#[async_trait]
impl ToolExecutor for KnowledgeBase {
    async fn execute(&self, parameters: Value) -> std::result::Result<Value, ToolError> {
        let query = parameters
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::invalid_input("query is required"))?;
        Ok(json!({ "documents": [format!("doc about {}", query)] }))
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }
}

/// Fails every call and counts attempts
#[derive(Default)]
struct FlakySearch {
    attempts: AtomicUsize,
}

#[async_trait]
impl ToolExecutor for FlakySearch {
    async fn execute(&self, _parameters: Value) -> std::result::Result<Value, ToolError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::transient("search backend returned 503"))
    }
}

struct StableSearch;

#[async_trait]
impl ToolExecutor for StableSearch {
    async fn execute(&self, parameters: Value) -> std::result::Result<Value, ToolError> {
        Ok(json!({ "results": ["https://www.rust-lang.org"], "query": parameters["query"] }))
    }
}

fn kb_registration() -> ToolRegistration {
    ToolRegistration::new("kb", ToolCategory::KnowledgeBase, SafetyLevel::Safe)
        .with_capability(
            Capability::new("kb_search", CapabilityType::KnowledgeRetrieval, "Knowledge Search")
                .with_description("Search internal documentation"),
        )
        .with_profile("avg_latency_ms", json!(40))
}

fn search_registration(tool_id: &str) -> ToolRegistration {
    ToolRegistration::new(tool_id, ToolCategory::Search, SafetyLevel::Safe)
        .with_capability(Capability::new("web_search", CapabilityType::WebSearch, "Web Search"))
}

fn shell_registration() -> ToolRegistration {
    ToolRegistration::new("shell", ToolCategory::System, SafetyLevel::Dangerous).with_capability(
        Capability::new("run_command", CapabilityType::SystemOperation, "Run Command")
            .with_safety_level(SafetyLevel::Dangerous),
    )
}

fn echo() -> SharedExecutor {
    Arc::new(FnExecutor::new(|params: Value| async move {
        Ok::<_, ToolError>(params)
    }))
}

#[tokio::test]
async fn test_broker_from_config_file() {
    let _ = init_tracing("capbroker_core=debug");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
max_concurrent_executions = 4
default_timeout = "2s"

[safety]
gate_dangerous = true
"#
    )
    .unwrap();
    let config = BrokerConfig::from_file(file.path()).unwrap();

    let broker = CapabilityBroker::builder()
        .config(config)
        .tool(kb_registration(), Arc::new(KnowledgeBase))
        .tool(shell_registration(), echo())
        .build()
        .unwrap();

    assert_eq!(broker.config().max_concurrent_executions, 4);

    let output = broker
        .execute_capability("kb_search", json!({ "query": "tokio" }), Default::default())
        .await
        .unwrap();
    assert_eq!(output, json!({ "documents": ["doc about tokio"] }));

    // With gate_dangerous the shell tool is held for approval
    let request =
        ToolExecutionRequest::new(["run_command"]).with_parameters(json!({ "cmd": "ls" }));
    let result = broker.execute_tool_request(request).await;
    assert_eq!(result.status, ExecutionStatus::RequiresApproval);
    assert_eq!(
        result.approval_request.as_ref().map(|a| a.risk_level),
        Some(SafetyLevel::Dangerous)
    );
}

#[tokio::test]
async fn test_invalid_input_is_reported() {
    let broker = CapabilityBroker::builder()
        .tool(kb_registration(), Arc::new(KnowledgeBase))
        .build()
        .unwrap();

    let err = broker
        .execute_capability("kb_search", json!({}), Default::default())
        .await
        .unwrap_err();

    match err {
        BrokerError::ExecutionFailed { status, message } => {
            assert_eq!(status, ExecutionStatus::Failed);
            assert_eq!(message, "query is required");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failover_to_healthier_tool() {
    let flaky = Arc::new(FlakySearch::default());
    let broker = CapabilityBroker::builder()
        .tool(search_registration("flaky"), flaky.clone())
        .tool(search_registration("stable"), Arc::new(StableSearch))
        .build()
        .unwrap();

    let request =
        || ToolExecutionRequest::new(["web_search"]).with_parameters(json!({ "query": "rust" }));

    let first = broker.execute_tool_request(request()).await;
    assert_eq!(first.status, ExecutionStatus::Failed);
    assert_eq!(first.tool_used.as_deref(), Some("flaky"));

    for _ in 0..5 {
        let result = broker.execute_tool_request(request()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.tool_used.as_deref(), Some("stable"));
    }
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);

    let status = broker.get_tool_registry_status();
    assert_eq!(status.tools["flaky"].execution_count, 1);
    assert_eq!(status.tools["stable"].execution_count, 5);
    assert!(status.tools["flaky"].success_rate < status.tools["stable"].success_rate);
}

#[tokio::test]
async fn test_repeated_failures_remove_tool_from_rotation() {
    let flaky = Arc::new(FlakySearch::default());
    let broker = CapabilityBroker::builder()
        .tool(search_registration("flaky"), flaky.clone())
        .build()
        .unwrap();

    // Success rate decays as 0.9^n; health drops to the suitability threshold
    // once 0.6 * 0.9^n + 0.4 <= 0.5, i.e. after 18 failures.
    for _ in 0..18 {
        let result = broker
            .execute_tool_request(ToolExecutionRequest::new(["web_search"]))
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
    }

    let result = broker
        .execute_tool_request(ToolExecutionRequest::new(["web_search"]))
        .await;
    assert_eq!(
        result.error_message.as_deref(),
        Some("No suitable tools found for capabilities: web_search")
    );
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 18);

    // Still discoverable, but flagged disabled
    let discovered = broker.discover_capabilities(&DiscoveryRequirements::default());
    assert_eq!(discovered.len(), 1);
    assert!(!discovered[0].enabled);

    let performance = broker.get_capability_performance("web_search");
    assert_eq!(performance.execution_count, 18);
    assert!(performance.health_score <= 0.5);
}

#[tokio::test]
async fn test_discovery_by_category_and_safety() {
    let broker = CapabilityBroker::builder()
        .tool(kb_registration(), Arc::new(KnowledgeBase))
        .tool(search_registration("search"), Arc::new(StableSearch))
        .tool(shell_registration(), echo())
        .build()
        .unwrap();

    let all = broker.discover_capabilities(&DiscoveryRequirements::new());
    assert_eq!(all.len(), 3);

    let safe_only = DiscoveryRequirements::new().with_min_safety_level(SafetyLevel::Safe);
    let safe = broker.discover_capabilities(&safe_only);
    let ids: Vec<_> = safe.iter().map(|c| c.capability_id.as_str()).collect();
    assert_eq!(ids, vec!["kb_search", "web_search"]);

    let knowledge = broker.discover_capabilities(
        &DiscoveryRequirements::new()
            .with_category(ToolCategory::KnowledgeBase)
            .with_capability_type(CapabilityType::KnowledgeRetrieval),
    );
    assert_eq!(knowledge.len(), 1);
    assert_eq!(knowledge[0].description, "Search internal documentation");
    assert_eq!(knowledge[0].performance_metrics["health_score"], 1.0);
}

#[tokio::test]
async fn test_approval_offers_recommendations() {
    let broker = CapabilityBroker::builder()
        .tool(search_registration("a"), Arc::new(StableSearch))
        .tool(search_registration("b"), Arc::new(StableSearch))
        .tool(search_registration("c"), Arc::new(StableSearch))
        .tool(search_registration("d"), Arc::new(StableSearch))
        .build()
        .unwrap();

    let request = ToolExecutionRequest::new(["web_search"])
        .with_parameters(json!({ "query": "remove tracking cookies" }))
        .with_priority(RequestPriority::High);
    let result = broker.execute_tool_request(request).await;

    assert_eq!(result.status, ExecutionStatus::RequiresApproval);
    assert_eq!(result.recommended_tools.len(), 3);
    assert_eq!(
        result.approval_request.unwrap().candidate_tools,
        vec!["a", "b", "c", "d"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_graceful_shutdown_under_load() {
    let slow: SharedExecutor = Arc::new(FnExecutor::new(|params: Value| async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok::<_, ToolError>(params)
    }));
    let broker = Arc::new(
        CapabilityBroker::builder()
            .config(BrokerConfig::default().with_max_concurrent_executions(2))
            .tool(search_registration("slow"), slow)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .execute_tool_request(ToolExecutionRequest::new(["web_search"]))
                    .await
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = broker.shutdown().await;
    assert_eq!(report.in_flight_at_start, 2);
    assert!(report.drained);

    let mut succeeded = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap().status {
            ExecutionStatus::Success => succeeded += 1,
            ExecutionStatus::Failed => refused += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(succeeded, 2);
    assert_eq!(refused, 2);
}
