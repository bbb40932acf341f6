//! Guarded tool invocation
//!
//! Runs the selected executor under the request's deadline and cancellation
//! token, measures wall time, and wraps the outcome in a
//! [`ToolExecutionResult`] carrying provenance metadata.

use super::executor::{ToolError, ToolErrorKind, ToolExecutor};
use super::request::ToolExecutionRequest;
use super::result::ToolExecutionResult;
use futures::FutureExt;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::time::{Instant, timeout};

/// Executes tools with timeout and cancellation enforcement
#[derive(Debug, Clone, Default)]
pub struct ExecutionMonitor;

/// First 16 hex chars of the SHA-256 of the serialized parameters
pub fn parameters_hash(parameters: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parameters.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl ExecutionMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Run `executor` for `request`
    ///
    /// Never fails: tool errors, panics, the deadline and cancellation all map
    /// to a result status. A panicking tool is reported as an internal error.
    /// `execution_time` (seconds) is always recorded.
    pub async fn execute(
        &self,
        tool_id: &str,
        executor: &dyn ToolExecutor,
        request: &ToolExecutionRequest,
    ) -> ToolExecutionResult {
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let params_hash = parameters_hash(&request.parameters);

        let outcome = if request.is_cancelled() {
            Err(ToolError::new(ToolErrorKind::Cancelled, "Cancelled before execution"))
        } else {
            let deadline = request.timeout_duration();
            let execution = AssertUnwindSafe(executor.execute(request.parameters.clone()))
                .catch_unwind()
                .map(|caught| match caught {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(ToolError::internal(format!(
                        "Tool panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                });

            match request.cancellation {
                Some(ref cancel_token) => {
                    tokio::select! {
                        _ = cancel_token.cancelled() => Err(ToolError::cancelled()),
                        res = timeout(deadline, execution) => match res {
                            Ok(outcome) => outcome,
                            Err(_) => Err(ToolError::timeout(deadline)),
                        },
                    }
                }
                None => match timeout(deadline, execution).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ToolError::timeout(deadline)),
                },
            }
        };

        let elapsed = start.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(value) => {
                tracing::info!(
                    tool_id = %tool_id,
                    execution_time = elapsed,
                    "Tool execution succeeded"
                );
                ToolExecutionResult::success(tool_id, value)
            }
            Err(error) => match error.kind {
                ToolErrorKind::Timeout => {
                    tracing::warn!(
                        tool_id = %tool_id,
                        timeout = request.timeout,
                        "Tool execution timed out"
                    );
                    ToolExecutionResult::timeout(tool_id, request.timeout)
                }
                ToolErrorKind::Cancelled => {
                    tracing::info!(tool_id = %tool_id, "Tool execution cancelled");
                    ToolExecutionResult::cancelled(error.message).with_tool(tool_id)
                }
                kind => {
                    tracing::warn!(
                        tool_id = %tool_id,
                        kind = ?kind,
                        error = %error.message,
                        "Tool execution failed"
                    );
                    ToolExecutionResult::failed(error.message)
                        .with_tool(tool_id)
                        .with_metadata("error_kind", json!(kind))
                }
            },
        };

        result
            .with_metric("execution_time", elapsed)
            .with_metadata("tool_id", json!(tool_id))
            .with_metadata("request_id", json!(request.request_id))
            .with_metadata("started_at", json!(started_at.to_rfc3339()))
            .with_metadata("parameters_hash", json!(params_hash))
            .with_metadata("priority", json!(request.priority))
            .with_metadata("retry_policy", json!(request.retry_policy))
    }
}
