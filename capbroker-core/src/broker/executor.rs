//! Tool executor contract
//!
//! Concrete tools (knowledge-base search, log analysis, web search, ...) live
//! outside the broker. The broker only sees them through [`ToolExecutor`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Structured error reported by a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,

    /// Human-readable error message
    pub message: String,
}

impl ToolError {
    /// Create a new tool error
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Parameters were rejected by the tool
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message)
    }

    /// Transient failure in a downstream service
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transient, message)
    }

    /// Bug or unexpected state inside the tool
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message)
    }

    /// Execution exceeded its deadline
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            ToolErrorKind::Timeout,
            format!("Tool execution timed out after {:.1} seconds", timeout.as_secs_f64()),
        )
    }

    /// Execution was cancelled by the caller
    pub fn cancelled() -> Self {
        Self::new(ToolErrorKind::Cancelled, "Execution cancelled by caller")
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        ToolError::internal(err.to_string())
    }
}

/// Error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidInput,
    Transient,
    Internal,
    Timeout,
    Cancelled,
}

/// Contract every registered tool implements
///
/// The broker treats tools opaquely: it passes the request parameters through
/// and records whether the call succeeded and how long it took.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool
    async fn execute(&self, parameters: Value) -> Result<Value, ToolError>;

    /// JSON Schema describing accepted parameters
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
        })
    }
}

/// Type alias for shared executors
pub type SharedExecutor = Arc<dyn ToolExecutor>;

/// Adapter turning an async closure into a [`ToolExecutor`]
///
/// ```rust,ignore
/// let echo = FnExecutor::new(|params| async move { Ok::<_, ToolError>(params) });
/// ```
pub struct FnExecutor<F> {
    schema: Value,
    handler: F,
}

impl<F> FnExecutor<F> {
    /// Wrap a handler with an empty object schema
    pub fn new(handler: F) -> Self {
        Self {
            schema: serde_json::json!({ "type": "object", "properties": {} }),
            handler,
        }
    }

    /// Set the parameter schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        (self.handler)(parameters).await
    }

    fn schema(&self) -> Value {
        self.schema.clone()
    }
}
