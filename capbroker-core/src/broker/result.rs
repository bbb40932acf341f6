//! Result envelope and read-only snapshots returned by the broker

use super::capability::{SafetyLevel, ToolCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Terminal state of one `execute_tool_request` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Not yet resolved
    Pending,
    Success,
    Failed,
    Timeout,
    /// Stopped by the caller's cancellation token
    Cancelled,
    /// Halted by the safety gate; nothing was executed
    RequiresApproval,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Timeout => "TIMEOUT",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::RequiresApproval => "REQUIRES_APPROVAL",
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Details a human needs to approve a gated request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Correlation id for the approval conversation
    pub approval_id: String,

    /// Request that tripped the gate
    pub request_id: String,

    pub reason: String,

    pub risk_level: SafetyLevel,

    /// Tools that could have served the request
    pub candidate_tools: Vec<String>,

    /// Raw request parameters
    pub parameters: Value,

    pub requested_at: DateTime<Utc>,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub status: ExecutionStatus,

    /// Tool that ran, if one was selected
    pub tool_used: Option<String>,

    /// Value returned by the tool
    pub result_data: Option<Value>,

    pub execution_metadata: HashMap<String, Value>,

    pub performance_metrics: HashMap<String, f64>,

    pub error_message: Option<String>,

    /// Present only when status is REQUIRES_APPROVAL
    pub approval_request: Option<ApprovalRequest>,

    /// Alternatives offered alongside an approval request
    pub recommended_tools: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

impl ToolExecutionResult {
    fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status,
            tool_used: None,
            result_data: None,
            execution_metadata: HashMap::new(),
            performance_metrics: HashMap::new(),
            error_message: None,
            approval_request: None,
            recommended_tools: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Successful execution
    pub fn success(tool_id: impl Into<String>, data: Value) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Success);
        result.tool_used = Some(tool_id.into());
        result.result_data = Some(data);
        result
    }

    /// Failed run
    pub fn failed(message: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Failed);
        result.error_message = Some(message.into());
        result
    }

    /// Tool exceeded its deadline
    pub fn timeout(tool_id: impl Into<String>, timeout_secs: f64) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Timeout);
        result.tool_used = Some(tool_id.into());
        result.error_message = Some(format!(
            "Tool execution timed out after {} seconds",
            timeout_secs
        ));
        result
    }

    /// Caller cancelled the run
    pub fn cancelled(message: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Cancelled);
        result.error_message = Some(message.into());
        result
    }

    /// Safety gate halted the run
    pub fn requires_approval(approval: ApprovalRequest, recommended_tools: Vec<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::RequiresApproval);
        result.error_message = Some(approval.reason.clone());
        result.approval_request = Some(approval);
        result.recommended_tools = recommended_tools;
        result
    }

    /// Record the tool that was involved
    pub fn with_tool(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_used = Some(tool_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.execution_metadata.insert(key.into(), value);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.performance_metrics.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Seconds the tool ran, when an execution happened
    pub fn execution_time(&self) -> Option<f64> {
        self.performance_metrics.get("execution_time").copied()
    }
}

/// Aggregate performance of the tool owning a capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityPerformance {
    pub success_rate: f64,

    /// Mean over the retained history, in seconds
    pub avg_execution_time: f64,

    pub health_score: f64,

    pub execution_count: u64,
}

/// Per-tool entry of the registry status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub category: ToolCategory,
    pub safety_level: SafetyLevel,
    pub capabilities: Vec<String>,
    pub health_score: f64,
    pub success_rate: f64,
    pub execution_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub healthy: bool,
}

/// Snapshot of every registered tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub total_tools: usize,

    /// Tools above the suitability threshold
    pub healthy_tools: usize,

    pub tools: BTreeMap<String, ToolStatus>,
}

/// Outcome of a graceful shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Executions running when shutdown started
    pub in_flight_at_start: usize,

    /// Whether every execution finished before the drain timeout
    pub drained: bool,
}
