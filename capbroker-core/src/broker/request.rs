//! Request value objects

use super::capability::{CapabilityType, SafetyLevel, ToolCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Retry preferences carried on a request
///
/// The broker never retries on its own; the policy travels with the request
/// and is echoed in the execution metadata for the caller to act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_factor: 1.0,
        }
    }
}

/// Scheduling hint supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Request to run whichever registered tool best satisfies a set of capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRequest {
    /// Capability ids or names, in order of preference
    pub required_capabilities: Vec<String>,

    /// Parameters passed through to the tool
    #[serde(default = "empty_object")]
    pub parameters: Value,

    #[serde(default)]
    pub input_data_type: Option<String>,

    #[serde(default)]
    pub performance_requirements: HashMap<String, Value>,

    /// Deadline for the tool invocation, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    #[serde(default)]
    pub retry_policy: RetryPolicy,

    #[serde(default)]
    pub priority: RequestPriority,

    #[serde(default)]
    pub user_context: HashMap<String, Value>,

    /// Correlation id for logs, spans and history records
    #[serde(default = "generate_request_id")]
    pub request_id: String,

    /// Caller-driven cancellation
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ToolExecutionRequest {
    /// Create a request for the given capabilities with default settings
    pub fn new<I, S>(required_capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_capabilities: required_capabilities.into_iter().map(Into::into).collect(),
            parameters: empty_object(),
            input_data_type: None,
            performance_requirements: HashMap::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_policy: RetryPolicy::default(),
            priority: RequestPriority::Normal,
            user_context: HashMap::new(),
            request_id: generate_request_id(),
            cancellation: None,
        }
    }

    /// Set the parameters
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set the timeout from a duration
    pub fn with_timeout_duration(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs_f64();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_input_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.input_data_type = Some(data_type.into());
        self
    }

    pub fn with_performance_requirement(mut self, key: impl Into<String>, value: Value) -> Self {
        self.performance_requirements.insert(key.into(), value);
        self
    }

    /// Replace the user context
    pub fn with_user_context(mut self, context: HashMap<String, Value>) -> Self {
        self.user_context = context;
        self
    }

    /// Override the generated request id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Timeout as a duration. Negative or NaN timeouts expire immediately;
    /// timeouts too large to represent never expire.
    pub fn timeout_duration(&self) -> Duration {
        if self.timeout.is_nan() || self.timeout <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}

/// Filters for capability discovery; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRequirements {
    #[serde(default)]
    pub capability_types: Option<Vec<CapabilityType>>,

    #[serde(default)]
    pub categories: Option<Vec<ToolCategory>>,

    /// Most permissive level the caller accepts
    #[serde(default)]
    pub min_safety_level: Option<SafetyLevel>,

    #[serde(default)]
    pub user_context: HashMap<String, Value>,
}

impl DiscoveryRequirements {
    /// No filters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability_type(mut self, capability_type: CapabilityType) -> Self {
        self.capability_types
            .get_or_insert_with(Vec::new)
            .push(capability_type);
        self
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.categories.get_or_insert_with(Vec::new).push(category);
        self
    }

    pub fn with_min_safety_level(mut self, level: SafetyLevel) -> Self {
        self.min_safety_level = Some(level);
        self
    }

    pub fn with_user_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.user_context.insert(key.into(), value);
        self
    }

    /// Whether the category passes the filter
    pub fn matches_category(&self, category: ToolCategory) -> bool {
        self.categories
            .as_ref()
            .map(|categories| categories.contains(&category))
            .unwrap_or(true)
    }

    /// Whether the capability type passes the filter
    pub fn matches_type(&self, capability_type: CapabilityType) -> bool {
        self.capability_types
            .as_ref()
            .map(|types| types.contains(&capability_type))
            .unwrap_or(true)
    }
}
