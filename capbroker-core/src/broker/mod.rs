//! Capability-based tool broker
//!
//! Routes requests for abstract capabilities to the best registered tool.
//! Key features:
//! - Capability discovery filtered by health, safety level and category
//! - Health scoring from a success-rate EMA, recency and speed
//! - Keyword-based safety gate that halts risky requests for approval
//! - Bounded concurrency with timeout and cancellation enforcement
//!
//! # Example
//!
//! ```rust,no_run
//! use capbroker_core::broker::{
//!     Capability, CapabilityBroker, CapabilityType, FnExecutor, SafetyLevel, ToolCategory,
//!     ToolError, ToolExecutionRequest, ToolRegistration,
//! };
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! # async fn run() -> capbroker_core::error::Result<()> {
//! let broker = CapabilityBroker::builder()
//!     .tool(
//!         ToolRegistration::new("kb", ToolCategory::KnowledgeBase, SafetyLevel::Safe)
//!             .with_capability(Capability::new(
//!                 "kb_search",
//!                 CapabilityType::KnowledgeRetrieval,
//!                 "KB Search",
//!             )),
//!         Arc::new(FnExecutor::new(|params: Value| async move { Ok::<_, ToolError>(params) })),
//!     )
//!     .build()?;
//!
//! let request =
//!     ToolExecutionRequest::new(["kb_search"]).with_parameters(json!({ "query": "rust" }));
//! let result = broker.execute_tool_request(request).await;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

mod admission;
mod capability;
mod executor;
mod facade;
mod health;
mod monitor;
mod registry;
mod request;
mod result;
mod safety;
mod selector;

pub use admission::{AdmissionClosed, AdmissionController, AdmissionPermit};
pub use capability::{
    Capability, CapabilityType, SafetyLevel, ToolCategory, ToolRegistration,
    is_safety_level_compatible, normalize_capability_name,
};
pub use executor::{FnExecutor, SharedExecutor, ToolError, ToolErrorKind, ToolExecutor};
pub use facade::{CapabilityBroker, CapabilityBrokerBuilder};
pub use health::{ExecutionRecord, HealthTracker};
pub use monitor::{ExecutionMonitor, parameters_hash};
pub use registry::CapabilityRegistry;
pub use request::{
    DEFAULT_TIMEOUT_SECS, DiscoveryRequirements, RequestPriority, RetryPolicy, ToolExecutionRequest,
};
pub use result::{
    ApprovalRequest, CapabilityPerformance, ExecutionStatus, RegistryStatus, ShutdownReport,
    ToolExecutionResult, ToolStatus,
};
pub use safety::{SafetyAssessment, SafetyAssessor};
pub use selector::{CandidateStats, ToolSelector};
