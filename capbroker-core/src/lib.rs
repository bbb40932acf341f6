//! # Capability Broker
//!
//! Routes requests for abstract capabilities ("web search", "log analysis")
//! to the best concrete tool registered for them, with:
//! - Capability discovery filtered by health, safety level and category
//! - Health scoring from observed success rate, recency and speed
//! - A safety gate that halts risky requests for human approval
//! - Bounded concurrency with timeout and cancellation enforcement
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use capbroker_core::prelude::*;
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let broker = CapabilityBroker::builder()
//!         .config(BrokerConfig::load()?)
//!         .tool(
//!             ToolRegistration::new("ddg", ToolCategory::Search, SafetyLevel::Safe)
//!                 .with_capability(Capability::new(
//!                     "web_search",
//!                     CapabilityType::WebSearch,
//!                     "Web Search",
//!                 )),
//!             Arc::new(FnExecutor::new(|params: Value| async move {
//!                 Ok::<_, ToolError>(json!({ "results": [], "query": params["query"] }))
//!             })),
//!         )
//!         .build()?;
//!
//!     let output = broker
//!         .execute_capability("web_search", json!({ "query": "rust" }), Default::default())
//!         .await?;
//!     println!("{}", output);
//!
//!     broker.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`config::BrokerConfig::load`] layers defaults, `capbroker.toml`, the file
//! named by `CAPBROKER_CONFIG_PATH`, and `CAPBROKER_*` environment variables.

pub mod broker;
pub mod config;
pub mod error;
pub mod telemetry;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broker::{
        ApprovalRequest, Capability, CapabilityBroker, CapabilityBrokerBuilder,
        CapabilityPerformance, CapabilityType, DiscoveryRequirements, ExecutionStatus, FnExecutor,
        RegistryStatus, RequestPriority, RetryPolicy, SafetyLevel, SharedExecutor, ShutdownReport,
        ToolCategory, ToolError, ToolErrorKind, ToolExecutionRequest, ToolExecutionResult,
        ToolExecutor, ToolRegistration,
    };
    pub use crate::config::{BrokerConfig, HealthWeights, SafetyConfig, SelectionConfig};
    pub use crate::error::{BrokerError, Result};
    pub use crate::telemetry::init_tracing;
}
