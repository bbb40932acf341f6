//! Capability broker facade
//!
//! Public entry point tying the registry, health tracker, safety gate,
//! admission controller, selector and execution monitor together.

use super::admission::AdmissionController;
use super::capability::{Capability, SafetyLevel, ToolRegistration};
use super::executor::SharedExecutor;
use super::health::HealthTracker;
use super::monitor::{ExecutionMonitor, panic_message};
use super::registry::CapabilityRegistry;
use super::request::{DiscoveryRequirements, ToolExecutionRequest};
use super::result::{
    CapabilityPerformance, ExecutionStatus, RegistryStatus, ShutdownReport, ToolExecutionResult,
    ToolStatus,
};
use super::safety::SafetyAssessor;
use super::selector::ToolSelector;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use futures::FutureExt;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Instrument;

const SHUTTING_DOWN: &str = "Broker is shutting down";

/// Routes capability requests to the best registered tool
///
/// All methods take `&self`; share the broker across tasks with an `Arc`.
pub struct CapabilityBroker {
    config: BrokerConfig,
    registry: CapabilityRegistry,
    tracker: HealthTracker,
    safety: SafetyAssessor,
    admission: AdmissionController,
    selector: ToolSelector,
    monitor: ExecutionMonitor,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for CapabilityBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityBroker")
            .field("registry", &self.registry)
            .field("in_flight", &self.admission.in_flight())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl CapabilityBroker {
    /// Create a broker with no tools
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            registry: CapabilityRegistry::new(),
            tracker: HealthTracker::new(config.health.clone(), config.history_capacity),
            safety: SafetyAssessor::new(&config.safety),
            admission: AdmissionController::new(config.max_concurrent_executions),
            selector: ToolSelector::new(config.selection.clone()),
            monitor: ExecutionMonitor::new(),
            shutting_down: AtomicBool::new(false),
            config,
        })
    }

    /// Start building a broker
    pub fn builder() -> CapabilityBrokerBuilder {
        CapabilityBrokerBuilder::new()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Read access to the registry
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Read access to health scores and histories
    pub fn health_tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    /// Pipeline runs currently holding an admission slot
    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register a tool with its executor
    ///
    /// The tool starts at the configured initial health and success rate.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DuplicateTool`] if the id is taken.
    pub fn register_tool(
        &self,
        mut registration: ToolRegistration,
        executor: SharedExecutor,
    ) -> Result<()> {
        let tool_id = registration.tool_id.clone();
        registration.success_rate = self.config.initial_success_rate;
        let capability_count = registration.capabilities.len();

        self.registry.register_tool(registration, executor)?;
        self.tracker.seed(&tool_id, self.config.initial_health)?;

        tracing::info!(tool_id = %tool_id, capabilities = capability_count, "Registered tool");
        Ok(())
    }

    /// Index a capability; returns `false` if the registry could not be updated
    pub fn register_capability(&self, capability: Capability) -> bool {
        match self.registry.register_capability(&capability) {
            Ok(()) => {
                tracing::info!(
                    capability_id = %capability.capability_id,
                    name = %capability.name,
                    "Registered capability"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    capability_id = %capability.capability_id,
                    error = %e,
                    "Failed to register capability"
                );
                false
            }
        }
    }

    /// Capabilities visible to a caller; empty on internal failure
    pub fn discover_capabilities(&self, requirements: &DiscoveryRequirements) -> Vec<Capability> {
        match self
            .registry
            .discover_capabilities(requirements, &self.tracker, &self.config.selection)
        {
            Ok(capabilities) => {
                tracing::debug!(count = capabilities.len(), "Discovered capabilities");
                capabilities
            }
            Err(e) => {
                tracing::error!(error = %e, "Capability discovery failed");
                Vec::new()
            }
        }
    }

    /// Risk of running a capability with the given parameters
    pub fn assess_capability_safety(&self, capability_id: &str, parameters: &Value) -> SafetyLevel {
        self.safety
            .assess_capability_safety(&self.registry, capability_id, parameters)
    }

    /// Performance of the tool owning a capability; zeroed when unknown or on failure
    pub fn get_capability_performance(&self, capability_id: &str) -> CapabilityPerformance {
        match self.capability_performance(capability_id) {
            Ok(performance) => performance,
            Err(e) => {
                tracing::error!(
                    capability_id = %capability_id,
                    error = %e,
                    "Failed to read capability performance"
                );
                CapabilityPerformance::default()
            }
        }
    }

    fn capability_performance(&self, capability_id: &str) -> Result<CapabilityPerformance> {
        let Some(tool_id) = self.registry.find_tool_for_capability(capability_id)? else {
            return Ok(CapabilityPerformance::default());
        };
        let Some(registration) = self.registry.registration(&tool_id)? else {
            return Ok(CapabilityPerformance::default());
        };

        Ok(CapabilityPerformance {
            success_rate: registration.success_rate,
            avg_execution_time: self.tracker.average_execution_time(&tool_id)?,
            health_score: self.tracker.health(&tool_id)?.unwrap_or(0.0),
            execution_count: registration.execution_count,
        })
    }

    /// Snapshot of every registered tool; empty on failure
    pub fn get_tool_registry_status(&self) -> RegistryStatus {
        match self.registry_status() {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read registry status");
                RegistryStatus::default()
            }
        }
    }

    fn registry_status(&self) -> Result<RegistryStatus> {
        let registrations = self.registry.registrations()?;
        let mut tools = BTreeMap::new();
        let mut healthy_tools = 0;

        for registration in registrations {
            let health_score = self.tracker.health(&registration.tool_id)?.unwrap_or(0.0);
            let healthy = health_score > self.config.selection.suitability_threshold;
            if healthy {
                healthy_tools += 1;
            }
            tools.insert(
                registration.tool_id.clone(),
                ToolStatus {
                    category: registration.category,
                    safety_level: registration.safety_level,
                    capabilities: registration
                        .capabilities
                        .iter()
                        .map(|c| c.capability_id.clone())
                        .collect(),
                    health_score,
                    success_rate: registration.success_rate,
                    execution_count: registration.execution_count,
                    last_used: registration.last_used,
                    healthy,
                },
            );
        }

        Ok(RegistryStatus {
            total_tools: tools.len(),
            healthy_tools,
            tools,
        })
    }

    /// Run a request through the full pipeline
    ///
    /// Always returns a result; every failure, including a panicking tool,
    /// becomes a status on the result.
    pub async fn execute_tool_request(&self, request: ToolExecutionRequest) -> ToolExecutionResult {
        let span = tracing::info_span!(
            "capability_broker.execute",
            request_id = %request.request_id,
            capabilities = ?request.required_capabilities,
        );

        async move {
            let request_id = request.request_id.clone();
            match AssertUnwindSafe(self.run_pipeline(request)).catch_unwind().await {
                Ok(result) => {
                    tracing::debug!(status = %result.status, "Pipeline finished");
                    result
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(error = %message, "Pipeline panicked");
                    ToolExecutionResult::failed(format!("Unexpected error: {}", message))
                        .with_metadata("request_id", json!(request_id))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(&self, request: ToolExecutionRequest) -> ToolExecutionResult {
        if self.is_shutting_down() {
            return ToolExecutionResult::failed(SHUTTING_DOWN);
        }

        let _permit = match self.admission.acquire().await {
            Ok(permit) => permit,
            Err(_) => return ToolExecutionResult::failed(SHUTTING_DOWN),
        };

        match self.execute_admitted(&request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Pipeline error");
                ToolExecutionResult::failed(format!("Pipeline error: {}", e))
                    .with_metadata("request_id", json!(request.request_id))
            }
        }
    }

    async fn execute_admitted(
        &self,
        request: &ToolExecutionRequest,
    ) -> Result<ToolExecutionResult> {
        let candidates = self
            .selector
            .find_suitable_tools(&self.registry, &self.tracker, request)?;

        if candidates.is_empty() {
            tracing::warn!("No suitable tools found");
            return Ok(ToolExecutionResult::failed(format!(
                "No suitable tools found for capabilities: {}",
                request.required_capabilities.join(", ")
            ))
            .with_metadata("request_id", json!(request.request_id)));
        }
        tracing::debug!(candidates = ?candidates, "Found suitable tools");

        if self.config.enable_safety_checks {
            let assessment = self
                .safety
                .assess_execution_safety(&self.registry, request, &candidates)?;

            if let (true, Some(approval)) =
                (assessment.requires_approval, assessment.approval_request)
            {
                let recommended = self
                    .selector
                    .recommend(&self.registry, &self.tracker, &candidates)?;
                tracing::warn!(
                    approval_id = %approval.approval_id,
                    risk_level = %assessment.risk_level,
                    "Request requires approval"
                );
                return Ok(ToolExecutionResult::requires_approval(approval, recommended)
                    .with_metadata("request_id", json!(request.request_id))
                    .with_metadata("risk_level", json!(assessment.risk_level)));
            }
        }

        let tool_id = self
            .selector
            .select_optimal_tool(&self.registry, &self.tracker, &candidates)?
            .ok_or_else(|| BrokerError::Other("No tool selected from candidates".to_string()))?;

        let executor = self
            .registry
            .executor(&tool_id)?
            .ok_or_else(|| BrokerError::Other(format!("Tool '{}' has no executor", tool_id)))?;

        let mut result = self.monitor.execute(&tool_id, executor.as_ref(), request).await;

        if result.status != ExecutionStatus::Cancelled {
            if let Some(health) =
                self.tracker
                    .update_tool_metrics(&self.registry, &tool_id, &result, request)?
            {
                result = result.with_metric("health_score", health);
            }
        }

        Ok(result)
    }

    /// Run a single capability and return the tool's output
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownCapability`] if no tool owns the id, and
    /// [`BrokerError::ExecutionFailed`] if the run ends without success.
    pub async fn execute_capability(
        &self,
        capability_id: &str,
        parameters: Value,
        context: HashMap<String, Value>,
    ) -> Result<Value> {
        if self.registry.find_tool_for_capability(capability_id)?.is_none() {
            return Err(BrokerError::UnknownCapability(capability_id.to_string()));
        }

        let request = ToolExecutionRequest::new([capability_id])
            .with_parameters(parameters)
            .with_user_context(context)
            .with_timeout_duration(self.config.default_timeout);

        let result = self.execute_tool_request(request).await;
        match result.status {
            ExecutionStatus::Success => Ok(result.result_data.unwrap_or(Value::Null)),
            status => Err(BrokerError::ExecutionFailed {
                status,
                message: result.error_message.unwrap_or_default(),
            }),
        }
    }

    /// Stop accepting requests and wait for in-flight runs to finish
    ///
    /// Requests arriving after this call, and requests still queued for an
    /// admission slot, fail immediately. Idempotent.
    pub async fn shutdown(&self) -> ShutdownReport {
        let in_flight_at_start = self.admission.in_flight();
        let first = !self.shutting_down.swap(true, Ordering::SeqCst);
        if first {
            tracing::info!(in_flight = in_flight_at_start, "Shutting down capability broker");
        }

        let drained = self.admission.drain(self.config.shutdown_timeout).await;

        if drained {
            tracing::info!("Capability broker shut down cleanly");
        } else {
            tracing::warn!(
                still_running = self.admission.in_flight(),
                "Shutdown timed out with executions in flight"
            );
        }

        ShutdownReport {
            in_flight_at_start,
            drained,
        }
    }
}

/// Builder for [`CapabilityBroker`]
#[derive(Default)]
pub struct CapabilityBrokerBuilder {
    config: Option<BrokerConfig>,
    tools: Vec<(ToolRegistration, SharedExecutor)>,
    capabilities: Vec<Capability>,
}

impl CapabilityBrokerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (defaults to [`BrokerConfig::default`])
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a tool at build time
    pub fn tool(mut self, registration: ToolRegistration, executor: SharedExecutor) -> Self {
        self.tools.push((registration, executor));
        self
    }

    /// Index an extra capability at build time
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Build the broker
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or a duplicate tool id.
    pub fn build(self) -> Result<CapabilityBroker> {
        let broker = CapabilityBroker::new(self.config.unwrap_or_default())?;

        for (registration, executor) in self.tools {
            broker.register_tool(registration, executor)?;
        }
        for capability in &self.capabilities {
            broker.registry.register_capability(capability)?;
        }

        tracing::info!(
            tools = broker.registry.len()?,
            max_concurrent = broker.config.max_concurrent_executions,
            "Capability broker ready"
        );
        Ok(broker)
    }
}
