//! Safety gate
//!
//! Risk is the riskier of a tool's declared level and a heuristic read of the
//! request parameters. The heuristic flags any parameter text containing a
//! risky keyword as REQUIRES_CONFIRMATION; it never yields DANGEROUS on its own.
//!
//! Lookups that cannot complete are treated as DANGEROUS.

use super::capability::SafetyLevel;
use super::registry::CapabilityRegistry;
use super::request::ToolExecutionRequest;
use super::result::ApprovalRequest;
use crate::config::SafetyConfig;
use crate::error::Result;
use chrono::Utc;
use serde_json::Value;

/// Outcome of the safety gate for one request
#[derive(Debug, Clone)]
pub struct SafetyAssessment {
    /// Execution must stop and wait for a human
    pub requires_approval: bool,

    /// Combined risk across the candidate tools and parameters
    pub risk_level: SafetyLevel,

    /// Present when `requires_approval` is set
    pub approval_request: Option<ApprovalRequest>,
}

/// Keyword heuristics plus declared tool levels
#[derive(Debug, Clone)]
pub struct SafetyAssessor {
    /// Lowercased patterns
    patterns: Vec<String>,
    gate_dangerous: bool,
}

impl SafetyAssessor {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            patterns: config
                .risky_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            gate_dangerous: config.gate_dangerous,
        }
    }

    /// Risk implied by the parameter text alone
    pub fn assess_parameter_risk(&self, parameters: &Value) -> SafetyLevel {
        let text = parameters.to_string().to_lowercase();
        match self.patterns.iter().find(|p| text.contains(p.as_str())) {
            Some(pattern) => {
                tracing::debug!(pattern = %pattern, "Risky pattern found in parameters");
                SafetyLevel::RequiresConfirmation
            }
            None => SafetyLevel::Safe,
        }
    }

    /// Risk of running a capability with the given parameters
    ///
    /// Unknown capabilities and failed lookups assess as DANGEROUS.
    pub fn assess_capability_safety(
        &self,
        registry: &CapabilityRegistry,
        capability_id: &str,
        parameters: &Value,
    ) -> SafetyLevel {
        let declared = match self.declared_level(registry, capability_id) {
            Ok(Some(level)) => level,
            Ok(None) => {
                tracing::warn!(
                    capability_id = %capability_id,
                    "No tool owns capability, assessing as dangerous"
                );
                return SafetyLevel::Dangerous;
            }
            Err(e) => {
                tracing::error!(
                    capability_id = %capability_id,
                    error = %e,
                    "Safety assessment failed"
                );
                return SafetyLevel::Dangerous;
            }
        };

        declared.combine(self.assess_parameter_risk(parameters))
    }

    fn declared_level(
        &self,
        registry: &CapabilityRegistry,
        capability_id: &str,
    ) -> Result<Option<SafetyLevel>> {
        let Some(tool_id) = registry.find_tool_for_capability(capability_id)? else {
            return Ok(None);
        };
        Ok(registry.registration(&tool_id)?.map(|r| r.safety_level))
    }

    /// Gate a request before a tool is chosen
    ///
    /// The combined risk is the maximum declared level across `candidates`
    /// folded with the parameter risk. Approval is required at
    /// REQUIRES_CONFIRMATION, and at DANGEROUS only when `gate_dangerous` is set.
    pub fn assess_execution_safety(
        &self,
        registry: &CapabilityRegistry,
        request: &ToolExecutionRequest,
        candidates: &[String],
    ) -> Result<SafetyAssessment> {
        let mut risk_level = self.assess_parameter_risk(&request.parameters);
        for tool_id in candidates {
            let declared = match registry.registration(tool_id)? {
                Some(registration) => registration.safety_level,
                None => SafetyLevel::Dangerous,
            };
            risk_level = risk_level.combine(declared);
        }

        let requires_approval = match risk_level {
            SafetyLevel::Safe => false,
            SafetyLevel::RequiresConfirmation => true,
            SafetyLevel::Dangerous => self.gate_dangerous,
        };

        let approval_request = requires_approval.then(|| ApprovalRequest {
            approval_id: uuid::Uuid::new_v4().to_string(),
            request_id: request.request_id.clone(),
            reason: format!(
                "Request requires approval: risk level {} for capabilities [{}]",
                risk_level,
                request.required_capabilities.join(", ")
            ),
            risk_level,
            candidate_tools: candidates.to_vec(),
            parameters: request.parameters.clone(),
            requested_at: Utc::now(),
        });

        tracing::debug!(
            request_id = %request.request_id,
            risk_level = %risk_level,
            requires_approval,
            "Safety assessment complete"
        );

        Ok(SafetyAssessment {
            requires_approval,
            risk_level,
            approval_request,
        })
    }
}
