//! Capability and tool registration data model
//!
//! A tool owns one or more capabilities and declares a static safety level.
//! Discovery hands out enriched copies of capabilities; the originals never
//! change after registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Ordinal risk classification, least to most restrictive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    /// Read-only or otherwise harmless
    Safe,

    /// Needs a human to confirm before running
    RequiresConfirmation,

    /// Can cause irreversible damage
    Dangerous,
}

impl SafetyLevel {
    /// Position in the ordering SAFE < REQUIRES_CONFIRMATION < DANGEROUS
    pub fn rank(&self) -> u8 {
        match self {
            SafetyLevel::Safe => 0,
            SafetyLevel::RequiresConfirmation => 1,
            SafetyLevel::Dangerous => 2,
        }
    }

    /// The riskier of two levels
    pub fn combine(self, other: SafetyLevel) -> SafetyLevel {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Whether a tool at this level may serve a request whose minimum is `required`
    pub fn is_compatible_with(&self, required: SafetyLevel) -> bool {
        is_safety_level_compatible(*self, required)
    }

    /// Get the string name of this level
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "SAFE",
            SafetyLevel::RequiresConfirmation => "REQUIRES_CONFIRMATION",
            SafetyLevel::Dangerous => "DANGEROUS",
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tool is compatible only if its level ranks at or below the requested minimum.
pub fn is_safety_level_compatible(tool_safety: SafetyLevel, required_safety: SafetyLevel) -> bool {
    tool_safety.rank() <= required_safety.rank()
}

/// Kind of work a capability performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityType {
    KnowledgeRetrieval,
    DataAnalysis,
    WebSearch,
    LogAnalysis,
    TextGeneration,
    CodeExecution,
    SystemOperation,
}

impl CapabilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityType::KnowledgeRetrieval => "knowledge_retrieval",
            CapabilityType::DataAnalysis => "data_analysis",
            CapabilityType::WebSearch => "web_search",
            CapabilityType::LogAnalysis => "log_analysis",
            CapabilityType::TextGeneration => "text_generation",
            CapabilityType::CodeExecution => "code_execution",
            CapabilityType::SystemOperation => "system_operation",
        }
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse grouping of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    KnowledgeBase,
    Analysis,
    Search,
    Integration,
    System,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::KnowledgeBase => "knowledge_base",
            ToolCategory::Analysis => "analysis",
            ToolCategory::Search => "search",
            ToolCategory::Integration => "integration",
            ToolCategory::System => "system",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Index key for a capability name or id: lowercase, spaces become underscores
pub fn normalize_capability_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// A named, versioned unit of functionality a tool can perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Unique identifier
    pub capability_id: String,

    /// Kind of work
    #[serde(rename = "type")]
    pub capability_type: CapabilityType,

    /// Display name (indexed in normalized form)
    pub name: String,

    pub description: String,

    pub version: String,

    /// JSON Schema of accepted parameters
    pub parameters: Value,

    /// Capability ids this one relies on
    pub dependencies: Vec<String>,

    pub safety_level: SafetyLevel,

    /// Free-form numeric metrics; discovery merges live health figures in here
    pub performance_metrics: HashMap<String, f64>,

    /// Derived at discovery time from the owning tool's health
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Capability {
    /// Create a capability with required fields
    pub fn new(
        capability_id: impl Into<String>,
        capability_type: CapabilityType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            capability_id: capability_id.into(),
            capability_type,
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
            dependencies: Vec::new(),
            safety_level: SafetyLevel::Safe,
            performance_metrics: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the parameter schema
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    pub fn with_dependency(mut self, capability_id: impl Into<String>) -> Self {
        self.dependencies.push(capability_id.into());
        self
    }

    pub fn with_safety_level(mut self, level: SafetyLevel) -> Self {
        self.safety_level = level;
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.performance_metrics.insert(key.into(), value);
        self
    }

    /// Keys this capability is reachable under in the capability index
    pub fn index_keys(&self) -> Vec<String> {
        let by_name = normalize_capability_name(&self.name);
        let by_id = normalize_capability_name(&self.capability_id);
        if by_name == by_id {
            vec![by_name]
        } else {
            vec![by_name, by_id]
        }
    }
}

/// Registration record of an executable tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistration {
    /// Unique tool identifier
    pub tool_id: String,

    /// Capabilities this tool provides
    pub capabilities: Vec<Capability>,

    pub category: ToolCategory,

    /// Declared, static safety level
    pub safety_level: SafetyLevel,

    /// Free-form performance profile supplied at registration
    pub performance_profile: HashMap<String, Value>,

    /// Last completed execution (maintained by the health tracker)
    pub last_used: Option<DateTime<Utc>>,

    /// Completed executions (maintained by the health tracker)
    pub execution_count: u64,

    /// Success-rate EMA in [0, 1] (maintained by the health tracker)
    pub success_rate: f64,
}

impl ToolRegistration {
    /// Create a registration with no capabilities yet
    pub fn new(
        tool_id: impl Into<String>,
        category: ToolCategory,
        safety_level: SafetyLevel,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            capabilities: Vec::new(),
            category,
            safety_level,
            performance_profile: HashMap::new(),
            last_used: None,
            execution_count: 0,
            success_rate: 1.0,
        }
    }

    /// Add a capability
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Add a performance profile entry
    pub fn with_profile(mut self, key: impl Into<String>, value: Value) -> Self {
        self.performance_profile.insert(key.into(), value);
        self
    }

    /// Check whether this tool owns the capability id
    pub fn owns_capability(&self, capability_id: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.capability_id == capability_id)
    }
}

#[cfg(test)]
mod capability_tests {
    use super::*;

    #[test]
    fn test_safety_level_ordering() {
        assert!(SafetyLevel::Safe < SafetyLevel::RequiresConfirmation);
        assert!(SafetyLevel::RequiresConfirmation < SafetyLevel::Dangerous);
        assert_eq!(
            SafetyLevel::Safe.combine(SafetyLevel::RequiresConfirmation),
            SafetyLevel::RequiresConfirmation
        );
        assert_eq!(
            SafetyLevel::Dangerous.combine(SafetyLevel::Safe),
            SafetyLevel::Dangerous
        );
    }

    #[test]
    fn test_safety_compatibility_is_monotone() {
        let levels = [
            SafetyLevel::Safe,
            SafetyLevel::RequiresConfirmation,
            SafetyLevel::Dangerous,
        ];

        for required in levels {
            assert!(is_safety_level_compatible(SafetyLevel::Safe, required));
        }

        assert!(!is_safety_level_compatible(SafetyLevel::Dangerous, SafetyLevel::Safe));
        assert!(!is_safety_level_compatible(
            SafetyLevel::Dangerous,
            SafetyLevel::RequiresConfirmation
        ));
        assert!(is_safety_level_compatible(SafetyLevel::Dangerous, SafetyLevel::Dangerous));

        // Raising the required minimum never makes a compatible tool incompatible
        for tool in levels {
            for (i, low) in levels.iter().enumerate() {
                for high in &levels[i..] {
                    if is_safety_level_compatible(tool, *low) {
                        assert!(is_safety_level_compatible(tool, *high));
                    }
                }
            }
        }
    }

    #[test]
    fn test_normalize_capability_name() {
        assert_eq!(normalize_capability_name("Web Search"), "web_search");
        assert_eq!(normalize_capability_name("  Log Analysis "), "log_analysis");
        assert_eq!(normalize_capability_name("kb_search"), "kb_search");
    }

    #[test]
    fn test_index_keys() {
        let cap = Capability::new(
            "kb.search",
            CapabilityType::KnowledgeRetrieval,
            "Knowledge Search",
        );
        assert_eq!(cap.index_keys(), vec!["knowledge_search", "kb.search"]);

        let cap = Capability::new("web_search", CapabilityType::WebSearch, "Web Search");
        assert_eq!(cap.index_keys(), vec!["web_search"]);
    }

    #[test]
    fn test_registration_builder() {
        let kb_search =
            Capability::new("kb_search", CapabilityType::KnowledgeRetrieval, "KB Search");
        let registration =
            ToolRegistration::new("kb", ToolCategory::KnowledgeBase, SafetyLevel::Safe)
                .with_capability(kb_search)
                .with_profile("avg_latency_ms", serde_json::json!(120));

        assert!(registration.owns_capability("kb_search"));
        assert!(!registration.owns_capability("web_search"));
        assert_eq!(registration.execution_count, 0);
        assert!(registration.last_used.is_none());
    }

    #[test]
    fn test_safety_level_serialization() {
        let json = serde_json::to_string(&SafetyLevel::RequiresConfirmation).unwrap();
        assert_eq!(json, "\"REQUIRES_CONFIRMATION\"");

        let cap = Capability::new("x", CapabilityType::DataAnalysis, "X");
        let value = serde_json::to_value(&cap).unwrap();
        assert_eq!(value["type"], "data_analysis");
    }
}
