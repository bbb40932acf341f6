//! Capability registry with secondary indexes
//!
//! The registry owns:
//! - The authoritative `tool_id -> registration` table (plus the executor handle)
//! - A capability index keyed by normalized capability name and id
//! - A category index
//!
//! Every tool id stored in an index refers to a key of the tool table. Tools are
//! never removed, so the indexes only ever grow.
//!
//! # Example
//!
//! ```rust,ignore
//! use capbroker_core::broker::{CapabilityRegistry, ToolRegistration};
//!
//! let registry = CapabilityRegistry::new();
//! registry.register_tool(kb_registration, Arc::new(KbSearch::new()))?;
//!
//! assert_eq!(registry.find_tool_for_capability("kb_search")?, Some("kb".to_string()));
//! assert_eq!(registry.tools_for_capability("KB Search")?, vec!["kb".to_string()]);
//! ```

use super::capability::{Capability, ToolCategory, ToolRegistration, normalize_capability_name};
use super::executor::SharedExecutor;
use super::health::HealthTracker;
use super::request::DiscoveryRequirements;
use crate::config::SelectionConfig;
use crate::error::{BrokerError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registration plus the executor that serves it
#[derive(Clone)]
pub(crate) struct RegisteredTool {
    pub(crate) registration: ToolRegistration,
    pub(crate) executor: SharedExecutor,
}

#[derive(Default)]
struct ToolTable {
    tools: HashMap<String, RegisteredTool>,
    /// Registration order, used for deterministic scans
    order: Vec<String>,
}

#[derive(Default)]
struct Indexes {
    capability_index: HashMap<String, Vec<String>>,
    category_index: HashMap<ToolCategory, Vec<String>>,
}

/// Registry of tools and the capabilities they provide
#[derive(Default)]
pub struct CapabilityRegistry {
    table: RwLock<ToolTable>,
    indexes: RwLock<Indexes>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tool_ids = self.tool_ids().unwrap_or_default();
        f.debug_struct("CapabilityRegistry")
            .field("tool_count", &tool_ids.len())
            .field("tools", &tool_ids)
            .finish()
    }
}

fn push_unique(list: &mut Vec<String>, tool_id: &str) {
    if !list.iter().any(|t| t == tool_id) {
        list.push(tool_id.to_string());
    }
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool and index its capabilities and category
    ///
    /// Returns an error if a tool with the same id is already registered.
    pub fn register_tool(
        &self,
        registration: ToolRegistration,
        executor: SharedExecutor,
    ) -> Result<()> {
        let tool_id = registration.tool_id.clone();
        let category = registration.category;
        let index_keys: Vec<String> = registration
            .capabilities
            .iter()
            .flat_map(|c| c.index_keys())
            .collect();

        {
            let mut table = self.table.write()?;
            if table.tools.contains_key(&tool_id) {
                return Err(BrokerError::DuplicateTool(tool_id));
            }
            table.tools.insert(
                tool_id.clone(),
                RegisteredTool {
                    registration,
                    executor,
                },
            );
            table.order.push(tool_id.clone());
        }

        let mut indexes = self.indexes.write()?;
        for key in index_keys {
            push_unique(indexes.capability_index.entry(key).or_default(), &tool_id);
        }
        push_unique(indexes.category_index.entry(category).or_default(), &tool_id);

        Ok(())
    }

    /// Add a capability to the capability index
    ///
    /// The capability does not have to belong to a registered tool; an unowned
    /// capability is indexed with an empty tool list. When a registered tool
    /// already owns the capability id, that tool is listed under the new keys.
    pub fn register_capability(&self, capability: &Capability) -> Result<()> {
        let owner = self.find_tool_for_capability(&capability.capability_id)?;

        let mut indexes = self.indexes.write()?;
        for key in capability.index_keys() {
            let tools = indexes.capability_index.entry(key).or_default();
            if let Some(ref tool_id) = owner {
                push_unique(tools, tool_id);
            }
        }
        Ok(())
    }

    /// First registered tool owning the capability id (linear scan)
    pub fn find_tool_for_capability(&self, capability_id: &str) -> Result<Option<String>> {
        let table = self.table.read()?;
        Ok(table
            .order
            .iter()
            .find(|tool_id| {
                table
                    .tools
                    .get(*tool_id)
                    .map(|t| t.registration.owns_capability(capability_id))
                    .unwrap_or(false)
            })
            .cloned())
    }

    /// Tool ids indexed under a capability name or id, in registration order
    pub fn tools_for_capability(&self, name: &str) -> Result<Vec<String>> {
        let indexes = self.indexes.read()?;
        Ok(indexes
            .capability_index
            .get(&normalize_capability_name(name))
            .cloned()
            .unwrap_or_default())
    }

    /// Whether the capability index has an entry for the name or id
    pub fn is_capability_indexed(&self, name: &str) -> Result<bool> {
        let indexes = self.indexes.read()?;
        Ok(indexes
            .capability_index
            .contains_key(&normalize_capability_name(name)))
    }

    /// Tool ids registered under a category
    pub fn tools_in_category(&self, category: ToolCategory) -> Result<Vec<String>> {
        let indexes = self.indexes.read()?;
        Ok(indexes
            .category_index
            .get(&category)
            .cloned()
            .unwrap_or_default())
    }

    /// Snapshot of a tool's registration
    pub fn registration(&self, tool_id: &str) -> Result<Option<ToolRegistration>> {
        let table = self.table.read()?;
        Ok(table.tools.get(tool_id).map(|t| t.registration.clone()))
    }

    /// Snapshot of every registration, in registration order
    pub fn registrations(&self) -> Result<Vec<ToolRegistration>> {
        let table = self.table.read()?;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.tools.get(id))
            .map(|t| t.registration.clone())
            .collect())
    }

    /// Executor serving a tool
    pub fn executor(&self, tool_id: &str) -> Result<Option<SharedExecutor>> {
        let table = self.table.read()?;
        Ok(table.tools.get(tool_id).map(|t| t.executor.clone()))
    }

    /// Current success-rate EMA of a tool
    pub fn success_rate(&self, tool_id: &str) -> Result<Option<f64>> {
        let table = self.table.read()?;
        Ok(table.tools.get(tool_id).map(|t| t.registration.success_rate))
    }

    /// Registered tool ids, in registration order
    pub fn tool_ids(&self) -> Result<Vec<String>> {
        Ok(self.table.read()?.order.clone())
    }

    /// Check if a tool is registered
    pub fn contains(&self, tool_id: &str) -> Result<bool> {
        Ok(self.table.read()?.tools.contains_key(tool_id))
    }

    /// Number of registered tools
    pub fn len(&self) -> Result<usize> {
        Ok(self.table.read()?.tools.len())
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.table.read()?.tools.is_empty())
    }

    /// Mutate the usage fields of a registration. Returns `None` for unknown tools.
    pub(crate) fn update_usage<R>(
        &self,
        tool_id: &str,
        update: impl FnOnce(&mut ToolRegistration) -> R,
    ) -> Result<Option<R>> {
        let mut table = self.table.write()?;
        Ok(table
            .tools
            .get_mut(tool_id)
            .map(|t| update(&mut t.registration)))
    }

    /// Capabilities of visible, compatible tools, enriched with live health data
    ///
    /// A tool is skipped when its health is at or below the visibility
    /// threshold, when its safety level exceeds the requested minimum, or when
    /// its category is filtered out. Each emitted capability carries
    /// `health_score`, `success_rate` and `last_execution` (unix seconds) in its
    /// performance metrics and is enabled above the enabled threshold.
    pub fn discover_capabilities(
        &self,
        requirements: &DiscoveryRequirements,
        tracker: &HealthTracker,
        selection: &SelectionConfig,
    ) -> Result<Vec<Capability>> {
        let table = self.table.read()?;
        let mut discovered = Vec::new();

        for tool_id in &table.order {
            let Some(tool) = table.tools.get(tool_id) else {
                continue;
            };
            let registration = &tool.registration;

            let health = tracker.health(tool_id)?.unwrap_or(0.0);
            if health <= selection.visibility_threshold {
                tracing::debug!(tool_id = %tool_id, health, "Tool hidden from discovery");
                continue;
            }

            if let Some(min_level) = requirements.min_safety_level {
                if !registration.safety_level.is_compatible_with(min_level) {
                    continue;
                }
            }

            if !requirements.matches_category(registration.category) {
                continue;
            }

            for capability in &registration.capabilities {
                if !requirements.matches_type(capability.capability_type) {
                    continue;
                }

                let mut enriched = capability.clone();
                enriched
                    .performance_metrics
                    .insert("health_score".to_string(), health);
                enriched
                    .performance_metrics
                    .insert("success_rate".to_string(), registration.success_rate);
                if let Some(last_used) = registration.last_used {
                    enriched.performance_metrics.insert(
                        "last_execution".to_string(),
                        last_used.timestamp_millis() as f64 / 1000.0,
                    );
                }
                enriched.enabled = health > selection.enabled_threshold;
                discovered.push(enriched);
            }
        }

        Ok(discovered)
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::broker::capability::{CapabilityType, SafetyLevel};
    use crate::broker::executor::{FnExecutor, ToolError};
    use crate::config::HealthWeights;
    use serde_json::Value;
    use std::sync::Arc;

    fn echo() -> SharedExecutor {
        Arc::new(FnExecutor::new(|params: Value| async move {
            Ok::<_, ToolError>(params)
        }))
    }

    fn kb_tool() -> ToolRegistration {
        ToolRegistration::new("kb", ToolCategory::KnowledgeBase, SafetyLevel::Safe).with_capability(
            Capability::new("kb_search", CapabilityType::KnowledgeRetrieval, "Knowledge Search"),
        )
    }

    fn shell_tool() -> ToolRegistration {
        ToolRegistration::new("shell", ToolCategory::System, SafetyLevel::Dangerous)
            .with_capability(Capability::new(
                "run_command",
                CapabilityType::SystemOperation,
                "Run Command",
            ))
    }

    fn tracker_for(registry: &CapabilityRegistry, health: f64) -> HealthTracker {
        let tracker = HealthTracker::new(HealthWeights::default(), 1000);
        for id in registry.tool_ids().unwrap() {
            tracker.seed(&id, health).unwrap();
        }
        tracker
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();

        assert!(registry.contains("kb").unwrap());
        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(
            registry.find_tool_for_capability("kb_search").unwrap(),
            Some("kb".to_string())
        );
        assert_eq!(registry.find_tool_for_capability("missing").unwrap(), None);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();

        assert!(matches!(
            registry.register_tool(kb_tool(), echo()),
            Err(BrokerError::DuplicateTool(_))
        ));
    }

    #[test]
    fn test_capability_index_by_name_and_id() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();

        assert_eq!(registry.tools_for_capability("Knowledge Search").unwrap(), vec!["kb"]);
        assert_eq!(registry.tools_for_capability("knowledge_search").unwrap(), vec!["kb"]);
        assert_eq!(registry.tools_for_capability("kb_search").unwrap(), vec!["kb"]);
        assert!(registry.tools_for_capability("web_search").unwrap().is_empty());
    }

    #[test]
    fn test_category_index() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();
        registry.register_tool(shell_tool(), echo()).unwrap();

        assert_eq!(registry.tools_in_category(ToolCategory::System).unwrap(), vec!["shell"]);
        assert!(registry.tools_in_category(ToolCategory::Search).unwrap().is_empty());
    }

    #[test]
    fn test_register_unowned_capability() {
        let registry = CapabilityRegistry::new();
        let cap = Capability::new("translate", CapabilityType::TextGeneration, "Translate Text");

        registry.register_capability(&cap).unwrap();

        assert!(registry.is_capability_indexed("translate_text").unwrap());
        assert!(registry.tools_for_capability("translate_text").unwrap().is_empty());
    }

    #[test]
    fn test_register_capability_alias_for_owned_id() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();

        let alias = Capability::new("kb_search", CapabilityType::KnowledgeRetrieval, "Docs Lookup");
        registry.register_capability(&alias).unwrap();

        assert_eq!(registry.tools_for_capability("docs lookup").unwrap(), vec!["kb"]);
        // Re-registering never duplicates an entry
        registry.register_capability(&alias).unwrap();
        assert_eq!(registry.tools_for_capability("docs_lookup").unwrap().len(), 1);
    }

    #[test]
    fn test_discovery_enriches_capabilities() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();
        let tracker = tracker_for(&registry, 0.9);

        let found = registry
            .discover_capabilities(
                &DiscoveryRequirements::default(),
                &tracker,
                &SelectionConfig::default(),
            )
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].capability_id, "kb_search");
        assert!(found[0].enabled);
        assert_eq!(found[0].performance_metrics["health_score"], 0.9);
        assert_eq!(found[0].performance_metrics["success_rate"], 1.0);
        assert!(!found[0].performance_metrics.contains_key("last_execution"));
    }

    #[test]
    fn test_discovery_visibility_and_enabled_thresholds() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();
        let selection = SelectionConfig::default();

        let dim = tracker_for(&registry, 0.4);
        let found = registry
            .discover_capabilities(&DiscoveryRequirements::default(), &dim, &selection)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(!found[0].enabled);

        let hidden = tracker_for(&registry, 0.3);
        let found = registry
            .discover_capabilities(&DiscoveryRequirements::default(), &hidden, &selection)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_discovery_filters() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(kb_tool(), echo()).unwrap();
        registry.register_tool(shell_tool(), echo()).unwrap();
        let tracker = tracker_for(&registry, 1.0);
        let selection = SelectionConfig::default();

        let safe_only = DiscoveryRequirements::new().with_min_safety_level(SafetyLevel::Safe);
        let found = registry.discover_capabilities(&safe_only, &tracker, &selection).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].capability_id, "kb_search");

        let anything = DiscoveryRequirements::new().with_min_safety_level(SafetyLevel::Dangerous);
        let found = registry.discover_capabilities(&anything, &tracker, &selection).unwrap();
        assert_eq!(found.len(), 2);

        let system = DiscoveryRequirements::new().with_category(ToolCategory::System);
        let found = registry.discover_capabilities(&system, &tracker, &selection).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].capability_id, "run_command");

        let by_type =
            DiscoveryRequirements::new().with_capability_type(CapabilityType::KnowledgeRetrieval);
        let found = registry.discover_capabilities(&by_type, &tracker, &selection).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].capability_id, "kb_search");
    }
}
