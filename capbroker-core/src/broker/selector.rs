//! Candidate filtering and tool selection

use super::health::HealthTracker;
use super::registry::CapabilityRegistry;
use super::request::ToolExecutionRequest;
use crate::config::SelectionConfig;
use crate::error::Result;

/// Live figures a candidate is scored on
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateStats {
    pub tool_id: String,
    pub health: f64,
    pub success_rate: f64,
}

/// Picks the tools that may serve a request and the one that should
#[derive(Debug, Clone)]
pub struct ToolSelector {
    config: SelectionConfig,
}

impl ToolSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Weighted selection score
    pub fn score(&self, health: f64, success_rate: f64) -> f64 {
        health * self.config.health_weight + success_rate * self.config.success_rate_weight
    }

    /// Tools indexed under any required capability whose health is above the
    /// suitability threshold
    ///
    /// Order follows the required capabilities, then registration order within
    /// each; a tool appears once.
    pub fn find_suitable_tools(
        &self,
        registry: &CapabilityRegistry,
        tracker: &HealthTracker,
        request: &ToolExecutionRequest,
    ) -> Result<Vec<String>> {
        let mut suitable: Vec<String> = Vec::new();

        for capability in &request.required_capabilities {
            for tool_id in registry.tools_for_capability(capability)? {
                if suitable.contains(&tool_id) {
                    continue;
                }
                let health = tracker.health(&tool_id)?.unwrap_or(0.0);
                if health > self.config.suitability_threshold {
                    suitable.push(tool_id);
                } else {
                    tracing::debug!(tool_id = %tool_id, health, "Skipping unhealthy tool");
                }
            }
        }

        Ok(suitable)
    }

    /// Current stats of each candidate, in candidate order
    pub fn candidate_stats(
        &self,
        registry: &CapabilityRegistry,
        tracker: &HealthTracker,
        candidates: &[String],
    ) -> Result<Vec<CandidateStats>> {
        let mut stats = Vec::with_capacity(candidates.len());
        for tool_id in candidates {
            stats.push(CandidateStats {
                tool_id: tool_id.clone(),
                health: tracker.health(tool_id)?.unwrap_or(0.0),
                success_rate: registry.success_rate(tool_id)?.unwrap_or(0.0),
            });
        }
        Ok(stats)
    }

    /// Highest-scoring candidate; on a tie the earliest wins
    pub fn select_from_stats(&self, stats: &[CandidateStats]) -> Option<String> {
        let mut best: Option<(&CandidateStats, f64)> = None;
        for candidate in stats {
            let score = self.score(candidate.health, candidate.success_rate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((candidate, score)),
            }
        }
        best.map(|(candidate, _)| candidate.tool_id.clone())
    }

    /// Choose the tool to run among `candidates`
    pub fn select_optimal_tool(
        &self,
        registry: &CapabilityRegistry,
        tracker: &HealthTracker,
        candidates: &[String],
    ) -> Result<Option<String>> {
        let stats = self.candidate_stats(registry, tracker, candidates)?;
        let selected = self.select_from_stats(&stats);
        if let Some(ref tool_id) = selected {
            tracing::info!(tool_id = %tool_id, candidates = candidates.len(), "Selected tool");
        }
        Ok(selected)
    }

    /// Best candidates by score, capped at `max_recommendations`
    pub fn recommend(
        &self,
        registry: &CapabilityRegistry,
        tracker: &HealthTracker,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        let mut scored: Vec<(String, f64)> = self
            .candidate_stats(registry, tracker, candidates)?
            .into_iter()
            .map(|c| {
                let score = self.score(c.health, c.success_rate);
                (c.tool_id, score)
            })
            .collect();
        // Stable sort keeps candidate order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored
            .into_iter()
            .take(self.config.max_recommendations)
            .map(|(tool_id, _)| tool_id)
            .collect())
    }
}
