//! Per-tool health tracking
//!
//! Keeps a bounded execution history and a health score for every tool. After
//! each completed execution the tracker:
//! 1. Bumps the registration's `execution_count` and `last_used`
//! 2. Folds the outcome into the success-rate EMA
//! 3. Appends an [`ExecutionRecord`], evicting the oldest past capacity
//! 4. Recomputes the health score
//!
//! Locks are taken registry first, then tracker. The tracker never reaches
//! back into the registry while holding its own lock.

use super::registry::CapabilityRegistry;
use super::request::ToolExecutionRequest;
use super::result::{ExecutionStatus, ToolExecutionResult};
use crate::config::HealthWeights;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One completed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,

    /// Seconds
    pub execution_time: f64,

    pub request_id: String,
}

#[derive(Debug, Default)]
struct ToolHealth {
    score: f64,
    history: VecDeque<ExecutionRecord>,
}

/// Health scores and bounded execution histories, keyed by tool id
#[derive(Debug)]
pub struct HealthTracker {
    weights: HealthWeights,
    capacity: usize,
    tools: Mutex<HashMap<String, ToolHealth>>,
}

impl HealthTracker {
    /// Create a tracker keeping at most `capacity` records per tool
    pub fn new(weights: HealthWeights, capacity: usize) -> Self {
        Self {
            weights,
            capacity: capacity.max(1),
            tools: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking a tool with the given score. Existing entries are kept.
    pub fn seed(&self, tool_id: &str, initial_health: f64) -> Result<()> {
        let mut tools = self.tools.lock()?;
        tools.entry(tool_id.to_string()).or_insert_with(|| ToolHealth {
            score: initial_health,
            history: VecDeque::new(),
        });
        Ok(())
    }

    /// Current health score of a tool
    pub fn health(&self, tool_id: &str) -> Result<Option<f64>> {
        Ok(self.tools.lock()?.get(tool_id).map(|t| t.score))
    }

    /// Overwrite a tool's health score, e.g. to quarantine it by hand.
    ///
    /// The next completed execution recomputes the score from scratch.
    /// Returns `false` for tools the tracker does not know.
    pub fn set_health(&self, tool_id: &str, score: f64) -> Result<bool> {
        let mut tools = self.tools.lock()?;
        match tools.get_mut(tool_id) {
            Some(entry) => {
                entry.score = score;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Retained execution records, oldest first
    pub fn history(&self, tool_id: &str) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .tools
            .lock()?
            .get(tool_id)
            .map(|t| t.history.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Mean execution time over the retained history, 0.0 when empty
    pub fn average_execution_time(&self, tool_id: &str) -> Result<f64> {
        let tools = self.tools.lock()?;
        let Some(entry) = tools.get(tool_id) else {
            return Ok(0.0);
        };
        if entry.history.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = entry.history.iter().map(|r| r.execution_time).sum();
        Ok(total / entry.history.len() as f64)
    }

    /// Health score from the three-term formula
    pub fn compute_health(
        &self,
        success_rate: f64,
        last_used: Option<DateTime<Utc>>,
        execution_time: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let weights = &self.weights;
        let mut score = success_rate * weights.performance_weight;

        if let Some(last_used) = last_used {
            // A timestamp in the future still counts as recent
            let recent = match (now - last_used).to_std() {
                Ok(elapsed) => elapsed <= weights.recency_window,
                Err(_) => true,
            };
            if recent {
                score += weights.recency_bonus;
            }
        }

        if execution_time < weights.fast_execution_threshold.as_secs_f64() {
            score += weights.speed_bonus;
        }

        if weights.clamp {
            score.clamp(0.0, 1.0)
        } else {
            score
        }
    }

    /// Fold a completed execution into the tool's metrics
    ///
    /// Returns the new health score, or `None` when the tool is not registered.
    pub fn update_tool_metrics(
        &self,
        registry: &CapabilityRegistry,
        tool_id: &str,
        result: &ToolExecutionResult,
        request: &ToolExecutionRequest,
    ) -> Result<Option<f64>> {
        let now = Utc::now();
        let success = result.status == ExecutionStatus::Success;
        let outcome = if success { 1.0 } else { 0.0 };
        let alpha = self.weights.ema_alpha;

        let execution_time = result.execution_time().unwrap_or(0.0);

        // Registry and tracker are written in one critical section so concurrent
        // runs of a tool are recorded in the same order in both.
        let usage = registry.update_usage(tool_id, |registration| -> Result<(f64, f64)> {
            let mut tools = self.tools.lock()?;

            registration.execution_count += 1;
            registration.last_used = Some(now);
            registration.success_rate =
                (registration.success_rate * (1.0 - alpha) + outcome * alpha).clamp(0.0, 1.0);
            let success_rate = registration.success_rate;
            let score = self.compute_health(success_rate, Some(now), execution_time, now);

            let entry = tools.entry(tool_id.to_string()).or_default();
            entry.history.push_back(ExecutionRecord {
                timestamp: now,
                success,
                execution_time,
                request_id: request.request_id.clone(),
            });
            while entry.history.len() > self.capacity {
                entry.history.pop_front();
            }
            entry.score = score;

            Ok((success_rate, score))
        })?;

        let Some((success_rate, score)) = usage.transpose()? else {
            tracing::warn!(tool_id = %tool_id, "Metrics update for unregistered tool ignored");
            return Ok(None);
        };

        tracing::debug!(
            tool_id = %tool_id,
            success,
            success_rate,
            health = score,
            execution_time,
            "Updated tool metrics"
        );

        Ok(Some(score))
    }
}
