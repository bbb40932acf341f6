//! Configuration types for the capability broker

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default words whose presence in request parameters raises the risk level
pub const DEFAULT_RISKY_PATTERNS: &[&str] = &[
    "delete", "remove", "drop", "truncate", "format", "execute", "eval",
];

/// Main configuration for the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Maximum number of pipeline runs in flight at once
    pub max_concurrent_executions: usize,

    /// Run the safety gate before tool selection
    pub enable_safety_checks: bool,

    /// Timeout used for requests built by the broker itself
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// How long `shutdown` waits for in-flight executions to finish
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Execution records kept per tool
    pub history_capacity: usize,

    /// Health score assigned to a freshly registered tool
    pub initial_health: f64,

    /// Success rate assigned to a freshly registered tool
    pub initial_success_rate: f64,

    /// Health score formula
    pub health: HealthWeights,

    /// Candidate filtering and scoring
    pub selection: SelectionConfig,

    /// Safety gate behaviour
    pub safety: SafetyConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            enable_safety_checks: true,
            default_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            history_capacity: 1000,
            initial_health: 1.0,
            initial_success_rate: 1.0,
            health: HealthWeights::default(),
            selection: SelectionConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

/// Weights of the three-term health formula
///
/// `health = success_rate * performance_weight
///         + recency_bonus (if used within recency_window)
///         + speed_bonus (if the last run beat fast_execution_threshold)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthWeights {
    /// Multiplier applied to the success-rate EMA
    pub performance_weight: f64,

    /// Bonus for a tool used within `recency_window`
    pub recency_bonus: f64,

    /// Bonus for a run faster than `fast_execution_threshold`
    pub speed_bonus: f64,

    /// Smoothing factor of the success-rate EMA (weight of the newest outcome)
    pub ema_alpha: f64,

    #[serde(with = "humantime_serde")]
    pub recency_window: Duration,

    #[serde(with = "humantime_serde")]
    pub fast_execution_threshold: Duration,

    /// Clamp the computed score into [0, 1]
    pub clamp: bool,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            performance_weight: 0.6,
            recency_bonus: 0.3,
            speed_bonus: 0.1,
            ema_alpha: 0.1,
            recency_window: Duration::from_secs(7 * 24 * 60 * 60),
            fast_execution_threshold: Duration::from_secs(5),
            clamp: true,
        }
    }
}

/// Candidate filtering thresholds and scoring weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Weight of the health score in the selection score
    pub health_weight: f64,

    /// Weight of the success rate in the selection score
    pub success_rate_weight: f64,

    /// Tools at or below this health are not execution candidates
    pub suitability_threshold: f64,

    /// Tools at or below this health are hidden from discovery
    pub visibility_threshold: f64,

    /// Discovered capabilities are flagged enabled above this health
    pub enabled_threshold: f64,

    /// Recommended tools attached to an approval-required result
    pub max_recommendations: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            health_weight: 0.4,
            success_rate_weight: 0.6,
            suitability_threshold: 0.5,
            visibility_threshold: 0.3,
            enabled_threshold: 0.5,
            max_recommendations: 3,
        }
    }
}

/// Safety gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Substrings that mark parameters as risky (matched case-insensitively)
    pub risky_patterns: Vec<String>,

    /// Also require approval when the combined risk is DANGEROUS
    pub gate_dangerous: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            risky_patterns: DEFAULT_RISKY_PATTERNS.iter().map(|p| p.to_string()).collect(),
            gate_dangerous: false,
        }
    }
}

impl BrokerConfig {
    /// Set the admission limit
    pub fn with_max_concurrent_executions(mut self, max: usize) -> Self {
        self.max_concurrent_executions = max;
        self
    }

    /// Enable or disable the safety gate
    pub fn with_safety_checks(mut self, enabled: bool) -> Self {
        self.enable_safety_checks = enabled;
        self
    }

    /// Set the default request timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the shutdown drain timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the per-tool history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the health formula
    pub fn with_health_weights(mut self, weights: HealthWeights) -> Self {
        self.health = weights;
        self
    }

    /// Set the selection configuration
    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    /// Set the safety configuration
    pub fn with_safety(mut self, safety: SafetyConfig) -> Self {
        self.safety = safety;
        self
    }

    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `capbroker.toml` in the working directory
    /// 3. The file named by `CAPBROKER_CONFIG_PATH`
    /// 4. `CAPBROKER_` environment variables (`__` separates nested keys,
    ///    e.g. `CAPBROKER_SELECTION__HEALTH_WEIGHT=0.5`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is malformed or the result
    /// fails validation.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(BrokerConfig::default()))
            .merge(Toml::file("capbroker.toml"));

        if let Ok(path) = std::env::var("CAPBROKER_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: BrokerConfig = figment
            .merge(Env::prefixed("CAPBROKER_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| {
                BrokerError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    ///
    /// Keys missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: BrokerConfig = Figment::from(Serialized::defaults(BrokerConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                BrokerError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_executions == 0 {
            return Err(invalid("max_concurrent_executions must be at least 1"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity must be at least 1"));
        }

        let unit_fields = [
            ("initial_health", self.initial_health),
            ("initial_success_rate", self.initial_success_rate),
            ("health.ema_alpha", self.health.ema_alpha),
            ("selection.suitability_threshold", self.selection.suitability_threshold),
            ("selection.visibility_threshold", self.selection.visibility_threshold),
            ("selection.enabled_threshold", self.selection.enabled_threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }

        let weights = [
            ("health.performance_weight", self.health.performance_weight),
            ("health.recency_bonus", self.health.recency_bonus),
            ("health.speed_bonus", self.health.speed_bonus),
            ("selection.health_weight", self.selection.health_weight),
            ("selection.success_rate_weight", self.selection.success_rate_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> BrokerError {
    BrokerError::Configuration(message.into())
}
