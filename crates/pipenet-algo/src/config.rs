//! Optimizer configuration.

use std::time::Duration;

use pipenet_core::DemandProperty;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, OptimizeResult};
use crate::evaluate::FailurePolicy;
use crate::spanning::DeterminantMethod;
use crate::steiner::EnumerationStrategy;

/// Settings for one [`NetworkOptimizer`](crate::NetworkOptimizer) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Steiner enumeration strategy
    pub strategy: EnumerationStrategy,
    /// Enumeration budget per piece (seconds)
    pub time_limit_seconds: f64,
    /// Pieces with more pipes go straight to local search
    pub max_enumeration_edges: usize,
    /// Skip enumeration when a piece has more spanning trees than this
    pub spanning_tree_threshold: Option<u64>,
    /// Determinant algorithm for the spanning-tree gate
    pub determinant: DeterminantMethod,
    /// Demand fields accumulated onto each pipe, in order
    pub properties: Vec<DemandProperty>,
    /// Worker threads for pricing and parallel enumeration (0 = rayon default)
    pub workers: usize,
    /// What to do when the cost function fails for a candidate
    pub on_cost_failure: FailurePolicy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: EnumerationStrategy::default(),
            time_limit_seconds: 5.0,
            max_enumeration_edges: 64,
            spanning_tree_threshold: None,
            determinant: DeterminantMethod::default(),
            properties: DemandProperty::ALL.to_vec(),
            workers: 0,
            on_cost_failure: FailurePolicy::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn with_strategy(mut self, strategy: EnumerationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_seconds = seconds;
        self
    }

    pub fn with_spanning_tree_threshold(mut self, threshold: u64) -> Self {
        self.spanning_tree_threshold = Some(threshold);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_cost_failure = policy;
        self
    }

    pub fn validate(&self) -> OptimizeResult<()> {
        if !self.time_limit_seconds.is_finite() || self.time_limit_seconds < 0.0 {
            return Err(OptimizeError::Config(format!(
                "time_limit_seconds must be a non-negative number, got {}",
                self.time_limit_seconds
            )));
        }
        if self.properties.is_empty() {
            return Err(OptimizeError::Config(
                "at least one demand property must be accumulated".to_string(),
            ));
        }
        Ok(())
    }

    /// Enumeration budget; call [`validate`](Self::validate) first.
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_seconds).unwrap_or(Duration::ZERO)
    }
}
