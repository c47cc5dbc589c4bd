use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{Backtracking, FrontierMemo, ParallelQueue, SteinerEnumerator};

/// Registry of the available enumeration strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnumerationStrategy {
    Backtracking,
    #[default]
    FrontierMemo,
    ParallelQueue,
}

impl EnumerationStrategy {
    pub fn from_str(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "backtracking" | "backtrack" => Ok(EnumerationStrategy::Backtracking),
            "frontier-memo" | "frontier" | "default" => Ok(EnumerationStrategy::FrontierMemo),
            "parallel-queue" | "parallel" => Ok(EnumerationStrategy::ParallelQueue),
            other => Err(anyhow!(
                "unknown enumeration strategy '{}'; supported values: {}",
                other,
                Self::available().join(", ")
            )),
        }
    }

    /// Build the strategy. `workers` only affects the parallel queue (0 = pool size).
    pub fn build(self, workers: usize) -> Arc<dyn SteinerEnumerator> {
        match self {
            EnumerationStrategy::Backtracking => Arc::new(Backtracking),
            EnumerationStrategy::FrontierMemo => Arc::new(FrontierMemo),
            EnumerationStrategy::ParallelQueue => Arc::new(ParallelQueue::with_workers(workers)),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["backtracking", "frontier-memo", "parallel-queue"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnumerationStrategy::Backtracking => "backtracking",
            EnumerationStrategy::FrontierMemo => "frontier-memo",
            EnumerationStrategy::ParallelQueue => "parallel-queue",
        }
    }
}

impl std::fmt::Display for EnumerationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
