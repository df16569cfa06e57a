use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::coverability::{DEFAULT_STEP_BUDGET, DEFAULT_WIDENING_THRESHOLD, ExplorerConfig};
use crate::analysis::invariants::{DEFAULT_NULL_SPACE_EPSILON, InvariantConfig, MAX_ROUNDING_DECIMALS};

/// Tunables for one analysis run, usually read from `pn.toml`.
///
/// The null-space cutoff differs between the two historical analysis
/// variants (`1e-5` and `1e-10`); the default is the tighter one, see
/// [`crate::analysis::invariants::LEGACY_NULL_SPACE_EPSILON`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalysisConfig {
    #[serde(default = "default_null_space_epsilon")]
    pub null_space_epsilon: f64,
    #[serde(default = "default_rounding_decimals")]
    pub rounding_decimals: u32,
    #[serde(default = "default_svd_max_iterations")]
    pub svd_max_iterations: usize,
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,
    #[serde(default = "default_widening_threshold")]
    pub widening_threshold: u64,
    #[serde(default = "default_simulation_steps")]
    pub simulation_steps: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            null_space_epsilon: default_null_space_epsilon(),
            rounding_decimals: default_rounding_decimals(),
            svd_max_iterations: default_svd_max_iterations(),
            step_budget: default_step_budget(),
            widening_threshold: default_widening_threshold(),
            simulation_steps: default_simulation_steps(),
        }
    }
}

impl AnalysisConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AnalysisConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.null_space_epsilon.is_finite() && self.null_space_epsilon > 0.0,
            "null_space_epsilon must be a positive number, got {}",
            self.null_space_epsilon
        );
        anyhow::ensure!(
            self.rounding_decimals <= MAX_ROUNDING_DECIMALS,
            "rounding_decimals must be at most {}, got {}",
            MAX_ROUNDING_DECIMALS,
            self.rounding_decimals
        );
        anyhow::ensure!(self.svd_max_iterations > 0, "svd_max_iterations must be at least 1");
        Ok(())
    }

    pub fn explorer(&self) -> ExplorerConfig {
        ExplorerConfig {
            step_budget: self.step_budget,
            widening_threshold: self.widening_threshold,
        }
    }

    pub fn invariants(&self) -> InvariantConfig {
        InvariantConfig {
            epsilon: self.null_space_epsilon,
            rounding_decimals: self.rounding_decimals,
            max_iterations: self.svd_max_iterations,
        }
    }
}

fn default_null_space_epsilon() -> f64 {
    DEFAULT_NULL_SPACE_EPSILON
}

fn default_rounding_decimals() -> u32 {
    3
}

fn default_svd_max_iterations() -> usize {
    10_000
}

fn default_step_budget() -> usize {
    DEFAULT_STEP_BUDGET
}

fn default_widening_threshold() -> u64 {
    DEFAULT_WIDENING_THRESHOLD
}

fn default_simulation_steps() -> usize {
    100
}
