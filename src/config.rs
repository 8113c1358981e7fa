//! YAML configuration: decoding, validation and assembly of the
//! engine's parts.
//!
//! Every key has a serde default so a config names only what it
//! changes. Configuration is read-only after decoding.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bankroll::{BankrollManager, BankrollMethod, FundConstraints, FundParams, BET_UNIT};
use crate::error::{Result, SimError};
use crate::filter::{FilterConfig, RaceFilter};
use crate::strategy::{CompositeStrategy, Strategy, StrategyParams};

/// Which driver a `run` executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    Simple,
    MonteCarlo,
    WalkForward,
}

/// Monte Carlo resampling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McMethod {
    #[default]
    Bootstrap,
    ProbabilityBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    #[serde(rename = "type", default)]
    pub mode: SimulationMode,
    #[serde(default = "default_initial_fund")]
    pub initial_fund: i64,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

fn default_initial_fund() -> i64 {
    100_000
}

fn default_random_seed() -> u64 {
    42
}

impl Default for SimulationSection {
    fn default() -> Self {
        SimulationSection {
            mode: SimulationMode::Simple,
            initial_fund: default_initial_fund(),
            random_seed: default_random_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloSection {
    #[serde(default = "default_num_trials")]
    pub num_trials: usize,
    #[serde(default)]
    pub method: McMethod,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Target fund for the achievement probability; defaults to twice
    /// the initial fund when unset.
    #[serde(default)]
    pub target_fund: Option<i64>,
    #[serde(default)]
    pub keep_histories: bool,
}

fn default_num_trials() -> usize {
    1000
}

fn default_confidence_level() -> f64 {
    0.95
}

impl Default for MonteCarloSection {
    fn default() -> Self {
        MonteCarloSection {
            num_trials: default_num_trials(),
            method: McMethod::Bootstrap,
            confidence_level: default_confidence_level(),
            target_fund: None,
            keep_histories: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardSection {
    #[serde(default = "default_train_period")]
    pub train_period_days: i64,
    #[serde(default = "default_test_period")]
    pub test_period_days: i64,
    #[serde(default = "default_step_days")]
    pub step_days: i64,
}

fn default_train_period() -> i64 {
    180
}

fn default_test_period() -> i64 {
    30
}

fn default_step_days() -> i64 {
    30
}

impl Default for WalkForwardSection {
    fn default() -> Self {
        WalkForwardSection {
            train_period_days: default_train_period(),
            test_period_days: default_test_period(),
            step_days: default_step_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySection {
    #[serde(default = "default_strategy_name")]
    pub name: String,
    #[serde(default)]
    pub params: StrategyParams,
}

fn default_strategy_name() -> String {
    "favorite_win".to_string()
}

impl Default for StrategySection {
    fn default() -> Self {
        StrategySection {
            name: default_strategy_name(),
            params: StrategyParams::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositeSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategies: Vec<CompositeEntryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeEntryConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub params: StrategyParams,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundSection {
    #[serde(default = "default_fund_method")]
    pub method: String,
    #[serde(default)]
    pub params: FundParams,
    #[serde(default)]
    pub constraints: FundConstraints,
}

fn default_fund_method() -> String {
    "fixed".to_string()
}

impl Default for FundSection {
    fn default() -> Self {
        FundSection {
            method: default_fund_method(),
            params: FundParams::default(),
            constraints: FundConstraints::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFormats {
    #[serde(default = "default_true")]
    pub json: bool,
    #[serde(default = "default_true")]
    pub csv: bool,
    #[serde(default = "default_true")]
    pub txt: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputFormats {
    fn default() -> Self {
        OutputFormats {
            json: true,
            csv: true,
            txt: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default)]
    pub formats: OutputFormats,
    #[serde(default)]
    pub charts: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputSection {
    fn default() -> Self {
        OutputSection {
            directory: default_output_dir(),
            formats: OutputFormats::default(),
            charts: false,
        }
    }
}

/// The full configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub monte_carlo: MonteCarloSection,
    #[serde(default)]
    pub walk_forward: WalkForwardSection,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub composite_strategy: CompositeSection,
    #[serde(default)]
    pub fund_management: FundSection,
    #[serde(default)]
    pub race_filter: FilterConfig,
    #[serde(default)]
    pub output: OutputSection,
}

impl SimulationConfig {
    /// Load and decode a YAML config file.
    pub fn load(path: &Path) -> Result<SimulationConfig> {
        if !path.exists() {
            return Err(SimError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::ConfigInvalid(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<SimulationConfig> {
        if text.trim().is_empty() {
            return Err(SimError::ConfigInvalid("empty config document".into()));
        }
        serde_yaml::from_str(text).map_err(|e| SimError::ConfigInvalid(e.to_string()))
    }

    /// Assemble the configured strategy, composite or single.
    pub fn build_strategy(&self) -> Result<Strategy> {
        if self.composite_strategy.enabled {
            let mut entries = Vec::new();
            for entry in &self.composite_strategy.strategies {
                let sub = Strategy::from_config(&entry.name, &entry.params)?;
                entries.push((sub, entry.weight));
            }
            return Ok(Strategy::Composite(CompositeStrategy::new(entries)?));
        }
        Strategy::from_config(&self.strategy.name, &self.strategy.params)
    }

    pub fn build_bankroll(&self) -> Result<BankrollManager> {
        let method =
            BankrollMethod::from_config(&self.fund_management.method, &self.fund_management.params)?;
        Ok(BankrollManager::new(
            method,
            self.fund_management.constraints.clone(),
        ))
    }

    pub fn build_filter(&self) -> RaceFilter {
        RaceFilter::new(self.race_filter.clone())
    }

    /// Target fund for the achievement probability.
    pub fn target_fund(&self) -> i64 {
        self.monte_carlo
            .target_fund
            .unwrap_or(self.simulation.initial_fund * 2)
    }

    /// Full validation pass; returns every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.simulation.initial_fund <= 0 {
            errors.push("simulation.initial_fund must be positive".to_string());
        }
        if let Err(e) = self.build_strategy() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.build_bankroll() {
            errors.push(e.to_string());
        }

        let c = &self.fund_management.constraints;
        if c.min_bet < BET_UNIT {
            errors.push(format!(
                "fund_management.constraints.min_bet must be at least {BET_UNIT}"
            ));
        }
        if !(0.0..1.0).contains(&c.stop_loss_threshold) {
            errors.push("fund_management.constraints.stop_loss_threshold must be in [0, 1)".into());
        }

        if self.simulation.mode == SimulationMode::MonteCarlo {
            if self.monte_carlo.num_trials == 0 {
                errors.push("monte_carlo.num_trials must be positive".to_string());
            }
            if !(0.0..1.0).contains(&self.monte_carlo.confidence_level)
                || self.monte_carlo.confidence_level == 0.0
            {
                errors.push("monte_carlo.confidence_level must be in (0, 1)".to_string());
            }
        }

        if self.simulation.mode == SimulationMode::WalkForward {
            let wf = &self.walk_forward;
            if wf.train_period_days <= 0 || wf.test_period_days <= 0 || wf.step_days <= 0 {
                errors.push("walk_forward periods must be positive day counts".to_string());
            }
        }

        if self.composite_strategy.enabled && self.composite_strategy.strategies.is_empty() {
            errors.push("composite_strategy.enabled requires at least one entry".to_string());
        }

        errors
    }
}
