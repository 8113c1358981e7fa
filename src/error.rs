//! Error taxonomy shared across the crate.
//!
//! Dataset and configuration problems fail a run before any race is
//! processed; per-row dataset problems are downgraded to warnings inside
//! the loader and never surface here. Running out of funds is a normal
//! termination condition, not an error.

use std::path::PathBuf;

use thiserror::Error;

/// All failure kinds the engine can report.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("dataset not found: {}", path.display())]
    DatasetNotFound { path: PathBuf },

    #[error("dataset format invalid: {0}")]
    DatasetInvalidFormat(String),

    #[error("dataset missing required column: {0}")]
    DatasetMissingColumn(String),

    #[error("dataset value invalid: {0}")]
    DatasetInvalidValue(String),

    #[error("config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("config missing required key: {0}")]
    ConfigMissing(String),

    #[error("unknown strategy: {0}")]
    StrategyUnknown(String),

    #[error("invalid strategy parameter: {0}")]
    StrategyParamInvalid(String),

    #[error("unknown fund management method: {0}")]
    BankrollUnknown(String),

    #[error("invalid fund management parameter: {0}")]
    BankrollParamInvalid(String),

    #[error("race result unavailable: {0}")]
    ResultUnavailable(String),

    #[error("failed to write output: {0}")]
    OutputWriteFailed(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    /// Stable process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::DatasetNotFound { .. }
            | SimError::DatasetInvalidFormat(_)
            | SimError::DatasetMissingColumn(_)
            | SimError::DatasetInvalidValue(_) => 2,
            SimError::ConfigNotFound { .. }
            | SimError::ConfigInvalid(_)
            | SimError::ConfigMissing(_) => 3,
            SimError::StrategyUnknown(_) | SimError::StrategyParamInvalid(_) => 4,
            SimError::BankrollUnknown(_) | SimError::BankrollParamInvalid(_) => 5,
            SimError::ResultUnavailable(_) => 6,
            SimError::OutputWriteFailed(_) => 7,
        }
    }
}
