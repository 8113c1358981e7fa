//! Keiba-sim - Horse race wagering strategy backtester
//!
//! This library provides:
//! - Chronological replay of historical races under a configured
//!   betting strategy and bankroll rule
//! - Fourteen concrete ticket strategies plus a weighted composite
//! - Fixed / percentage / fractional-Kelly stake sizing under global
//!   constraints
//! - Settlement across the seven ticket kinds and a full risk/return
//!   metrics suite with a Go/No-Go judgment
//! - Monte Carlo (bootstrap and probability-based) and walk-forward
//!   drivers around the single-pass replay
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use keiba_sim::config::SimulationConfig;
//! use keiba_sim::data::tsv_loader;
//! use keiba_sim::simulation::SimulationEngine;
//!
//! let config = SimulationConfig::load(Path::new("config.yaml"))?;
//! let dataset = tsv_loader::load(Path::new("races.tsv"))?;
//! let engine = SimulationEngine::from_config(&config)?;
//! let result = engine.run(&dataset.races, config.simulation.initial_fund, None)?;
//! println!("final fund: {} yen", result.final_fund);
//! # Ok::<(), keiba_sim::error::SimError>(())
//! ```

pub mod bankroll;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod report;
pub mod settlement;
pub mod simulation;
pub mod strategy;

// Re-export commonly used types
pub use bankroll::{BankrollManager, BankrollMethod, FundConstraints};
pub use config::{SimulationConfig, SimulationMode};
pub use error::{Result, SimError};
pub use filter::{FilterDecision, RaceFilter};
pub use metrics::{GoNoGo, SimulationMetrics};
pub use models::{BetRecord, Horse, Race, Ticket, TicketKind};
pub use simulation::{MonteCarloResult, SimulationEngine, SimulationResult};
pub use strategy::Strategy;
