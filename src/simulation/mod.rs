//! Simulation drivers: the single-pass chronological replay plus the
//! Monte Carlo and walk-forward drivers that wrap it.

pub mod engine;
pub mod monte_carlo;
pub mod walk_forward;

pub use engine::{SimulationEngine, SimulationResult};
pub use monte_carlo::{
    HitProbEstimator, ImpliedProbability, MonteCarloResult, MonteCarloSummary,
};
pub use walk_forward::WindowResult;
