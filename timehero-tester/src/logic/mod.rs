pub mod monte_carlo;
pub mod reports;
pub mod scenarios;
pub mod seeds;
pub mod stats;

pub use monte_carlo::{MonteCarloAnalysis, MonteCarloConfig, MonteCarloRunner};
pub use scenarios::{Archetype, ScenarioResult, ScenarioRunner, archetypes, find_archetype};
pub use seeds::{random_seeds, resolve_seed_inputs};
