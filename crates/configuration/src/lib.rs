//! # Perpetua Configuration
//!
//! The typed configuration surface of the system: fee and slippage rates, contract
//! value, leverage and utilization caps, protection tables, classifier thresholds,
//! strategy parameters and optimizer objectives. Nothing downstream hardcodes these
//! values; every component receives the parts it needs at construction.
//!
//! ## Public API
//!
//! - `load_config` / `load_config_from`: read `config.toml` plus `PERPETUA__*`
//!   environment overrides.
//! - `load_optimizer_config`: read an `optimizer.toml` job description.
//! - `Config::with_overrides`: late-bind a `ParameterSet` onto a copy of a config.
//! - `telemetry::init_tracing`: logging bootstrap for binaries.

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod optimizer_config;
pub mod overrides;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use optimizer_config::{
    AnalysisConfig, Filters, Objective, ObjectiveMetric, OptimizerConfig, ParameterRange,
    ParameterSet, Weights,
};
pub use settings::{
    AdaptationConfig, AtrMultipliers, AtrTierTable, BracketParams, BreakoutParams, CircuitBreakerConfig,
    ClassifierParams, Config, GridParams, LiveConfig, LockTier, LoggingConfig, MACrossoverParams, MomentumParams,
    ProbReversionParams, ProtectionLevelConfig, RegimeMultipliers, RiskManagement, Simulation,
    Strategies, SuperTrendParams,
};

const ENV_PREFIX: &str = "PERPETUA";

/// Loads the application configuration from the `config.toml` file.
///
/// The file is optional; missing sections fall back to their defaults. Environment
/// variables such as `PERPETUA__SIMULATION__FEE_RATE=0.0005` override file values.
pub fn load_config() -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        // Tells the builder to look for a file named `config.toml`
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(environment())
        .build()?;

    finish(builder)
}

/// Loads the application configuration from an explicit file, which must exist.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .add_source(environment())
        .build()?;

    finish(builder)
}

/// Loads an optimization job description.
pub fn load_optimizer_config(path: &Path) -> Result<OptimizerConfig, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .build()?;

    let job = builder.try_deserialize::<OptimizerConfig>()?;
    if job.parameter_space.is_empty() && job.seeds.is_empty() {
        return Err(ConfigError::ValidationError(
            "optimizer job needs a parameter_space or seeds".to_string(),
        ));
    }
    Ok(job)
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn finish(builder: config::Config) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(
        fee_rate = %config.simulation.fee_rate,
        contract_value = %config.simulation.contract_value,
        "Configuration loaded"
    );
    Ok(config)
}
