//! Engine configuration management via TOML files.
//!
//! Every key is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [engine]
//! alpha = 0.1          # learning rate
//! gamma = 0.9          # discount
//! beta = 0.0           # intrinsic weight
//! delta = 0.0          # symbolic weight
//! epsilon = 0.0        # meta-learning weight
//! zeta = 0.0           # evolutionary weight
//! eta = 0.0            # latent weight
//! table_capacity = 4096  # omit for an unbounded table
//!
//! [agent]
//! max_cycles = 1000
//! cycle_delay_ms = 0
//! log_dir = "logs"     # omit to keep the cycle journal in memory only
//! log_every = 1
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{QismelEngine, QismelWeights};
use crate::error::CoreResult;
use crate::value_table::ValueTable;

/// Engine configuration loaded from a TOML file.
///
/// # Examples
///
/// ```
/// use qismel_core::EngineConfig;
///
/// let config = EngineConfig::load_from_file("config/engine.toml")
///     .unwrap_or_else(|_| EngineConfig::default());
///
/// println!("alpha={} gamma={}", config.weights.alpha, config.weights.gamma);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub weights: QismelWeights,
    /// LRU capacity of the value table; `None` keeps it unbounded
    pub table_capacity: Option<usize>,
    pub agent: AgentConfig,
}

/// Driving-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    /// Upper bound on perceive → select → update cycles per run
    pub max_cycles: usize,
    /// Pause between cycles
    pub cycle_delay_ms: u64,
    /// Directory for `cycles.jsonl`; `None` disables the on-disk journal
    pub log_dir: Option<PathBuf>,
    /// Write every n-th cycle to disk
    pub log_every: usize,
}

impl AgentConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            cycle_delay_ms: 0,
            log_dir: None,
            log_every: default_log_every(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        let engine = raw.engine;
        let weights = QismelWeights {
            alpha: engine.alpha,
            gamma: engine.gamma,
            beta: engine.beta,
            delta: engine.delta,
            epsilon: engine.epsilon,
            zeta: engine.zeta,
            eta: engine.eta,
        };
        weights
            .validate()
            .map_err(|err| ConfigError::Parse(format!("engine: {err}")))?;

        if engine.table_capacity == Some(0) {
            return Err(ConfigError::Parse(
                "engine.table_capacity must be ≥ 1 (omit it for an unbounded table)".into(),
            ));
        }
        if raw.agent.max_cycles == 0 {
            return Err(ConfigError::Parse("agent.max_cycles must be ≥ 1".into()));
        }
        if raw.agent.log_every == 0 {
            return Err(ConfigError::Parse("agent.log_every must be ≥ 1".into()));
        }

        Ok(Self {
            weights,
            table_capacity: engine.table_capacity,
            agent: AgentConfig {
                max_cycles: raw.agent.max_cycles,
                cycle_delay_ms: raw.agent.cycle_delay_ms,
                log_dir: raw.agent.log_dir,
                log_every: raw.agent.log_every,
            },
        })
    }

    /// Builds the value table described by `table_capacity`.
    pub fn build_table(&self) -> CoreResult<ValueTable> {
        match self.table_capacity {
            Some(capacity) => ValueTable::with_capacity(capacity),
            None => Ok(ValueTable::new()),
        }
    }

    /// Builds an engine over a fresh table.
    pub fn build_engine(&self) -> CoreResult<QismelEngine> {
        QismelEngine::with_table(self.weights, self.build_table()?.shared())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: QismelWeights::default(),
            table_capacity: None,
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    engine: RawEngine,
    #[serde(default)]
    agent: RawAgent,
}

#[derive(Debug, Deserialize)]
struct RawEngine {
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_gamma")]
    gamma: f64,
    #[serde(default)]
    beta: f64,
    #[serde(default)]
    delta: f64,
    #[serde(default)]
    epsilon: f64,
    #[serde(default)]
    zeta: f64,
    #[serde(default)]
    eta: f64,
    #[serde(default)]
    table_capacity: Option<usize>,
}

impl Default for RawEngine {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            gamma: default_gamma(),
            beta: 0.0,
            delta: 0.0,
            epsilon: 0.0,
            zeta: 0.0,
            eta: 0.0,
            table_capacity: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAgent {
    #[serde(default = "default_max_cycles")]
    max_cycles: usize,
    #[serde(default)]
    cycle_delay_ms: u64,
    #[serde(default)]
    log_dir: Option<PathBuf>,
    #[serde(default = "default_log_every")]
    log_every: usize,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            cycle_delay_ms: 0,
            log_dir: None,
            log_every: default_log_every(),
        }
    }
}

fn default_alpha() -> f64 {
    0.1
}

fn default_gamma() -> f64 {
    0.9
}

fn default_max_cycles() -> usize {
    1_000
}

fn default_log_every() -> usize {
    1
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.weights, QismelWeights::q_learning(0.1, 0.9));
        assert_eq!(config.table_capacity, None);
    }

    #[test]
    fn parses_custom_values() {
        let toml = r#"
            [engine]
            alpha = 0.5
            gamma = 0.25
            beta = 0.1
            eta = 0.05
            table_capacity = 128

            [agent]
            max_cycles = 10
            cycle_delay_ms = 5
            log_dir = "out/logs"
            log_every = 2
        "#;
        let config = EngineConfig::from_str(toml).unwrap();
        assert_eq!(config.weights.alpha, 0.5);
        assert_eq!(config.weights.gamma, 0.25);
        assert_eq!(config.weights.beta, 0.1);
        assert_eq!(config.weights.delta, 0.0);
        assert_eq!(config.weights.eta, 0.05);
        assert_eq!(config.table_capacity, Some(128));
        assert_eq!(config.agent.max_cycles, 10);
        assert_eq!(config.agent.cycle_delay(), Duration::from_millis(5));
        assert_eq!(config.agent.log_dir, Some(PathBuf::from("out/logs")));
        assert_eq!(config.agent.log_every, 2);
        assert_eq!(config.build_table().unwrap().capacity(), Some(128));
    }

    #[test]
    fn weights_outside_unit_interval_are_accepted() {
        let config = EngineConfig::from_str("[engine]\nalpha = 1.5\nzeta = -2.0").unwrap();
        assert_eq!(config.weights.alpha, 1.5);
        assert_eq!(config.weights.zeta, -2.0);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(EngineConfig::from_str("[engine]\ntable_capacity = 0").is_err());
        assert!(EngineConfig::from_str("[agent]\nmax_cycles = 0").is_err());
        assert!(EngineConfig::from_str("[agent]\nlog_every = 0").is_err());
        assert!(EngineConfig::from_str("[engine]\nalpha = nan").is_err());
        assert!(EngineConfig::from_str("[engine]\nalpha = \"fast\"").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = EngineConfig::load_from_file("definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn bundled_config_parses() {
        let config = EngineConfig::from_str(include_str!("../config/engine.toml")).unwrap();
        assert!(config.build_engine().is_ok());
    }
}
