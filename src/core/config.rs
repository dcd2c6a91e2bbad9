use serde::{Deserialize, Serialize};
use xflow_types::{IsolationLevel, SandboxLimits, ISOLATION_LEVEL_ENV};

use crate::error::FlowError;

pub const FALLBACK_TO_ENV_VARS_ENV: &str = "XFLOW_FALLBACK_TO_ENV_VARS";
pub const MAX_ITERATIONS_ENV: &str = "XFLOW_MAX_ITERATIONS";

/// Runtime configuration, read once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub isolation_level: IsolationLevel,
    /// Try a process env var when a `load_from_db` lookup fails
    pub fallback_to_env_vars: bool,
    /// Owner used for variable lookups
    pub owner_id: String,
    /// Max vertex builds per run
    pub max_iterations: usize,
    pub sandbox: SandboxLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::Moderate,
            fallback_to_env_vars: false,
            owner_id: "default".to_string(),
            max_iterations: 10_000,
            sandbox: SandboxLimits::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, FlowError> {
        toml::from_str(content)
            .map_err(|e| FlowError::Configuration(format!("Invalid runtime config: {}", e)))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, FlowError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, FlowError> {
        if let Ok(raw) = std::env::var(ISOLATION_LEVEL_ENV) {
            self.isolation_level = raw
                .parse()
                .map_err(|e| FlowError::Configuration(format!("{}: {}", ISOLATION_LEVEL_ENV, e)))?;
        }
        if let Ok(raw) = std::env::var(FALLBACK_TO_ENV_VARS_ENV) {
            self.fallback_to_env_vars = parse_bool(&raw).ok_or_else(|| {
                FlowError::Configuration(format!("{}: expected a boolean, got '{}'", FALLBACK_TO_ENV_VARS_ENV, raw))
            })?;
        }
        if let Ok(raw) = std::env::var(MAX_ITERATIONS_ENV) {
            self.max_iterations = raw.trim().parse().map_err(|_| {
                FlowError::Configuration(format!("{}: expected an integer, got '{}'", MAX_ITERATIONS_ENV, raw))
            })?;
        }
        Ok(self)
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn with_env_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_env_vars = enabled;
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
