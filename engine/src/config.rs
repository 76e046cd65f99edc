//! Engine configuration.
//!
//! Parsed from TOML, e.g.:
//!
//! ```toml
//! [allocator]
//! alignment = 8
//! capacity = 1073741824
//!
//! [optimizer]
//! eliminate-inverse-transposes = true
//! fuse-transpose-into-matmul = true
//! validate-after-rewrite = true
//! ```
//!
//! Every key is optional; missing sections fall back to [`Default`].

use serde::Deserialize;
use std::fmt;

use crate::dtype::MAX_SCALAR_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub allocator: AllocatorConfig,
    pub optimizer: OptimizerConfig,
}

/// `[allocator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AllocatorConfig {
    /// Every request is padded to a multiple of this (power of two)
    pub alignment: usize,

    /// Size of the virtual arena planned into
    pub capacity: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            alignment: MAX_SCALAR_SIZE,
            capacity: isize::MAX as usize,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alignment.is_power_of_two() {
            return Err(ConfigError::InvalidAlignment(self.alignment));
        }
        if self.capacity > isize::MAX as usize {
            return Err(ConfigError::CapacityTooLarge(self.capacity));
        }
        Ok(())
    }
}

/// `[optimizer]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OptimizerConfig {
    /// Drop Transpose pairs that compose to the identity
    pub eliminate_inverse_transposes: bool,

    /// Fold last-two-axis transposes into MatMul flags
    pub fuse_transpose_into_matmul: bool,

    /// Run `check_valid` after rewriting
    pub validate_after_rewrite: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            eliminate_inverse_transposes: true,
            fuse_transpose_into_matmul: true,
            validate_after_rewrite: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    InvalidAlignment(usize),
    CapacityTooLarge(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Failed to parse engine config: {}", msg),
            ConfigError::InvalidAlignment(a) => {
                write!(f, "Allocator alignment {} is not a power of two", a)
            }
            ConfigError::CapacityTooLarge(c) => {
                write!(f, "Allocator capacity {} exceeds isize::MAX", c)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate a TOML engine config.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.allocator.validate()?;
    Ok(config)
}
