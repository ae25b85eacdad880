//! Configuration loader
//!
//! Loads decoder options from a YAML file.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::types::DecoderOptions;

/// Environment variable naming the options file
pub const CONFIG_ENV_VAR: &str = "RECORD_DSL_CONFIG";

pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Loader that always yields the built-in defaults
    pub fn defaults() -> Self {
        Self { path: None }
    }

    /// Create loader from RECORD_DSL_CONFIG, or defaults when unset
    pub fn from_env() -> Self {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::new(path),
            Ok(_) => {
                warn!("{} is set but empty, using default decoder options", CONFIG_ENV_VAR);
                Self::defaults()
            }
            Err(_) => Self::defaults(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load decoder options
    pub fn load(&self) -> Result<DecoderOptions> {
        let Some(path) = &self.path else {
            return Ok(DecoderOptions::default());
        };

        info!("Loading decoder options from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        // An empty file is a valid "all defaults" configuration
        if content.trim().is_empty() {
            warn!("{} is empty, using default decoder options", path.display());
            return Ok(DecoderOptions::default());
        }

        let options: DecoderOptions = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Self::validate(&options)?;

        info!(
            "Loaded decoder options: endianness={:?}, max_array_len={}, max_instantiations={}",
            options.default_endianness, options.max_array_len, options.max_instantiations
        );

        Ok(options)
    }

    fn validate(options: &DecoderOptions) -> Result<()> {
        if options.max_array_len == 0 {
            bail!("max_array_len must be greater than zero");
        }
        if options.max_instantiations == 0 {
            bail!("max_instantiations must be greater than zero");
        }
        Ok(())
    }
}
