//! Decoder configuration
//!
//! Options are plain serde types; the loader reads them from YAML.

mod loader;
mod types;

pub use loader::{ConfigLoader, CONFIG_ENV_VAR};
pub use types::DecoderOptions;
