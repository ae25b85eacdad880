//! Configuration types

use serde::{Deserialize, Serialize};

use crate::ast::Endianness;

/// Knobs shared by every decode performed against a compiled unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderOptions {
    /// Byte order for multi-byte primitives written without `le`/`be`
    pub default_endianness: Endianness,

    /// Upper bound on any decoded array, counted or repeated
    pub max_array_len: usize,

    /// Upper bound on distinct generic instantiations per compiled unit
    pub max_instantiations: usize,

    /// Fail a top-level decode that leaves input unread
    pub require_full_consumption: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            default_endianness: Endianness::Little,
            max_array_len: 1_048_576,
            max_instantiations: 1024,
            require_full_consumption: false,
        }
    }
}
