//! Cache configuration.
//!
//! Controls the instruction cache via the `[cache]` table of `wikiweave.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_INSTRUCTION_CACHE_LIMIT: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep compiled instruction streams of included pages in memory.
    pub enable_instruction_cache: bool,
    /// Maximum pages held by the instruction cache.
    pub instruction_cache_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_instruction_cache: true,
            instruction_cache_limit: DEFAULT_INSTRUCTION_CACHE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_instruction_cache: settings.enable_instruction_cache,
            instruction_cache_limit: settings.instruction_cache_limit,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enable_instruction_cache
    }

    /// Returns the instruction cache limit as NonZeroUsize, clamping to 1 if zero.
    pub fn instruction_cache_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.instruction_cache_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.is_enabled());
        assert_eq!(config.instruction_cache_limit, 256);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            instruction_cache_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.instruction_cache_limit_non_zero().get(), 1);
    }
}
