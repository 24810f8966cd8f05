//! # Engine Configuration
//!
//! Consolidated configuration for the engine core. Each subsystem gets its
//! own section with sensible defaults; the whole structure deserializes
//! from TOML so host applications can ship a single config file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML text did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field violated a cross-field constraint
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Frame pipelining depth; beginning a frame blocks on the fence of
    /// the frame this many submissions back
    pub buffering_depth: usize,
    /// GPU memory budget in bytes for render-target and buffer allocations
    pub memory_budget: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            buffering_depth: 3,
            memory_budget: 512 * 1024 * 1024,
        }
    }
}

/// Texture streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Total pooled GPU allocation for streamed texture blocks, in bytes.
    /// Must be a multiple of `block_size`.
    pub cache_size: usize,
    /// Fixed block size in bytes; one 128x128 RGBA tile at the 64 KiB
    /// minimum GPU allocation alignment
    pub block_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            // Small enough to force eviction and prioritisation under load
            cache_size: 16 * 1024 * 1024,
            block_size: 64 * 1024,
        }
    }
}

/// Scene registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Maximum transform nodes; `None` lets the arena grow
    pub max_nodes: Option<usize>,
    /// Maximum drawable entities; `None` lets the arena grow
    pub max_entities: Option<usize>,
    /// Enable the quad-tree spatial partition for visibility queries
    pub enable_partition: bool,
    /// Entities per partition leaf before it splits
    pub partition_split_threshold: usize,
    /// Maximum partition subdivision depth
    pub partition_max_depth: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_nodes: None,
            max_entities: None,
            enable_partition: true,
            partition_split_threshold: 8,
            partition_max_depth: 8,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Renderer section
    pub renderer: RendererConfig,
    /// Texture streaming section
    pub streaming: StreamingConfig,
    /// Scene registry section
    pub scene: SceneConfig,
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.buffering_depth == 0 {
            return Err(ConfigError::Invalid(
                "renderer.buffering_depth must be at least 1".into(),
            ));
        }
        if self.streaming.block_size == 0
            || self.streaming.cache_size % self.streaming.block_size != 0
        {
            return Err(ConfigError::Invalid(
                "streaming.cache_size must be a non-zero multiple of streaming.block_size".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [renderer]
            width = 1280
            height = 720
            buffering_depth = 2
            memory_budget = 268435456

            [streaming]
            cache_size = 1048576
            block_size = 65536
            "#,
        )
        .unwrap();

        assert_eq!(config.renderer.width, 1280);
        assert_eq!(config.renderer.buffering_depth, 2);
        assert_eq!(config.streaming.cache_size / config.streaming.block_size, 16);
        // Unspecified sections fall back to defaults
        assert!(config.scene.enable_partition);
    }

    #[test]
    fn test_rejects_misaligned_cache_size() {
        let result = EngineConfig::from_toml_str(
            r#"
            [streaming]
            cache_size = 100000
            block_size = 65536
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
