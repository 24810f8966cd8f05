//! Core engine services shared by every subsystem

pub mod config;

pub use config::{ConfigError, EngineConfig, RendererConfig, SceneConfig, StreamingConfig};
