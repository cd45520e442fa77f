//! Shared CLI type definitions for the `stream-probe` build and runtime.
//!
//! This crate provides the CLI argument and configuration types used by both
//! the `build.rs` script (for man page generation) and the probe binary.
//! Keeping them apart from the library avoids pulling the runtime stack into
//! the build script.
//!
//! Configuration is layered with `figment`: built-in defaults, then an
//! optional `.stream-probe.toml`, then `STREAM_PROBE_*` environment
//! variables, and finally flags given on the command line.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
#[cfg(feature = "toml")]
use figment::providers::{Format, Toml};
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

/// Environment prefix for probe configuration.
pub const ENV_PREFIX: &str = "STREAM_PROBE_";

/// Configuration file read from the working directory when present.
pub const CONFIG_FILE: &str = ".stream-probe.toml";

/// Default stream endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/stream";

/// Resolved probe configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// WebSocket endpoint of the render service.
    pub url: String,
    /// Sub-protocols offered during the handshake.
    pub protocols: Vec<String>,
    /// Viewport width requested when starting a stream.
    pub width: u32,
    /// Viewport height requested when starting a stream.
    pub height: u32,
    /// Stream settings file layered beneath `RENDER_STREAM_*` overrides.
    pub settings: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            protocols: Vec::new(),
            width: 1280,
            height: 720,
            settings: None,
        }
    }
}

impl ProbeConfig {
    /// Merge defaults, the config file, the environment and `overrides`.
    ///
    /// # Errors
    /// Returns the `figment` error when a layer has the wrong shape.
    pub fn load(overrides: &ProbeArgs) -> Result<Self, figment::Error> {
        Self::figment(overrides).extract()
    }

    fn figment(overrides: &ProbeArgs) -> Figment {
        let base = Figment::from(Serialized::defaults(Self::default()));
        #[cfg(feature = "toml")]
        let layered = base.merge(Toml::file(CONFIG_FILE));
        #[cfg(not(feature = "toml"))]
        let layered = base;
        layered
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }
}

/// Flags that override configured values; unset flags leave them alone.
#[derive(Args, Serialize, Deserialize, Default, Debug, Clone)]
pub struct ProbeArgs {
    /// WebSocket endpoint of the render service.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Sub-protocol to offer; repeat for several.
    #[arg(long = "protocol")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    /// Viewport width in pixels.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Viewport height in pixels.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Stream settings TOML file.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<PathBuf>,
}

/// Arguments for the `sync-time` subcommand.
#[derive(Args, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncTimeArgs {
    /// Number of round trips to measure.
    #[arg(long, default_value_t = 5)]
    pub samples: u32,
}

impl Default for SyncTimeArgs {
    fn default() -> Self { Self { samples: 5 } }
}

/// Probe subcommands.
#[derive(Subcommand, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start a stream and report the identifiers the server assigns.
    #[command(name = "start-stream")]
    StartStream,
    /// Measure round-trip time and clock offset against the server.
    #[command(name = "sync-time")]
    SyncTime(SyncTimeArgs),
}

/// Top-level CLI entry point consumed by the probe binary.
#[derive(Parser, Serialize, Debug, Clone)]
#[command(name = "stream-probe", version, about = "Probe a streaming render service")]
pub struct Cli {
    /// Configuration overrides, merged over files and environment at runtime.
    #[command(flatten)]
    pub config: ProbeArgs,
    /// Action to run; defaults to `sync-time`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}
