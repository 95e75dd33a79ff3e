//! Server configuration with defaults, JSON file loading, and CLI overrides.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub sim: SimConfig,
    pub rules: RulesConfig,
    /// Directory of `*.json` level files. The built-in demo level is used when unset.
    pub levels_dir: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            timing: TimingConfig::default(),
            sim: SimConfig::default(),
            rules: RulesConfig::default(),
            levels_dir: None,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Maximum concurrent connections across all rooms.
    pub max_clients: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_clients: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    pub heartbeat_interval_ms: u64,
    /// A connection is stale after `heartbeat_interval_ms * heartbeat_timeout_multiplier`.
    pub heartbeat_timeout_multiplier: u32,
    /// How long a disconnected player keeps their role slot.
    pub reconnect_grace_ms: u64,
    /// Empty rooms older than this are removed by the cleanup sweep.
    pub idle_room_timeout_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_multiplier: 3,
            reconnect_grace_ms: 30_000,
            idle_room_timeout_ms: 5 * 60_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl TimingConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate.max(1) as u64)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms * self.heartbeat_timeout_multiplier as u64)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}

/// Tunables consumed by the simulation inside a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub ping_cooldown_ms: u64,
    pub ping_lifetime_ms: u64,
    pub max_pings_per_player: usize,
    /// Entities and crates within this planar distance weigh on a plate.
    pub plate_check_radius: f32,
    pub light_weight: u32,
    pub heavy_weight: u32,
    pub crate_weight: u32,
    /// Winch extension gained per tick, in percent.
    pub winch_increment: f32,
    /// Scales platform speed into progress per tick.
    pub platform_tick_increment: f32,
    /// Ticks a crate stays flagged `being_pushed` after a push.
    pub push_flag_ticks: u32,
    /// Crates closer than this on both axes collide.
    pub crate_collision_distance: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ping_cooldown_ms: 500,
            ping_lifetime_ms: 5_000,
            max_pings_per_player: 3,
            plate_check_radius: 0.75,
            light_weight: 1,
            heavy_weight: 2,
            crate_weight: 2,
            winch_increment: 2.0,
            platform_tick_increment: 0.02,
            push_flag_ticks: 6,
            crate_collision_distance: 0.8,
        }
    }
}

/// When a session reports the level as complete.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LevelCompletionRule {
    /// Never report completion.
    #[default]
    Disabled,
    /// Report once every puzzle of the level has completed.
    AllPuzzles,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    pub level_completion: LevelCompletionRule,
    /// Room-code generation attempts before giving up.
    pub room_code_attempts: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            level_completion: LevelCompletionRule::default(),
            room_code_attempts: 10,
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::ParseError)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_json(&contents)
    }

    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.network.host = host.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(tick_rate) = args.tick_rate {
            self.timing.tick_rate = tick_rate;
        }
        if let Some(max_clients) = args.max_clients {
            self.network.max_clients = max_clients;
        }
        if let Some(ref dir) = args.levels {
            self.levels_dir = Some(dir.clone());
        }
        if let Some(ref level) = args.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }
}

/// Command line arguments. CLI values override the config file.
#[derive(Parser, Debug, Default)]
#[clap(author, version, about)]
pub struct CliArgs {
    /// Server IP address to bind to
    #[clap(short = 'H', long)]
    pub host: Option<String>,
    /// Server port to listen on
    #[clap(short, long)]
    pub port: Option<u16>,
    /// Tick rate (updates per second)
    #[clap(short, long)]
    pub tick_rate: Option<u32>,
    /// Maximum concurrent connections
    #[clap(long)]
    pub max_clients: Option<usize>,
    /// Directory containing level JSON files
    #[clap(short, long)]
    pub levels: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    pub log_level: Option<String>,
    /// Path to a JSON config file
    #[clap(short, long)]
    pub config: Option<PathBuf>,
}
