//! Host configuration.
//!
//! Tick rate, run length, the runtime settings and the simulated engine's
//! behavior. Loaded from and saved to a TOML file.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use ambiverse_core::{RuntimeConfig, SimulationSettings};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "ambiverse.toml";

/// Host configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Seconds of soundscape to run
    pub duration: f64,
    /// Pace ticks against the wall clock instead of running flat out
    pub realtime: bool,
    /// Log every lifecycle transition at info level
    pub log_transitions: bool,
    /// Soundscape file (JSON). None = built-in demo
    pub soundscape: Option<PathBuf>,
    /// Runtime settings
    pub runtime: RuntimeConfig,
    /// Simulated engine settings
    pub simulation: SimulationSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            duration: 60.0,
            realtime: false,
            log_transitions: false,
            soundscape: None,
            runtime: RuntimeConfig::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let mut contents = String::new();
        match fs::File::open(path) {
            Ok(mut file) => {
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                return Self::default();
            },
        }

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_rate = self.tick_rate.clamp(1, 1000);
        self.duration = if self.duration.is_finite() {
            self.duration.clamp(0.0, 86_400.0)
        } else {
            60.0
        };
        self.simulation.ack_latency = self.simulation.ack_latency.max(0.0);
        self.simulation.default_duration = self.simulation.default_duration.max(0.0);
        self.runtime.validate();
    }

    /// Fixed timestep in seconds.
    #[must_use]
    pub fn tick_dt(&self) -> f64 {
        1.0 / f64::from(self.tick_rate.max(1))
    }

    /// Number of ticks needed to cover `duration`.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        (self.duration * f64::from(self.tick_rate)).ceil() as u64
    }
}
