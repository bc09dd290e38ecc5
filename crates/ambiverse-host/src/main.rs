//! # Ambiverse Host
//!
//! Drives an Ambiverse soundscape at a fixed timestep against the simulated
//! audio engine and logs what the runtime does.
//!
//! Usage:
//! - `ambiverse [CONFIG]` runs with `CONFIG` (default `ambiverse.toml`)
//! - `ambiverse --write-config PATH` writes the default config
//! - `ambiverse --write-demo PATH` writes the built-in soundscape as JSON

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;
mod soundscape;
mod timing;

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{HostConfig, CONFIG_FILE};
use crate::soundscape::Soundscape;

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("ambiverse=info".parse()?))
        .init();

    info!("Ambiverse host starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("--write-config") => {
            let Some(path) = args.next() else {
                bail!("--write-config needs a path");
            };
            HostConfig::default().save_to(path)?;
        },
        Some("--write-demo") => {
            let Some(path) = args.next() else {
                bail!("--write-demo needs a path");
            };
            Soundscape::demo().save_to(path)?;
        },
        other => {
            let path = other.map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
            app::run(HostConfig::load_from(path))?;
        },
    }

    info!("Ambiverse host shutdown complete");
    Ok(())
}
