use std::path::PathBuf;

use anyhow::{Context, ensure};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::{error, info};
use valve_control::{ControlConfig, DEFAULT_ERASE_WINDOW_MS, Millis};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const LOCAL_CONFIG_PATH: &str = "config/local.toml";
const ENV_PREFIX: &str = "VALVE";

/// Settings for the simulated board and the loop around the controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    pub cycle_period_ms: u64,
    pub eeprom_path: PathBuf,
    pub eeprom_size: usize,
    pub erase_window_secs: u64,
    /// Log a status line at info level every this many cycles.
    pub status_every: u32,
    pub initial_knob: u16,
}

impl Default for BenchSettings {
    fn default() -> Self {
        BenchSettings {
            cycle_period_ms: 50,
            eeprom_path: PathBuf::from("target/valve-eeprom.bin"),
            eeprom_size: 1024,
            erase_window_secs: DEFAULT_ERASE_WINDOW_MS / 1_000,
            status_every: 20,
            initial_knob: 512,
        }
    }
}

impl BenchSettings {
    /// Boot erase window in milliseconds, saturating on absurd settings.
    pub fn erase_window_ms(&self) -> Millis {
        self.erase_window_secs.saturating_mul(1_000)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub controller: ControlConfig,
    pub bench: BenchSettings,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    info!("Attempting to load configuration from {}", DEFAULT_CONFIG_PATH);

    let config = Config::builder()
        .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(true))
        .add_source(File::new(LOCAL_CONFIG_PATH, FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e).context("loading bench configuration");
        }
    };

    let settings: Settings = config
        .try_deserialize()
        .context("deserializing bench configuration")?;
    ensure!(settings.bench.cycle_period_ms > 0, "bench.cycle_period_ms must be positive");
    ensure!(settings.bench.status_every > 0, "bench.status_every must be positive");
    ensure!(
        settings.bench.eeprom_size >= 12,
        "bench.eeprom_size must hold the 12-byte layout"
    );

    info!(?settings, "Successfully loaded configuration");
    Ok(settings)
}
