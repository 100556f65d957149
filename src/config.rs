pub use config::{Config, ConfigError, Environment, File as ConfigFile};
pub use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

use crate::address::NetworkParams;
use crate::cache::DEFAULT_BLOCK_CACHE_SIZE;
use crate::constants::{
    DEFAULT_SELECTION_TIMEOUT_MS, DEFAULT_SLICE_SIZE, INSTANTSEND_CONFIRMATIONS_REQUIRED,
};
use crate::fee::FeeSchedule;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

/// Prefix of environment overrides, e.g. `RUSTYLEDGER__SELECTION__TIMEOUT_MS`
pub const ENV_PREFIX: &str = "RUSTYLEDGER";

/// Build a config from an optional TOML file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = Config::builder();
    match path {
        Some(path) => builder = builder.add_source(ConfigFile::from(path)),
        None => builder = builder.add_source(ConfigFile::with_name("config.toml").required(false)),
    }
    builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
}

pub fn init_global_config(path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config = load_config(path)?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| "Config already set")?;
    Ok(())
}

pub fn get_global_config() -> Option<&'static Config> {
    GLOBAL_CONFIG.get()
}

/// Engine settings from the global config, defaults when it was never loaded
pub fn settings() -> Result<EngineSettings, ConfigError> {
    match get_global_config() {
        Some(config) => EngineSettings::from_config(config),
        None => Ok(EngineSettings::default()),
    }
}

/// Typed engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Unspent outputs fetched per selection slice
    pub slice_size: usize,
    pub selection_timeout: Duration,
    /// Confirmations required when funding instant-send payments
    pub instant_confirmations: i32,
    pub block_cache_size: usize,
    pub fee: FeeSchedule,
    pub network: NetworkParams,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            slice_size: DEFAULT_SLICE_SIZE,
            selection_timeout: Duration::from_millis(DEFAULT_SELECTION_TIMEOUT_MS),
            instant_confirmations: INSTANTSEND_CONFIRMATIONS_REQUIRED,
            block_cache_size: DEFAULT_BLOCK_CACHE_SIZE,
            fee: FeeSchedule::default(),
            network: NetworkParams::default(),
        }
    }
}

fn get_or<T: DeserializeOwned>(config: &Config, key: &str, default: T) -> Result<T, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let d = EngineSettings::default();

        let slice_size: usize = get_or(config, "selection.slice_size", d.slice_size)?;
        if slice_size == 0 {
            return Err(ConfigError::Message("selection.slice_size must be positive".into()));
        }
        let timeout_ms: u64 = get_or(config, "selection.timeout_ms", d.selection_timeout.as_millis() as u64)?;

        let fee = FeeSchedule {
            input_bytes: get_or(config, "fee.input_bytes", d.fee.input_bytes)?,
            output_bytes: get_or(config, "fee.output_bytes", d.fee.output_bytes)?,
            outputs: get_or(config, "fee.outputs", d.fee.outputs)?,
            overhead_bytes: get_or(config, "fee.overhead_bytes", d.fee.overhead_bytes)?,
            fee_per_kb: get_or(config, "fee.fee_per_kb", d.fee.fee_per_kb)?,
            kilobyte: get_or(config, "fee.kilobyte", d.fee.kilobyte)?,
            fee_unit: get_or(config, "fee.fee_unit", d.fee.fee_unit)?,
            min_fee: get_or(config, "fee.min_fee", d.fee.min_fee)?,
        };
        if fee.kilobyte == 0 || fee.fee_unit <= 0 {
            return Err(ConfigError::Message("fee.kilobyte and fee.fee_unit must be positive".into()));
        }

        Ok(Self {
            slice_size,
            selection_timeout: Duration::from_millis(timeout_ms),
            instant_confirmations: get_or(config, "selection.instant_confirmations", d.instant_confirmations)?,
            block_cache_size: get_or(config, "cache.block_cache_size", d.block_cache_size)?,
            fee,
            network: NetworkParams {
                pubkey_prefix: get_or(config, "network.pubkey_prefix", d.network.pubkey_prefix)?,
                script_prefix: get_or(config, "network.script_prefix", d.network.script_prefix)?,
            },
        })
    }
}
