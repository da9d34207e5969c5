//! PISA operator configuration: a TOML file loaded via `serde`, with CLI
//! flags (via `clap`) layered on top — a parsed `Args` struct merged over
//! `Config::default()`.

pub mod error;

pub use error::{Error, ErrorKind, Result};

use std::fs;
use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches};
use ethereum_types::U256;

use pisa_logger::Config as LogConfig;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub confirmations_required_default: u32,
    pub poll_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            rpc_url: "http://127.0.0.1:8545".into(),
            chain_id: 1,
            confirmations_required_default: 20,
            poll_interval_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheConfig {
    pub max_depth: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { max_depth: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponderConfig {
    pub signing_key_path: PathBuf,
    #[serde(with = "u256_decimal")]
    pub max_gas_price: U256,
    pub gas_bump_factor_ppm: u64,
    #[serde(with = "u256_decimal")]
    pub gas_bump_floor: U256,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        ResponderConfig {
            signing_key_path: PathBuf::from("responder.key"),
            max_gas_price: U256::from(500_000_000_000u64),
            gas_bump_factor_ppm: 1_100_000,
            gas_bump_floor: U256::from(1_000_000_000u64),
        }
    }
}

mod u256_decimal {
    use ethereum_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Path { directory: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory
    }
}

/// Top-level configuration, assembled from a TOML file and overridden by
/// CLI flags.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub cache: CacheConfig,
    pub responder: ResponderConfig,
    pub store: StoreConfig,
    #[serde(skip)]
    pub log: LogConfigValue,
}

/// [`pisa_logger::Config`] doesn't implement `serde` traits — plain fields
/// the file format may still carry and the binary translates at startup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogConfigValue {
    pub mode: Option<String>,
    pub color: bool,
    pub file: Option<String>,
}

impl LogConfigValue {
    pub fn to_logger_config(&self) -> LogConfig {
        LogConfig {
            mode: self.mode.clone(),
            color: self.color,
            file: self.file.clone(),
            json: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain: ChainConfig::default(),
            cache: CacheConfig::default(),
            responder: ResponderConfig::default(),
            store: StoreConfig::default(),
            log: LogConfigValue { color: true, ..Default::default() },
        }
    }
}

impl Config {
    /// Loads `path` as TOML, falling back to built-in defaults for any
    /// field the file omits (`#[serde(default)]` on every section).
    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ErrorKind::ReadFile(path.display().to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ErrorKind::Parse(e.to_string()).into())
    }

    /// Applies CLI overrides on top of a loaded (or default) configuration:
    /// file first, then flags win.
    pub fn apply_cli_overrides(&mut self, matches: &ArgMatches) -> Result<()> {
        if let Some(rpc_url) = matches.value_of("rpc-url") {
            self.chain.rpc_url = rpc_url.to_string();
        }
        if let Some(chain_id) = matches.value_of("chain-id") {
            self.chain.chain_id = chain_id
                .parse()
                .map_err(|_| ErrorKind::Invalid("chain-id".into(), chain_id.into()))?;
        }
        if let Some(max_depth) = matches.value_of("max-depth") {
            self.cache.max_depth = max_depth
                .parse()
                .map_err(|_| ErrorKind::Invalid("max-depth".into(), max_depth.into()))?;
        }
        if let Some(key_path) = matches.value_of("signing-key") {
            self.responder.signing_key_path = PathBuf::from(key_path);
        }
        if matches.is_present("log-no-color") {
            self.log.color = false;
        }
        if let Some(log_mode) = matches.value_of("log") {
            self.log.mode = Some(log_mode.to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.is_empty() {
            return Err(ErrorKind::Invalid("chain.rpc_url".into(), "must not be empty".into()).into());
        }
        if self.responder.max_gas_price.is_zero() {
            return Err(ErrorKind::Invalid("responder.max_gas_price".into(), "must be positive".into()).into());
        }
        if self.cache.max_depth == 0 {
            return Err(ErrorKind::Invalid("cache.max_depth".into(), "must be positive".into()).into());
        }
        Ok(())
    }
}

/// The CLI surface: flags layered over a config file, covering only the
/// operator-facing knobs rather than a full flag set.
pub fn cli<'a, 'b>() -> App<'a, 'b> {
    App::new("pisa")
        .about("PISA accountable watching service")
        .arg(Arg::with_name("config").long("config").takes_value(true).help("Path to a TOML configuration file"))
        .arg(Arg::with_name("rpc-url").long("rpc-url").takes_value(true).help("Ethereum JSON-RPC endpoint"))
        .arg(Arg::with_name("chain-id").long("chain-id").takes_value(true))
        .arg(Arg::with_name("max-depth").long("max-depth").takes_value(true))
        .arg(Arg::with_name("signing-key").long("signing-key").takes_value(true))
        .arg(Arg::with_name("log").long("log").takes_value(true).help("Log level filter, e.g. info or pisa=debug"))
        .arg(Arg::with_name("log-no-color").long("log-no-color"))
}

/// Parses args, loads the named file (if any) or defaults, then applies
/// CLI overrides and validates.
pub fn load(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };
    config.apply_cli_overrides(matches)?;
    config.validate()?;
    Ok(config)
}
