use eyre::{Result, WrapErr};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;

use crate::redact::Redacted;
use crate::types::SourceChain;
use crate::watcher::ScanConfig;

/// Default relay API base URL
pub const DEFAULT_RELAY_API_URL: &str = "https://api.gelato.digital";

/// GelatoRelay1BalanceERC2771 forwarder trusted by the bridge token
pub const DEFAULT_RELAY_FORWARDER: &str = "0xd8253782c45a12053594b9deB72d8e8aB2Fca54c";

/// Configuration errors, raised before any network call is made
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Secret {0} is not defined")]
    MissingSecret(String),

    #[error("Invalid chain listened '{0}', use arbitrumSepolia or optimismSepolia")]
    InvalidChain(String),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where secrets come from.
///
/// Production reads the process environment; tests hand in a map.
pub trait SecretSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Secrets read from environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Main configuration for the relayer
#[derive(Debug, Clone)]
pub struct Config {
    pub relay: RelayConfig,
    /// Chain whose burns are relayed
    pub source_chain: SourceChain,
    pub arbitrum: ChainEndpoint,
    pub optimism: ChainEndpoint,
    /// Explicit mint destination for handed-over logs
    /// (`CONTRACT_ADDRESS_TO_MINT_ON` / `PROVIDER_TO_MINT_ON_URL`)
    pub mint_override: Option<ChainEndpoint>,
    /// Cursor store; only the polling commands need it
    pub database: Option<DatabaseConfig>,
    pub scan: ScanConfig,
    pub watch: WatchConfig,
    pub log_format: LogFormat,
}

/// Relay service credentials
#[derive(Clone)]
pub struct RelayConfig {
    pub api_key: String,
    pub api_url: String,
    /// Relayer signing key, hex with or without 0x
    pub private_key: String,
    pub forwarder_address: String,
}

/// Custom Debug that redacts the API key and the private key.
impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_key", &Redacted(&self.api_key))
            .field("api_url", &self.api_url)
            .field("private_key", &Redacted(&self.private_key))
            .field("forwarder_address", &self.forwarder_address)
            .finish()
    }
}

/// Token contract and RPC endpoint of one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub contract_address: String,
    pub rpc_url: String,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &Redacted(&self.url))
            .finish()
    }
}

/// Settings for the long-running `watch` command
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    pub health_port: u16,
}

/// Output format of the tracing subscriber (`LOG_FORMAT`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                reason: format!("'{}' is not one of text, json", other),
            }),
        }
    }
}

fn default_poll_interval() -> u64 {
    60_000
}

fn default_health_port() -> u16 {
    9099
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Ok(Self::from_secrets(&EnvSecrets)?)
    }

    /// Resolve every setting through `secrets`
    pub fn from_secrets<S: SecretSource + ?Sized>(secrets: &S) -> Result<Self, ConfigError> {
        let require = |key: &str| -> Result<String, ConfigError> {
            secrets
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingSecret(key.to_string()))
        };
        let optional = |key: &str| secrets.get(key).filter(|v| !v.trim().is_empty());

        let relay = RelayConfig {
            api_key: require("RELAY_API_KEY")?,
            private_key: require("PRIVATE_KEY")?,
            api_url: optional("RELAY_API_URL")
                .unwrap_or_else(|| DEFAULT_RELAY_API_URL.to_string()),
            forwarder_address: optional("RELAY_FORWARDER_ADDRESS")
                .unwrap_or_else(|| DEFAULT_RELAY_FORWARDER.to_string()),
        };

        let source_chain: SourceChain = require("CHAIN_LISTENED")?.parse()?;

        let arbitrum = ChainEndpoint {
            contract_address: require("ARBITRUM_SEP_CONTRACT_ADDRESS")?,
            rpc_url: require("ARBITRUM_SEP_RPC_URL")?,
        };
        let optimism = ChainEndpoint {
            contract_address: require("OPTIMISM_SEP_CONTRACT_ADDRESS")?,
            rpc_url: require("OPTIMISM_SEP_RPC_URL")?,
        };

        let mint_override = match (
            optional("CONTRACT_ADDRESS_TO_MINT_ON"),
            optional("PROVIDER_TO_MINT_ON_URL"),
        ) {
            (Some(contract_address), Some(rpc_url)) => Some(ChainEndpoint {
                contract_address,
                rpc_url,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "CONTRACT_ADDRESS_TO_MINT_ON",
                    reason: "must be set together with PROVIDER_TO_MINT_ON_URL".to_string(),
                })
            }
        };

        let database = optional("DATABASE_URL").map(|url| DatabaseConfig { url });

        let defaults = ScanConfig::default();
        let scan = ScanConfig {
            max_range: parse_or("SCAN_MAX_RANGE", optional("SCAN_MAX_RANGE"), defaults.max_range)?,
            max_requests: parse_or(
                "SCAN_MAX_REQUESTS",
                optional("SCAN_MAX_REQUESTS"),
                defaults.max_requests,
            )?,
            default_offset: parse_or(
                "SCAN_DEFAULT_OFFSET",
                optional("SCAN_DEFAULT_OFFSET"),
                defaults.default_offset,
            )?,
        };

        let watch = WatchConfig {
            poll_interval_ms: parse_or(
                "POLL_INTERVAL_MS",
                optional("POLL_INTERVAL_MS"),
                default_poll_interval(),
            )?,
            health_port: parse_or(
                "HEALTH_PORT",
                optional("HEALTH_PORT"),
                default_health_port(),
            )?,
        };

        let log_format = match optional("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        let config = Config {
            relay,
            source_chain,
            arbitrum,
            optimism,
            mint_override,
            database,
            scan,
            watch,
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        validate_address("ARBITRUM_SEP_CONTRACT_ADDRESS", &self.arbitrum.contract_address)?;
        validate_address("OPTIMISM_SEP_CONTRACT_ADDRESS", &self.optimism.contract_address)?;
        validate_address("RELAY_FORWARDER_ADDRESS", &self.relay.forwarder_address)?;
        if let Some(ref target) = self.mint_override {
            validate_address("CONTRACT_ADDRESS_TO_MINT_ON", &target.contract_address)?;
        }

        let key = self.relay.private_key.trim_start_matches("0x");
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::Invalid {
                key: "PRIVATE_KEY",
                reason: "must be 64 hex chars (0x prefix optional)".to_string(),
            });
        }

        if self.scan.max_range == 0 {
            return Err(ConfigError::Invalid {
                key: "SCAN_MAX_RANGE",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.scan.max_requests == 0 {
            return Err(ConfigError::Invalid {
                key: "SCAN_MAX_REQUESTS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Endpoint settings for `chain`
    pub fn endpoint(&self, chain: SourceChain) -> &ChainEndpoint {
        match chain {
            SourceChain::ArbitrumSepolia => &self.arbitrum,
            SourceChain::OptimismSepolia => &self.optimism,
        }
    }

    /// Chain that mints for the listened chain
    pub fn mint_chain(&self) -> SourceChain {
        self.source_chain.counterpart()
    }

    /// Where burns are read from
    pub fn burn_endpoint(&self) -> &ChainEndpoint {
        self.endpoint(self.source_chain)
    }

    /// Where mints are relayed to when polling
    pub fn mint_endpoint(&self) -> &ChainEndpoint {
        self.endpoint(self.mint_chain())
    }

    /// Where mints for a handed-over log are relayed to
    pub fn event_mint_endpoint(&self) -> &ChainEndpoint {
        self.mint_override
            .as_ref()
            .unwrap_or_else(|| self.mint_endpoint())
    }

    /// Database URL, required by the commands that touch the cursor
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .as_ref()
            .map(|db| db.url.as_str())
            .ok_or_else(|| ConfigError::MissingSecret("DATABASE_URL".to_string()))
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a valid number", v),
        }),
        None => Ok(default),
    }
}

fn validate_address(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.len() != 42
        || !value.starts_with("0x")
        || !value[2..].chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be a valid hex address (42 chars with 0x prefix)".to_string(),
        });
    }
    Ok(())
}
