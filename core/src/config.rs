use std::{collections::HashMap, env, path::Path, time::Duration};

use alloy::primitives::Address;
use config::{Config, File};
use relay_aa_types::{GasProfile, HashScheme};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    constants::{
        DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_MS,
        ENTRYPOINT_ADDRESS_V0_6,
    },
    error::RelayError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub targets: HashMap<String, DeploymentTarget>,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Everything the pipeline needs to know about one chain + relayer pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub chain_id: u64,
    pub rpc_url: Url,
    pub relayer_url: Url,
    pub backend_url: Url,
    /// Verifying contract for nonce and hash queries.
    #[serde(default = "default_entrypoint")]
    pub entrypoint_address: Address,
    #[serde(default)]
    pub paymaster: Option<PaymasterConfig>,
    /// Local hash layout. Derived from `entrypoint_address` when omitted.
    #[serde(default)]
    pub hash_scheme: Option<HashScheme>,
    #[serde(default)]
    pub gas: GasProfile,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub simulation_mode: bool,
    #[serde(default)]
    pub relayer_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymasterConfig {
    pub address: Address,
    #[serde(default)]
    pub mode: PaymasterMode,
    /// Length of the validity window in `AddressWithWindow` mode.
    #[serde(default = "default_validity_secs")]
    pub validity_secs: u64,
}

/// Layout of `paymasterAndData` the relayer of a target expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymasterMode {
    /// Exactly the 20 byte sponsor address.
    #[default]
    AddressOnly,
    /// Sponsor address followed by `abi.encode(uint48 validUntil, uint48 validAfter)`.
    AddressWithWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub pool_max_idle_per_host: usize,
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 32,
            connect_timeout_ms: 5_000,
        }
    }
}

impl HttpConfig {
    /// Build the connection pool shared by every relayer and backend client.
    pub fn build_client(&self) -> Result<reqwest::Client, RelayError> {
        reqwest::Client::builder()
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .build()
            .map_err(|e| RelayError::ConfigError {
                message: format!("Failed to build HTTP client: {e}"),
            })
    }
}

fn default_entrypoint() -> Address {
    ENTRYPOINT_ADDRESS_V0_6
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_validity_secs() -> u64 {
    3_600
}

impl DeploymentTarget {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Hash layout the local path must use to match `getUserOpHash` of the
    /// configured verifying contract. The canonical v0.6 entry point has no
    /// type hash word.
    pub fn hash_scheme(&self) -> HashScheme {
        match self.hash_scheme {
            Some(scheme) => scheme,
            None if self.entrypoint_address == ENTRYPOINT_ADDRESS_V0_6 => HashScheme::EntryPointV06,
            None => HashScheme::Typed,
        }
    }

    pub fn validate(&self, environment: Environment) -> Result<(), RelayError> {
        if self.simulation_mode && matches!(environment, Environment::Production) {
            return Err(RelayError::ConfigError {
                message: format!(
                    "simulation mode must not be enabled in production (chain {})",
                    self.chain_id
                ),
            });
        }

        if self.entrypoint_address == ENTRYPOINT_ADDRESS_V0_6
            && self.hash_scheme() != HashScheme::EntryPointV06
        {
            return Err(RelayError::ConfigError {
                message: format!(
                    "hash_scheme {:?} does not match the v0.6 entry point {}",
                    self.hash_scheme(),
                    self.entrypoint_address
                ),
            });
        }

        if self.poll.max_attempts == 0 {
            return Err(RelayError::ConfigError {
                message: "poll.max_attempts must be at least 1".to_string(),
            });
        }

        if self.request_timeout_ms == 0 {
            return Err(RelayError::ConfigError {
                message: "request_timeout_ms must be greater than zero".to_string(),
            });
        }

        if let Some(paymaster) = &self.paymaster {
            if paymaster.mode == PaymasterMode::AddressWithWindow && paymaster.validity_secs == 0 {
                return Err(RelayError::ConfigError {
                    message: "paymaster.validity_secs must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl RelayConfig {
    pub fn target(&self, name: &str) -> Result<&DeploymentTarget, RelayError> {
        self.targets
            .get(name)
            .ok_or_else(|| RelayError::ConfigError {
                message: format!("unknown deployment target `{name}`"),
            })
    }

    pub fn validate(&self, environment: Environment) -> Result<(), RelayError> {
        for (name, target) in &self.targets {
            target
                .validate(environment)
                .map_err(|e| RelayError::ConfigError {
                    message: format!("target `{name}`: {e}"),
                })?;
        }
        Ok(())
    }
}

/// Load `configuration/relay_base.yaml`, the environment specific overlay and
/// `APP__` prefixed environment variables, relative to the working directory.
pub fn load_config() -> Result<RelayConfig, RelayError> {
    let base_path = env::current_dir().map_err(|e| RelayError::ConfigError {
        message: format!("Failed to determine the current directory: {e}"),
    })?;

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(|message| RelayError::ConfigError { message })?;

    load_config_from(&base_path.join("configuration"), environment)
}

pub fn load_config_from(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<RelayConfig, RelayError> {
    let environment_filename = format!("relay_{}.yaml", environment.as_str());

    let config = Config::builder()
        .add_source(File::from(configuration_directory.join("relay_base.yaml")))
        .add_source(File::from(configuration_directory.join(environment_filename)).required(false))
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    let config = config.try_deserialize::<RelayConfig>()?;
    config.validate(environment)?;

    tracing::debug!(
        environment = environment.as_str(),
        targets = config.targets.len(),
        "Loaded relay configuration"
    );

    Ok(config)
}

/// The possible runtime environment for our application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local`, `development`, or `production`."
            )),
        }
    }
}
