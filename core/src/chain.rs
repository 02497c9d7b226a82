use std::{collections::HashMap, sync::Arc};

use alloy::providers::ProviderBuilder;

use crate::{
    config::{DeploymentTarget, RelayConfig},
    entrypoint::{EntryPoint, EntryPointReader},
    error::RelayError,
    rpc_clients::{BackendClient, BundlerClient, RecordBackend, SimulationMode},
};

/// Collaborators of one deployment target.
pub trait Chain: Send + Sync {
    type Reader: EntryPointReader;
    type Backend: RecordBackend;

    fn chain_id(&self) -> u64;
    fn target(&self) -> &DeploymentTarget;

    fn entrypoint(&self) -> &Self::Reader;
    fn bundler_client(&self) -> &BundlerClient;
    fn backend(&self) -> &Self::Backend;
}

#[derive(Debug, Clone)]
pub struct RelayChain {
    target: DeploymentTarget,
    entrypoint: EntryPoint,
    bundler_client: BundlerClient,
    backend: BackendClient,
}

impl Chain for RelayChain {
    type Reader = EntryPoint;
    type Backend = BackendClient;

    fn chain_id(&self) -> u64 {
        self.target.chain_id
    }

    fn target(&self) -> &DeploymentTarget {
        &self.target
    }

    fn entrypoint(&self) -> &EntryPoint {
        &self.entrypoint
    }

    fn bundler_client(&self) -> &BundlerClient {
        &self.bundler_client
    }

    fn backend(&self) -> &BackendClient {
        &self.backend
    }
}

impl RelayChain {
    /// Wire up the clients of `target`. Relayer and backend share `http`.
    pub fn from_target(target: &DeploymentTarget, http: reqwest::Client) -> Result<Self, RelayError> {
        let timeout = target.request_timeout();

        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(target.rpc_url.clone());

        let entrypoint = EntryPoint {
            address: target.entrypoint_address,
            chain_id: target.chain_id,
            rpc_url: target.rpc_url.to_string(),
            provider,
            timeout,
        };

        let simulation = if target.simulation_mode {
            SimulationMode::Enabled
        } else {
            SimulationMode::Disabled
        };

        let mut bundler_client = BundlerClient::new(http.clone(), target.relayer_url.clone(), timeout)
            .with_simulation_mode(simulation);
        if let Some(api_key) = &target.relayer_api_key {
            bundler_client = bundler_client.with_api_key(api_key)?;
        }

        let backend = BackendClient::new(http, target.backend_url.clone(), timeout);

        Ok(Self {
            target: target.clone(),
            entrypoint,
            bundler_client,
            backend,
        })
    }
}

pub trait ChainService {
    fn get_chain(&self, name: &str) -> Result<Arc<RelayChain>, RelayError>;
}

/// Every configured target, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct RelayChains {
    chains: HashMap<String, Arc<RelayChain>>,
}

impl RelayChains {
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let http = config.http.build_client()?;

        let chains = config
            .targets
            .iter()
            .map(|(name, target)| {
                let chain = RelayChain::from_target(target, http.clone())?;
                tracing::info!(
                    deployment = %name,
                    chain_id = target.chain_id,
                    entrypoint = ?target.entrypoint_address,
                    "Configured deployment target"
                );
                Ok((name.clone(), Arc::new(chain)))
            })
            .collect::<Result<HashMap<_, _>, RelayError>>()?;

        Ok(Self { chains })
    }
}

impl ChainService for RelayChains {
    fn get_chain(&self, name: &str) -> Result<Arc<RelayChain>, RelayError> {
        self.chains
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::ConfigError {
                message: format!("unknown deployment target `{name}`"),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::{Environment, load_config_from};

    #[test]
    fn chains_are_built_per_configured_target() {
        let directory = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configuration");
        let config = load_config_from(&directory, Environment::Local).unwrap();
        let chains = RelayChains::from_config(&config).unwrap();

        let amoy = chains.get_chain("amoy").unwrap();
        assert_eq!(amoy.chain_id(), 80_002);
        assert_eq!(amoy.entrypoint().address(), amoy.target().entrypoint_address);
        assert_eq!(
            amoy.bundler_client().simulation_mode(),
            SimulationMode::Enabled
        );

        assert!(matches!(
            chains.get_chain("mainnet"),
            Err(RelayError::ConfigError { .. })
        ));
    }
}
