use std::sync::Arc;

use anyhow::Result;

use crate::config::RegistrarConfig;
use crate::registry::client::RegistryClient;
use crate::registry::transport::TlsTransport;

pub mod check;
pub mod serve;
pub mod status;

/// Build the production registry client from configuration.
pub(crate) fn build_client(config: &RegistrarConfig) -> Result<Arc<RegistryClient>> {
    let transport = TlsTransport::new(
        &config.registry.host,
        config.registry.port,
        &config.registry.tls,
    )?;
    let client = RegistryClient::new(&config.registry, Box::new(transport))?;
    Ok(Arc::new(client))
}
