use alloy::{
    primitives::Address,
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use tracing::debug;

use super::error::OpsError;

pub type HttpProvider = RootProvider<Http<Client>>;

/// Build an HTTP JSON-RPC provider for the given endpoint.
pub fn connect(url: &str) -> Result<HttpProvider, OpsError> {
    let endpoint = url.parse().map_err(|e| OpsError::InvalidRpcUrl {
        url: url.to_owned(),
        reason: format!("{e}"),
    })?;
    Ok(ProviderBuilder::new().on_http(endpoint))
}

/// Verify the node is reachable before any operation is attempted.
pub async fn ensure_connected(provider: &HttpProvider, url: &str) -> Result<(), OpsError> {
    let block = provider
        .get_block_number()
        .await
        .map_err(|source| OpsError::ConnectionFailed {
            url: url.to_owned(),
            source,
        })?;
    debug!("Connected to JSON-RPC node at {url} (block {block})");
    Ok(())
}

/// First account the node manages itself (`eth_accounts`), used when no key
/// file is supplied and the network signs on our behalf.
pub async fn first_managed_account(provider: &HttpProvider) -> Result<Address, OpsError> {
    let accounts = provider.get_accounts().await?;
    accounts.first().copied().ok_or(OpsError::NoManagedAccounts)
}
