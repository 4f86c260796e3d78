use std::path::Path;
use std::str::FromStr;

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::info;

use super::error::OpsError;

/// A sending account: an address plus, when locally managed, its signer.
///
/// `signer == None` means the node's own key management signs transactions
/// for this address (only meaningful for networks with unlocked accounts,
/// e.g. a local test network).
#[derive(Debug, Clone)]
pub struct Account {
    pub address: Address,
    pub signer: Option<PrivateKeySigner>,
}

impl Account {
    pub fn managed(address: Address) -> Self {
        Self {
            address,
            signer: None,
        }
    }
}

/// Test-network key file shape: an address list (map keys, in declared
/// order) and an address -> private key map.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    addresses: Map<String, Value>,
    private_keys: Map<String, Value>,
}

/// Load the Nth account, in file-declared order, from a key file.
///
/// The private-key lookup is case-insensitive so non-normalized key files
/// still resolve.
pub async fn load_account(path: &Path, index: usize) -> Result<Account, OpsError> {
    let keys: KeyFile = serde_json::from_str(&fs::read_to_string(path).await?)?;

    let count = keys.addresses.len();
    let address_text = keys
        .addresses
        .keys()
        .nth(index)
        .ok_or(OpsError::IndexOutOfRange { index, count })?;

    let private_hex = keys
        .private_keys
        .iter()
        .find(|(addr, _)| addr.eq_ignore_ascii_case(address_text))
        .and_then(|(_, key)| key.as_str())
        .ok_or_else(|| OpsError::KeyNotFound {
            address: address_text.clone(),
        })?;

    let address = Address::from_str(address_text).map_err(|e| {
        OpsError::InvalidKeyEntry(format!("invalid address \"{address_text}\": {e}"))
    })?;
    let signer = PrivateKeySigner::from_str(private_hex.trim_start_matches("0x"))
        .map_err(|e| OpsError::InvalidKeyEntry(format!("invalid private key for {address}: {e}")))?;

    info!("Using account {address} from {path:?}");
    Ok(Account {
        address,
        signer: Some(signer),
    })
}

/// Rewrite a key file with all address keys in EIP-55 checksum form.
///
/// Entry order is preserved, so running this on an already-normalized file
/// reproduces it byte for byte.
pub async fn normalize_keys_file(src: &Path, dest: &Path) -> Result<(), OpsError> {
    let keys: KeyFile = serde_json::from_str(&fs::read_to_string(src).await?)?;

    let addresses = keys
        .addresses
        .into_iter()
        .map(|(addr, value)| {
            let value = match value {
                Value::String(s) => Value::String(checksummed(&s)?),
                other => other,
            };
            Ok((checksummed(&addr)?, value))
        })
        .collect::<Result<Map<_, _>, OpsError>>()?;

    let private_keys = keys
        .private_keys
        .into_iter()
        .map(|(addr, key)| Ok((checksummed(&addr)?, key)))
        .collect::<Result<Map<_, _>, OpsError>>()?;

    let normalized = KeyFile {
        addresses,
        private_keys,
    };
    fs::write(dest, serde_json::to_string_pretty(&normalized)?).await?;
    info!("Wrote checksummed key file to {dest:?}");
    Ok(())
}

fn checksummed(address: &str) -> Result<String, OpsError> {
    let parsed = Address::from_str(address)
        .map_err(|e| OpsError::InvalidKeyEntry(format!("invalid address \"{address}\": {e}")))?;
    Ok(parsed.to_checksum(None))
}
