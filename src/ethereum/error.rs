use std::path::PathBuf;

use alloy::primitives::U256;
use alloy::transports::TransportError;

/// Failures surfaced by contract operations.
///
/// Nothing here is retried automatically; every variant aborts the current
/// operation. The only retry loop in the crate is receipt polling, which
/// retries on "not yet mined" and never on an error.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("cannot find locally built contract artifact at {path:?}; please build the contracts first")]
    ArtifactNotFound { path: PathBuf },

    #[error("contract \"{0}\" has no module mapping in the project configuration")]
    UnknownContract(String),

    #[error("failed to fetch release artifact from {url}: {source}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot find address at index {index} ({count} addresses in key file)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("cannot find private key for address {address}")]
    KeyNotFound { address: String },

    #[error("malformed key file entry: {0}")]
    InvalidKeyEntry(String),

    #[error("gas estimation failed: {0}")]
    GasEstimationFailed(#[source] TransportError),

    #[error("insufficient balance to pay for the transaction (balance: {balance} wei; max cost: {max_cost} wei)")]
    InsufficientBalance { balance: U256, max_cost: U256 },

    #[error("transaction cancelled by operator")]
    UserCancelled,

    #[error("function \"{0}\" not found in contract ABI")]
    FunctionNotFound(String),

    #[error("no constructor found in contract ABI")]
    ConstructorNotFound,

    #[error("contract handle carries no deployment bytecode")]
    MissingBytecode,

    #[error("contract handle has no on-chain address")]
    MissingAddress,

    #[error("expected {expected} argument(s), got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("invalid argument for Solidity type {ty}: {reason}")]
    InvalidArgument { ty: String, reason: String },

    #[error("ABI encoding failed: {0}")]
    Abi(#[from] alloy::dyn_abi::Error),

    #[error("invalid RPC URL \"{url}\": {reason}")]
    InvalidRpcUrl { url: String, reason: String },

    #[error("failed to connect to JSON-RPC node at {url}: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("node exposes no managed accounts")]
    NoManagedAccounts,

    #[error("failed to sign transaction: {0}")]
    Signing(String),

    #[error("transport error: {0}")]
    Rpc(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed bytecode hex: {0}")]
    Hex(#[from] hex::FromHexError),
}
