pub mod abi;
pub mod artifact;
pub mod contract;
pub mod error;
pub mod keys;
pub mod provider;
pub mod tx;

pub use contract::{CallOutcome, ContractHandle};
pub use error::OpsError;
pub use keys::Account;
