use alloy::{
    dyn_abi::FunctionExt,
    json_abi::StateMutability,
    network::TransactionBuilder,
    primitives::{Address, Bytes, U256},
    providers::Provider,
    rpc::types::{TransactionReceipt, TransactionRequest},
};
use serde_json::Value;
use tracing::{debug, info};

use super::{
    abi::{self, ContractInterface},
    artifact,
    error::OpsError,
    keys::Account,
    provider::HttpProvider,
    tx::{self, TransactionOptions},
};
use crate::config::ProjectConfig;

/// A contract the caller can deploy or invoke.
///
/// The address is absent until deployment; the pipeline never mutates a
/// handle, it only reads from it and returns receipts carrying the new
/// address.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    interface: ContractInterface,
    address: Option<Address>,
    bytecode: Option<Vec<u8>>,
}

/// What a call produced: a decoded value for read-only functions, a mined
/// receipt for state-changing ones.
#[derive(Debug)]
pub enum CallOutcome {
    Value(Value),
    Receipt(TransactionReceipt),
}

/// Resolve a contract's artifacts and wrap them in a handle.
///
/// With an address the handle points at an existing deployment; without
/// one it is ready to deploy.
pub async fn load_contract(
    config: &ProjectConfig,
    name: &str,
    release: Option<&str>,
    address: Option<Address>,
) -> Result<ContractHandle, OpsError> {
    let artifacts = artifact::resolve(config, name, release).await?;
    debug!(
        "Resolved contract \"{name}\": {} ABI items",
        artifacts.interface.abi().len()
    );
    Ok(match address {
        Some(address) => ContractHandle::at(artifacts.interface, address),
        None => ContractHandle::deployable(artifacts.interface, artifacts.bytecode),
    })
}

impl ContractHandle {
    pub fn deployable(interface: ContractInterface, bytecode: Vec<u8>) -> Self {
        Self {
            interface,
            address: None,
            bytecode: Some(bytecode),
        }
    }

    pub fn at(interface: ContractInterface, address: Address) -> Self {
        Self {
            interface,
            address: Some(address),
            bytecode: None,
        }
    }

    /// Deploy this contract and await the receipt.
    ///
    /// A value attached to a non-payable constructor is dropped rather than
    /// sent. The receipt's `contract_address` is the new deployment.
    pub async fn deploy(
        &self,
        provider: &HttpProvider,
        account: &Account,
        args: &[Value],
        options: &TransactionOptions<'_>,
    ) -> Result<TransactionReceipt, OpsError> {
        let bytecode = self.bytecode.as_deref().ok_or(OpsError::MissingBytecode)?;
        let constructor = self.interface.constructor()?;
        let payable = constructor.state_mutability == StateMutability::Payable;
        let value = effective_value(payable, options.value);

        let mut deploy_data = bytecode.to_vec();
        deploy_data.extend(abi::constructor_args(constructor, args)?);
        let request = TransactionRequest::default().with_deploy_code(Bytes::from(deploy_data));

        let receipt = tx::execute_transaction(
            provider,
            account,
            request,
            options.gas_limit,
            value,
            options.confirmation,
        )
        .await?;

        if let Some(deployed) = receipt.contract_address {
            info!("Contract deployed at {deployed}");
        }
        Ok(receipt)
    }

    /// Invoke a function by name.
    ///
    /// Read-only functions execute as an `eth_call` (optionally against a
    /// historical block) and return the decoded value directly; no gas, no
    /// fees, no signature, no receipt. Everything else runs the full
    /// transaction pipeline, with a value on a non-payable function dropped
    /// rather than sent.
    pub async fn call(
        &self,
        provider: &HttpProvider,
        account: &Account,
        function_name: &str,
        args: &[Value],
        options: &TransactionOptions<'_>,
        block: Option<u64>,
    ) -> Result<CallOutcome, OpsError> {
        let function = self.interface.function(function_name)?;
        let address = self.address.ok_or(OpsError::MissingAddress)?;
        let calldata = abi::function_calldata(function, args)?;

        if abi::is_read_only(function) {
            info!("Calling view function \"{function_name}\"");
            let request = TransactionRequest::default()
                .from(account.address)
                .to(address)
                .input(calldata.into());
            let pending = provider.call(&request);
            let raw = match block {
                Some(number) => pending.block(number.into()).await?,
                None => pending.await?,
            };
            let decoded = function.abi_decode_output(&raw, false)?;
            return Ok(CallOutcome::Value(abi::decoded_to_json(&decoded)));
        }

        let payable = function.state_mutability == StateMutability::Payable;
        let value = effective_value(payable, options.value);
        let request = TransactionRequest::default()
            .to(address)
            .input(calldata.into());

        let receipt = tx::execute_transaction(
            provider,
            account,
            request,
            options.gas_limit,
            value,
            options.confirmation,
        )
        .await?;
        Ok(CallOutcome::Receipt(receipt))
    }
}

fn effective_value(payable: bool, requested: U256) -> U256 {
    if payable {
        requested
    } else {
        U256::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::tx::AutoApprove;

    const SAMPLE_ABI: &str = r#"[
        {"type":"constructor","stateMutability":"nonpayable","inputs":[]},
        {"type":"function","name":"register","stateMutability":"nonpayable",
         "inputs":[],"outputs":[]}
    ]"#;

    fn interface() -> ContractInterface {
        ContractInterface::parse(SAMPLE_ABI).unwrap()
    }

    fn options() -> TransactionOptions<'static> {
        TransactionOptions {
            gas_limit: None,
            value: U256::ZERO,
            confirmation: &AutoApprove,
        }
    }

    // Port 1 is never served; these tests must fail before any RPC call.
    fn offline_provider() -> HttpProvider {
        crate::ethereum::provider::connect("http://127.0.0.1:1").unwrap()
    }

    #[test]
    fn non_payable_values_are_dropped() {
        assert_eq!(effective_value(false, U256::from(7)), U256::ZERO);
        assert_eq!(effective_value(true, U256::from(7)), U256::from(7));
        assert_eq!(effective_value(false, U256::ZERO), U256::ZERO);
    }

    #[tokio::test]
    async fn deploy_requires_bytecode() {
        let handle = ContractHandle::at(interface(), Address::ZERO);
        let err = handle
            .deploy(&offline_provider(), &Account::managed(Address::ZERO), &[], &options())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::MissingBytecode));
    }

    #[tokio::test]
    async fn call_requires_an_address() {
        let handle = ContractHandle::deployable(interface(), vec![0x60, 0x01]);
        let err = handle
            .call(
                &offline_provider(),
                &Account::managed(Address::ZERO),
                "register",
                &[],
                &options(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::MissingAddress));
    }

    #[tokio::test]
    async fn unknown_function_fails_before_any_network_traffic() {
        let handle = ContractHandle::at(interface(), Address::ZERO);
        let err = handle
            .call(
                &offline_provider(),
                &Account::managed(Address::ZERO),
                "unsubscribe",
                &[],
                &options(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::FunctionNotFound(name) if name == "unsubscribe"));
    }
}
