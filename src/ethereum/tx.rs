use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{
        utils::{format_ether, format_units},
        TxHash, U256,
    },
    providers::Provider,
    rpc::types::{TransactionReceipt, TransactionRequest},
};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{error::OpsError, keys::Account, provider::HttpProvider};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Caller-facing knobs for one transaction.
pub struct TransactionOptions<'a> {
    /// Explicit gas limit; skips estimation entirely when set. The escape
    /// hatch for functions whose cost depends on state mutated earlier in
    /// the same batch, where estimation is unreliable.
    pub gas_limit: Option<u64>,
    /// Value to attach, in wei. Zeroed by the invoker for non-payable
    /// targets before it reaches the pipeline.
    pub value: U256,
    pub confirmation: &'a dyn ConfirmationPolicy,
}

/// Dynamic-fee parameters for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Pad a network gas estimate with a 10% safety margin, rounding up.
pub fn padded_gas_limit(estimate: u64) -> u64 {
    estimate.saturating_mul(11).div_ceil(10)
}

/// Fee parameters from current network conditions.
///
/// The max fee doubles the current base fee so the transaction survives
/// base-fee increases while pending. The priority fee is 2% of that doubled
/// base fee, floored by the node's own suggestion so the transaction is
/// never under-tipped relative to network consensus.
pub fn dynamic_fees(base_fee_per_gas: u128, suggested_priority_fee: u128) -> FeeParams {
    let max_fee_per_gas = base_fee_per_gas.saturating_mul(2);
    let floor = max_fee_per_gas / 100;
    FeeParams {
        max_fee_per_gas,
        max_priority_fee_per_gas: floor.max(suggested_priority_fee),
    }
}

/// Worst-case cost figures for the balance check and confirmation display.
#[derive(Debug, Clone)]
pub struct CostEstimate {
    pub gas_limit: u64,
    pub base_fee_per_gas: u128,
    pub fees: FeeParams,
    pub value: U256,
    pub balance: U256,
}

impl CostEstimate {
    /// Fee at the current base fee.
    pub fn fee(&self) -> U256 {
        U256::from(self.base_fee_per_gas) * U256::from(self.gas_limit)
    }

    pub fn cost(&self) -> U256 {
        self.fee() + self.value
    }

    /// Worst-case fee if the full max fee and tip are charged.
    pub fn max_fee(&self) -> U256 {
        (U256::from(self.fees.max_fee_per_gas) + U256::from(self.fees.max_priority_fee_per_gas))
            * U256::from(self.gas_limit)
    }

    pub fn max_cost(&self) -> U256 {
        self.max_fee() + self.value
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gas limit:            {}", self.gas_limit)?;
        writeln!(f, "Base fee / gas:       {} Gwei", in_gwei(U256::from(self.base_fee_per_gas)))?;
        writeln!(f, "Fee:                  {} Gwei", in_gwei(self.fee()))?;
        writeln!(f, "Max fee / gas:        {} Gwei", in_gwei(U256::from(self.fees.max_fee_per_gas)))?;
        writeln!(f, "Max prior. fee / gas: {} Gwei", in_gwei(U256::from(self.fees.max_priority_fee_per_gas)))?;
        writeln!(f, "Max fee:              {} Gwei", in_gwei(self.max_fee()))?;
        writeln!(f, "Value:                {} Ether", format_ether(self.value))?;
        writeln!(f)?;
        writeln!(f, "Cost:                 {} Ether", format_ether(self.cost()))?;
        writeln!(f, "Max cost:             {} Ether", format_ether(self.max_cost()))?;
        writeln!(f)?;
        writeln!(f, "Balance:              {} Ether", format_ether(self.balance))?;
        writeln!(
            f,
            "After balance:        {} Ether",
            format_ether(self.balance.saturating_sub(self.cost()))
        )?;
        write!(
            f,
            "Min. after balance:   {} Ether",
            format_ether(self.balance.saturating_sub(self.max_cost()))
        )
    }
}

fn in_gwei(amount: U256) -> String {
    format_units(amount, "gwei").unwrap_or_else(|_| format!("{amount} wei"))
}

/// Fail before signing if the worst-case cost exceeds the sender's balance.
pub fn ensure_affordable(estimate: &CostEstimate) -> Result<(), OpsError> {
    let max_cost = estimate.max_cost();
    if max_cost > estimate.balance {
        return Err(OpsError::InsufficientBalance {
            balance: estimate.balance,
            max_cost,
        });
    }
    Ok(())
}

/// Last checkpoint before an irreversible transaction is dispatched.
pub trait ConfirmationPolicy {
    fn authorize(&self, estimate: &CostEstimate) -> Result<(), OpsError>;
}

/// Dispatch unconditionally (non-interactive operation).
pub struct AutoApprove;

impl ConfirmationPolicy for AutoApprove {
    fn authorize(&self, _estimate: &CostEstimate) -> Result<(), OpsError> {
        Ok(())
    }
}

/// Show the full cost breakdown and block for an explicit "yes".
pub struct InteractivePrompt;

impl ConfirmationPolicy for InteractivePrompt {
    fn authorize(&self, estimate: &CostEstimate) -> Result<(), OpsError> {
        println!("{estimate}");
        print!("Confirm transaction? (please type \"yes\", case insensitive): ");
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if is_affirmative(&answer) {
            Ok(())
        } else {
            Err(OpsError::UserCancelled)
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Price, validate, sign, submit, and await one transaction.
///
/// With a signer: estimate (unless overridden), compute dynamic fees, check
/// affordability, pass the confirmation gate, sign locally, and broadcast
/// the raw payload. Without one, the node prices and signs with its own
/// managed key. Either way the call blocks until the network reports the
/// transaction included.
pub async fn execute_transaction(
    provider: &HttpProvider,
    account: &Account,
    mut request: TransactionRequest,
    gas_limit: Option<u64>,
    value: U256,
    confirmation: &dyn ConfirmationPolicy,
) -> Result<TransactionReceipt, OpsError> {
    request = request.from(account.address).value(value);

    let gas_limit = match gas_limit {
        Some(limit) => {
            debug!("Using caller-supplied gas limit {limit}");
            limit
        }
        None => {
            let estimate = provider
                .estimate_gas(&request)
                .await
                .map_err(OpsError::GasEstimationFailed)?;
            let padded = padded_gas_limit(estimate);
            info!("Estimated gas: {estimate} (padded to {padded})");
            padded
        }
    };
    debug!("Gas: {gas_limit}; Value: {value}");

    let nonce = provider.get_transaction_count(account.address).await?;
    let chain_id = provider.get_chain_id().await?;
    request = request
        .with_nonce(nonce)
        .with_chain_id(chain_id)
        .with_gas_limit(gas_limit);

    let tx_hash = match &account.signer {
        Some(signer) => {
            let base_fee = provider.get_gas_price().await?;
            let suggested = provider.get_max_priority_fee_per_gas().await?;
            let fees = dynamic_fees(base_fee, suggested);
            debug!(
                "Base fee: {base_fee}; max fee per gas: {}; max priority fee per gas: {}",
                fees.max_fee_per_gas, fees.max_priority_fee_per_gas
            );
            request = request
                .with_max_fee_per_gas(fees.max_fee_per_gas)
                .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

            let balance = provider.get_balance(account.address).await?;
            let estimate = CostEstimate {
                gas_limit,
                base_fee_per_gas: base_fee,
                fees,
                value,
                balance,
            };
            ensure_affordable(&estimate)?;
            confirmation.authorize(&estimate)?;

            info!(
                "Signing transaction with max cost of {} wei",
                estimate.max_cost()
            );
            let wallet = EthereumWallet::from(signer.clone());
            let envelope = request
                .build(&wallet)
                .await
                .map_err(|e| OpsError::Signing(e.to_string()))?;
            let pending = provider
                .send_raw_transaction(&envelope.encoded_2718())
                .await?;
            *pending.tx_hash()
        }
        None => {
            // The node signs with its own managed key and picks the fees.
            let pending = provider.send_transaction(request).await?;
            *pending.tx_hash()
        }
    };
    info!("Transaction {tx_hash} submitted; awaiting inclusion");

    let receipt = await_receipt(provider, tx_hash).await?;
    if let Ok(json) = serde_json::to_string_pretty(&receipt) {
        debug!("Transaction receipt: {json}");
    }

    let after = provider.get_balance(account.address).await?;
    info!("Balance after transaction: {} ether", format_ether(after));

    Ok(receipt)
}

/// Poll until the transaction is included. "Not yet mined" retries forever
/// at a fixed interval; the caller imposes any deadline by cancelling.
/// Hard RPC errors abort immediately.
async fn await_receipt(
    provider: &HttpProvider,
    tx_hash: TxHash,
) -> Result<TransactionReceipt, OpsError> {
    loop {
        if let Some(receipt) = provider.get_transaction_receipt(tx_hash).await? {
            return Ok(receipt);
        }
        sleep(RECEIPT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_padding_rounds_up() {
        assert_eq!(padded_gas_limit(21000), 23100);
        assert_eq!(padded_gas_limit(1), 2);
        assert_eq!(padded_gas_limit(95), 105);
        assert_eq!(padded_gas_limit(0), 0);
    }

    #[test]
    fn fee_computation_is_deterministic() {
        let fees = dynamic_fees(100, 1);
        assert_eq!(fees.max_fee_per_gas, 200);
        assert_eq!(fees.max_priority_fee_per_gas, 2);
    }

    #[test]
    fn suggested_priority_fee_dominates_the_floor() {
        let fees = dynamic_fees(100, 5);
        assert_eq!(fees.max_priority_fee_per_gas, 5);

        let fees = dynamic_fees(10_000, 1);
        assert_eq!(fees.max_priority_fee_per_gas, 200);
    }

    fn estimate_with_balance(balance: u64) -> CostEstimate {
        CostEstimate {
            gas_limit: 1,
            base_fee_per_gas: 50,
            fees: FeeParams {
                max_fee_per_gas: 60,
                max_priority_fee_per_gas: 40,
            },
            value: U256::from(1),
            balance: U256::from(balance),
        }
    }

    #[test]
    fn balance_guard_rejects_unaffordable_transactions() {
        // max cost = (60 + 40) * 1 + 1 = 101
        let estimate = estimate_with_balance(100);
        let err = ensure_affordable(&estimate).unwrap_err();
        match err {
            OpsError::InsufficientBalance { balance, max_cost } => {
                assert_eq!(balance, U256::from(100));
                assert_eq!(max_cost, U256::from(101));
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
    }

    #[test]
    fn balance_guard_passes_at_the_boundary() {
        let estimate = estimate_with_balance(101);
        assert!(ensure_affordable(&estimate).is_ok());
    }

    #[test]
    fn only_an_exact_yes_confirms() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("  Yes\n"));
        assert!(!is_affirmative("y"));
        assert!(!is_affirmative("yes please"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn auto_approve_never_blocks() {
        let estimate = estimate_with_balance(1_000);
        assert!(AutoApprove.authorize(&estimate).is_ok());
    }

    #[test]
    fn breakdown_lists_the_worst_case_figures() {
        let rendered = estimate_with_balance(1_000).to_string();
        assert!(rendered.contains("Gas limit:            1"));
        assert!(rendered.contains("Max cost:"));
        assert!(rendered.contains("Min. after balance:"));
    }
}
