mod config;
mod ethereum;

use std::path::Path;
use std::str::FromStr;

use alloy::{
    network::ReceiptResponse,
    primitives::{
        utils::{format_ether, parse_units},
        Address, U256,
    },
};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use tracing::{info, warn};

use config::ProjectConfig;
use ethereum::{
    contract::{self, CallOutcome},
    keys, provider,
    tx::{AutoApprove, ConfirmationPolicy, InteractivePrompt, TransactionOptions},
    Account,
};

const DEFAULT_RPC_URL: &str = "http://localhost:7545";

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("contract-ops")
        .version("0.1.0")
        .about("Deploy and invoke EVM smart contracts from build artifacts or release archives")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to the project configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose logging"),
        )
        .arg(
            Arg::new("http")
                .long("http")
                .value_name("URL")
                .default_value(DEFAULT_RPC_URL)
                .help("HTTP JSON-RPC endpoint URL"),
        )
        .arg(
            Arg::new("key-json")
                .long("key-json")
                .value_name("FILE")
                .help("Path to the key file; omit to use the node's first managed account"),
        )
        .arg(
            Arg::new("account")
                .long("account")
                .value_name("INDEX")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Index of the key-file account to use"),
        )
        .arg(
            Arg::new("release")
                .long("release")
                .value_name("TAG")
                .help("Use prebuilt artifacts for the given release tag instead of the local build"),
        )
        .arg(
            Arg::new("contract")
                .long("contract")
                .value_name("NAME")
                .help("Contract name"),
        )
        .arg(
            Arg::new("gas")
                .long("gas")
                .value_name("LIMIT")
                .value_parser(clap::value_parser!(u64))
                .help("Gas limit override (skips estimation)"),
        )
        .arg(
            Arg::new("value")
                .long("value")
                .value_name("AMOUNT")
                .default_value("0")
                .help("Value to send along with the transaction"),
        )
        .arg(
            Arg::new("value-unit")
                .long("value-unit")
                .value_name("UNIT")
                .value_parser(["ether", "gwei", "wei"])
                .default_value("wei")
                .help("Unit of the value amount"),
        )
        .arg(
            Arg::new("no-confirm")
                .long("no-confirm")
                .action(ArgAction::SetTrue)
                .help("Do not ask for confirmation before sending"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .action(ArgAction::SetTrue)
                .help("Print a sample project configuration file and exit"),
        )
        .subcommand(
            Command::new("deploy").about("Deploy a contract").arg(
                Arg::new("args")
                    .long("args")
                    .value_name("ARG")
                    .num_args(0..)
                    .help("Constructor arguments"),
            ),
        )
        .subcommand(
            Command::new("call")
                .about("Call a contract function")
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDRESS")
                        .required(true)
                        .help("Address of the contract to be called"),
                )
                .arg(
                    Arg::new("function")
                        .long("function")
                        .value_name("NAME")
                        .required(true)
                        .help("Function to call"),
                )
                .arg(
                    Arg::new("args")
                        .long("args")
                        .value_name("ARG")
                        .num_args(0..)
                        .help("Function arguments"),
                )
                .arg(
                    Arg::new("block")
                        .long("block")
                        .value_name("NUMBER")
                        .value_parser(clap::value_parser!(u64))
                        .help("Execute a read-only call against this historical block"),
                ),
        )
        .subcommand(
            Command::new("normalize-keys")
                .about("Rewrite a key file with checksummed addresses")
                .arg(
                    Arg::new("src")
                        .long("src")
                        .value_name("FILE")
                        .required(true)
                        .help("Key file to read"),
                )
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .value_name("FILE")
                        .required(true)
                        .help("Where to write the normalized key file"),
                ),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    if matches.get_flag("generate-config") {
        println!("{}", ProjectConfig::generate_sample());
        return Ok(());
    }

    if let Some(sub) = matches.subcommand_matches("normalize-keys") {
        let src = required_str(sub, "src")?;
        let dest = required_str(sub, "dest")?;
        keys::normalize_keys_file(Path::new(src), Path::new(dest)).await?;
        return Ok(());
    }

    if matches.subcommand_name().is_none() {
        return Err(anyhow!(
            "no operation specified; use deploy, call, or normalize-keys"
        ));
    }

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = ProjectConfig::load_or_default(config_path).await;

    let url = matches
        .get_one::<String>("http")
        .map(String::as_str)
        .unwrap_or(DEFAULT_RPC_URL);
    let provider = provider::connect(url)?;
    provider::ensure_connected(&provider, url).await?;

    let value = parse_value(
        matches.get_one::<String>("value").map(String::as_str).unwrap_or("0"),
        matches
            .get_one::<String>("value-unit")
            .map(String::as_str)
            .unwrap_or("wei"),
    )?;
    if value > U256::ZERO {
        warn!("Value to be sent: {} ether ({} wei)", format_ether(value), value);
    }

    let account = match matches.get_one::<String>("key-json") {
        Some(key_path) => {
            let index = matches.get_one::<usize>("account").copied().unwrap_or(0);
            keys::load_account(Path::new(key_path), index).await?
        }
        None => {
            let address = provider::first_managed_account(&provider).await?;
            info!("Using the node's managed account {address}");
            Account::managed(address)
        }
    };

    let confirmation: Box<dyn ConfirmationPolicy> = if matches.get_flag("no-confirm") {
        Box::new(AutoApprove)
    } else {
        Box::new(InteractivePrompt)
    };
    let options = TransactionOptions {
        gas_limit: matches.get_one::<u64>("gas").copied(),
        value,
        confirmation: confirmation.as_ref(),
    };

    let name = matches
        .get_one::<String>("contract")
        .ok_or_else(|| anyhow!("--contract is required for this operation"))?;
    let release = matches.get_one::<String>("release").map(String::as_str);

    match matches.subcommand() {
        Some(("deploy", sub)) => {
            let handle = contract::load_contract(&config, name, release, None).await?;
            let receipt = handle
                .deploy(&provider, &account, &string_args(sub), &options)
                .await?;
            match receipt.contract_address {
                Some(address) => println!("{address}"),
                None => warn!("Receipt carries no contract address"),
            }
        }
        Some(("call", sub)) => {
            let address = Address::from_str(required_str(sub, "address")?)
                .map_err(|e| anyhow!("invalid contract address: {e}"))?;
            let function = required_str(sub, "function")?;
            let block = sub.get_one::<u64>("block").copied();

            let handle = contract::load_contract(&config, name, release, Some(address)).await?;
            let outcome = handle
                .call(&provider, &account, function, &string_args(sub), &options, block)
                .await?;
            match outcome {
                CallOutcome::Value(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?)
                }
                CallOutcome::Receipt(receipt) => info!(
                    "Transaction {} included with status {}",
                    receipt.transaction_hash,
                    receipt.status()
                ),
            }
        }
        _ => return Err(anyhow!("no operation specified; use deploy, call, or normalize-keys")),
    }

    Ok(())
}

fn required_str<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing required argument --{id}"))
}

/// Parse a value amount with its unit into wei.
fn parse_value(amount: &str, unit: &str) -> Result<U256> {
    let parsed = parse_units(amount, unit)
        .map_err(|e| anyhow!("invalid value \"{amount} {unit}\": {e}"))?;
    Ok(parsed.get_absolute())
}

/// CLI arguments arrive as strings; coercion to ABI types happens against
/// the resolved interface.
fn string_args(matches: &ArgMatches) -> Vec<Value> {
    matches
        .get_many::<String>("args")
        .map(|values| values.map(|s| Value::String(s.clone())).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_units_convert_to_wei() {
        assert_eq!(parse_value("0", "wei").unwrap(), U256::ZERO);
        assert_eq!(parse_value("7", "wei").unwrap(), U256::from(7));
        assert_eq!(
            parse_value("1", "gwei").unwrap(),
            U256::from(1_000_000_000u64)
        );
        assert_eq!(
            parse_value("2", "ether").unwrap(),
            U256::from(2_000_000_000_000_000_000u64)
        );
        assert!(parse_value("abc", "wei").is_err());
    }
}
