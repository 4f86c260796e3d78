use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info};

use super::{abi::ContractInterface, error::OpsError};
use crate::config::ProjectConfig;

/// A contract's resolved interface and deployment bytecode.
#[derive(Debug, Clone)]
pub struct ContractArtifacts {
    pub interface: ContractInterface,
    pub bytecode: Vec<u8>,
}

/// Resolve a contract's `.abi`/`.bin` artifact pair.
///
/// With a release tag the artifacts are fetched from the configured release
/// URL; otherwise they come from the local build directory. Resolution is
/// idempotent and performs no writes.
pub async fn resolve(
    config: &ProjectConfig,
    contract: &str,
    release: Option<&str>,
) -> Result<ContractArtifacts, OpsError> {
    let (abi_text, bin_text) = match release {
        Some(tag) => fetch_release(config, tag, contract).await?,
        None => load_local(config, contract).await?,
    };

    let interface = ContractInterface::parse(&abi_text)?;
    debug!(
        "Parsed interface for \"{contract}\" ({} bytes of ABI JSON)",
        interface.raw_json().len()
    );
    let bytecode = decode_bytecode(&bin_text)?;
    Ok(ContractArtifacts {
        interface,
        bytecode,
    })
}

async fn load_local(
    config: &ProjectConfig,
    contract: &str,
) -> Result<(String, String), OpsError> {
    let module = config
        .contracts
        .get(contract)
        .ok_or_else(|| OpsError::UnknownContract(contract.to_owned()))?;
    let module_dir = config.build_dir.join(module);

    let abi_text = read_artifact(module_dir.join(format!("{contract}.abi"))).await?;
    let bin_text = read_artifact(module_dir.join(format!("{contract}.bin"))).await?;
    Ok((abi_text, bin_text))
}

async fn read_artifact(path: PathBuf) -> Result<String, OpsError> {
    if !path.is_file() {
        return Err(OpsError::ArtifactNotFound { path });
    }
    debug!("Reading contract artifact from {path:?}");
    Ok(fs::read_to_string(&path).await?)
}

async fn fetch_release(
    config: &ProjectConfig,
    release: &str,
    contract: &str,
) -> Result<(String, String), OpsError> {
    let client = reqwest::Client::new();
    let abi_url = release_url(&config.release_url, release, &format!("{contract}.abi"));
    let bin_url = release_url(&config.release_url, release, &format!("{contract}.bin"));

    let abi_text = fetch_artifact(&client, &abi_url).await?;
    let bin_text = fetch_artifact(&client, &bin_url).await?;
    Ok((abi_text, bin_text))
}

/// Substitute `{version}` and `{contract}` into the release URL template.
fn release_url(template: &str, version: &str, artifact: &str) -> String {
    template
        .replace("{version}", version)
        .replace("{contract}", artifact)
}

async fn fetch_artifact(client: &reqwest::Client, url: &str) -> Result<String, OpsError> {
    info!("Fetching contract artifact from {url}");
    let fetch_error = |source| OpsError::FetchError {
        url: url.to_owned(),
        source,
    };

    let response = client.get(url).send().await.map_err(fetch_error)?;
    let response = response.error_for_status().map_err(fetch_error)?;
    response.text().await.map_err(fetch_error)
}

fn decode_bytecode(text: &str) -> Result<Vec<u8>, OpsError> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    Ok(hex::decode(digits)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn test_config(build_dir: PathBuf) -> ProjectConfig {
        ProjectConfig {
            build_dir,
            release_url:
                "https://example.org/project/releases/download/{version}/{contract}".into(),
            contracts: HashMap::from([("Greeter".to_string(), "greetings".to_string())]),
        }
    }

    #[test]
    fn release_url_templating() {
        let url = release_url(
            "https://example.org/releases/{version}/{contract}",
            "v1.2.0",
            "Greeter.abi",
        );
        assert_eq!(url, "https://example.org/releases/v1.2.0/Greeter.abi");
    }

    #[test]
    fn bytecode_decoding_tolerates_prefix_and_whitespace() {
        assert_eq!(decode_bytecode("0x6001600155\n").unwrap(), vec![0x60, 0x01, 0x60, 0x01, 0x55]);
        assert_eq!(decode_bytecode("6001").unwrap(), vec![0x60, 0x01]);
        assert!(matches!(decode_bytecode("zz"), Err(OpsError::Hex(_))));
    }

    #[tokio::test]
    async fn resolves_local_artifacts() {
        let dir = tempdir().unwrap();
        let module_dir = dir.path().join("greetings");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            module_dir.join("Greeter.abi"),
            r#"[{"type":"constructor","stateMutability":"nonpayable","inputs":[]}]"#,
        )
        .unwrap();
        std::fs::write(module_dir.join("Greeter.bin"), "0x6001\n").unwrap();

        let config = test_config(dir.path().to_path_buf());
        let artifacts = resolve(&config, "Greeter", None).await.unwrap();
        assert_eq!(artifacts.bytecode, vec![0x60, 0x01]);
        assert!(artifacts.interface.constructor().is_ok());
    }

    #[tokio::test]
    async fn missing_artifact_instructs_operator_to_build() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf());

        let err = resolve(&config, "Greeter", None).await.unwrap_err();
        let message = err.to_string();
        match err {
            OpsError::ArtifactNotFound { path } => {
                assert!(path.ends_with("greetings/Greeter.abi"));
                assert!(message.contains("build the contracts first"));
            }
            other => panic!("expected ArtifactNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_contract_has_no_module_mapping() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf());

        let err = resolve(&config, "Unmapped", None).await.unwrap_err();
        assert!(matches!(err, OpsError::UnknownContract(name) if name == "Unmapped"));
    }
}
