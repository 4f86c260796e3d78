use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Project configuration: where build artifacts live, where releases are
/// published, and which build module each contract belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root of the local contract build output.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Release artifact URL template with `{version}` and `{contract}`
    /// placeholders.
    #[serde(default)]
    pub release_url: String,
    /// Contract name -> build module directory.
    #[serde(default)]
    pub contracts: HashMap<String, String>,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            release_url: String::new(),
            contracts: HashMap::new(),
        }
    }
}

impl ProjectConfig {
    /// Load configuration from a TOML file.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration with fallback to default.
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Generate a sample configuration file.
    pub fn generate_sample() -> String {
        let sample = r#"# contract-ops project configuration

# Root of the local contract build output.
build_dir = "build"

# Release artifact URL template; {version} and {contract} are substituted.
release_url = "https://github.com/example/project/releases/download/{version}/{contract}"

# Contract name -> build module directory under build_dir.
[contracts]
Registry = "core"
Greeter = "tests"
"#;
        sample.to_string()
    }
}
