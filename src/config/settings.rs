/*
* Provisioner configuration
* -------------------------
* Layers, lowest to highest priority:
*   1. hard-coded defaults below
*   2. <config dir>/default.toml (optional)
*   3. <config dir>/local.toml (optional)
*   4. PROVISIONER_* environment variables, nested keys split on "__"
*      (PROVISIONER_PLATFORM__URL, PROVISIONER_PROVISIONING__BATCH_SIZE, ...)
*   5. command line flags, applied by the cli module
*
* Secrets never live in these files. The platform password and the public
* SSH key are read from the environment variables *named* by
* `platform.password_env` and `provisioning.ssh_key_env`.
*/

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::provisioning::TopologyCounts;

pub const DEFAULT_PASSWORD_ENV: &str = "OV_PASS";
pub const DEFAULT_SSH_KEY_ENV: &str = "OV_SSH_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub platform: PlatformSettings,
    pub provisioning: ProvisioningSettings,
    pub topology: TopologyCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    pub password_env: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub batch_size: usize,
    pub num_of_iterations: usize,
    pub sleep_between_iterations_secs: u64,
    /// Interface whose address gets reported. oVirt guests usually call it eth0.
    pub primary_interface: String,
    pub ssh_key_env: String,
}

impl Settings {
    /// Loads from `config_dir`, or `CONFIG_PATH`, or `./config`.
    pub fn load(config_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match config_dir {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from(
                std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string()),
            ),
        };

        info!("Loading configuration from path: {}", config_path.display());

        let config = Config::builder()
            .set_default("platform.password_env", DEFAULT_PASSWORD_ENV)?
            .set_default("platform.request_timeout_secs", 60)?
            .set_default("provisioning.batch_size", 10)?
            .set_default("provisioning.num_of_iterations", 20)?
            .set_default("provisioning.sleep_between_iterations_secs", 5)?
            .set_default("provisioning.primary_interface", "eth0")?
            .set_default("provisioning.ssh_key_env", DEFAULT_SSH_KEY_ENV)?
            .set_default("topology.masters", 1)?
            .set_default("topology.infra", 2)?
            .set_default("topology.compute", 2)?
            .add_source(File::with_name(&format!("{}/default", config_path.display())).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path.display())).required(false))
            .add_source(
                Environment::with_prefix("PROVISIONER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

pub fn generate_default_config() -> Settings {
    Settings {
        platform: PlatformSettings {
            url: Some("https://engine.example.com/ovirt-engine/api".to_string()),
            user: Some("admin@internal".to_string()),
            ca_file: Some(PathBuf::from("/etc/pki/ovirt-engine/ca.pem")),
            password_env: DEFAULT_PASSWORD_ENV.to_string(),
            request_timeout_secs: 60,
        },
        provisioning: ProvisioningSettings {
            cluster: Some("Default".to_string()),
            template: Some("Blank".to_string()),
            batch_size: 10,
            num_of_iterations: 20,
            sleep_between_iterations_secs: 5,
            primary_interface: "eth0".to_string(),
            ssh_key_env: DEFAULT_SSH_KEY_ENV.to_string(),
        },
        topology: TopologyCounts::default(),
    }
}
