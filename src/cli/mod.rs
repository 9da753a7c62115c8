/*
* Command line surface
* --------------------
* cluster-vm-provisioner
* ├── provision        create/start the cluster VMs and print their addresses
* │   └── --info       only resolve and print addresses of an existing cluster
* ├── clusters         list cluster prefixes that have VMs on the engine
* ├── stale-clusters   entries under a mountpoint whose cluster is gone
* └── init             write config/default.toml
*
* stdout carries only machine-readable output (the MASTER_IP/INFRA_IPS/
* NODE_IPS lines, cluster names). Everything else goes to stderr.
*/

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::cluster;
use crate::config::Settings;
use crate::core::ovirt::OvirtConnectOptions;
use crate::core::{BootstrapConfig, OvirtClient, Platform};
use crate::errors::ProvisionError;
use crate::provisioning::{
    AddressReport, ClusterTopology, CreationTarget, PollBudget, ProvisionOptions, Provisioner,
};

#[derive(Parser, Debug)]
#[command(name = "cluster-vm-provisioner")]
#[command(about = "Creates the VMs of an OpenShift test cluster on oVirt", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml / local.toml
    #[arg(short, long, value_name = "DIR", global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, start and report the cluster VMs
    Provision(ProvisionArgs),
    /// List cluster prefixes present on the engine
    Clusters(PlatformArgs),
    /// Print entries under a mountpoint that belong to no live cluster
    StaleClusters {
        #[command(flatten)]
        platform: PlatformArgs,
        /// Path to the NFS PV mount
        #[arg(long)]
        mountpoint: PathBuf,
    },
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct PlatformArgs {
    /// The url pointing to the oVirt Engine API end point
    #[arg(long)]
    pub ovirt_url: Option<String>,
    /// The user to authenticate with the oVirt Engine
    #[arg(long)]
    pub ovirt_user: Option<String>,
    /// CA pem file used to verify the engine certificate
    #[arg(long)]
    pub ovirt_ca_pem_file: Option<PathBuf>,
    /// Env variable holding the password for the oVirt Engine
    #[arg(long, value_name = "ENV_VAR")]
    pub ovirt_pass: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub platform: PlatformArgs,
    /// Prefix for all the created VM names
    #[arg(long)]
    pub name_prefix: String,
    /// Cluster to create the VMs in
    #[arg(long)]
    pub ovirt_cluster: Option<String>,
    /// Template to create the VMs from
    #[arg(long)]
    pub ovirt_template: Option<String>,
    /// Only obtain the IPs of an existing cluster
    #[arg(long)]
    pub info: bool,
    #[arg(long)]
    pub masters: Option<u32>,
    #[arg(long)]
    pub infra_nodes: Option<u32>,
    #[arg(long)]
    pub nodes: Option<u32>,
    /// Env variable holding the public SSH key passed to cloud-init
    #[arg(long, value_name = "ENV_VAR")]
    pub pub_sshkey: Option<String>,
    /// Polling budget for each long VM operation
    #[arg(long)]
    pub num_of_iterations: Option<usize>,
    /// Number of VMs to create concurrently
    #[arg(long)]
    pub block_size: Option<usize>,
    /// Seconds to sleep between iterations and blocks
    #[arg(long)]
    pub sleep_between_iterations: Option<u64>,
    /// Interface whose IPv4 address is reported
    #[arg(long)]
    pub primary_interface: Option<String>,
}

impl PlatformArgs {
    /// Folds the flags over the loaded settings.
    fn apply(&self, settings: &mut Settings) {
        let platform = &mut settings.platform;
        if let Some(url) = &self.ovirt_url {
            platform.url = Some(url.clone());
        }
        if let Some(user) = &self.ovirt_user {
            platform.user = Some(user.clone());
        }
        if let Some(ca) = &self.ovirt_ca_pem_file {
            platform.ca_file = Some(ca.clone());
        }
        if let Some(var) = &self.ovirt_pass {
            platform.password_env = var.clone();
        }
    }
}

impl ProvisionArgs {
    fn apply(&self, settings: &mut Settings) {
        self.platform.apply(settings);
        let p = &mut settings.provisioning;
        if let Some(cluster) = &self.ovirt_cluster {
            p.cluster = Some(cluster.clone());
        }
        if let Some(template) = &self.ovirt_template {
            p.template = Some(template.clone());
        }
        if let Some(var) = &self.pub_sshkey {
            p.ssh_key_env = var.clone();
        }
        if let Some(n) = self.num_of_iterations {
            p.num_of_iterations = n;
        }
        if let Some(n) = self.block_size {
            p.batch_size = n;
        }
        if let Some(secs) = self.sleep_between_iterations {
            p.sleep_between_iterations_secs = secs;
        }
        if let Some(iface) = &self.primary_interface {
            p.primary_interface = iface.clone();
        }
        let t = &mut settings.topology;
        if let Some(n) = self.masters {
            t.masters = n;
        }
        if let Some(n) = self.infra_nodes {
            t.infra = n;
        }
        if let Some(n) = self.nodes {
            t.compute = n;
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { force } => handle_init_command(cli.config.as_deref(), force),
        Commands::Provision(args) => {
            let mut settings = load_settings(cli.config.as_deref())?;
            args.apply(&mut settings);
            handle_provision_command(&args, &settings).await
        }
        Commands::Clusters(args) => {
            let mut settings = load_settings(cli.config.as_deref())?;
            args.apply(&mut settings);
            handle_clusters_command(&settings, None).await
        }
        Commands::StaleClusters {
            platform,
            mountpoint,
        } => {
            let mut settings = load_settings(cli.config.as_deref())?;
            platform.apply(&mut settings);
            handle_clusters_command(&settings, Some(&mountpoint)).await
        }
    }
}

fn load_settings(config_dir: Option<&Path>) -> Result<Settings> {
    Settings::load(config_dir).context("failed to load configuration")
}

/// Value of the environment variable *named* by `var`.
fn env_secret(var: &str, option: &str) -> Result<String, ProvisionError> {
    std::env::var(var).map_err(|_| {
        ProvisionError::Config(format!(
            "No env var named '{}' was found, see option '{}'",
            var, option
        ))
    })
}

fn connect_options(settings: &Settings) -> Result<OvirtConnectOptions, ProvisionError> {
    let platform = &settings.platform;
    let missing = |what: &str| ProvisionError::Config(format!("{} is required", what));
    Ok(OvirtConnectOptions {
        url: platform.url.clone().ok_or_else(|| missing("--ovirt-url"))?,
        user: platform.user.clone().ok_or_else(|| missing("--ovirt-user"))?,
        ca_file: platform
            .ca_file
            .clone()
            .ok_or_else(|| missing("--ovirt-ca-pem-file"))?,
        password: env_secret(&platform.password_env, "--ovirt-pass")?,
        request_timeout: Duration::from_secs(platform.request_timeout_secs),
    })
}

fn provision_options(settings: &Settings, info_only: bool) -> Result<ProvisionOptions, ProvisionError> {
    let p = &settings.provisioning;
    // Cluster, template and key only matter for machines we create or start.
    let creation = if info_only {
        None
    } else {
        let missing = |what: &str| ProvisionError::Config(format!("{} is required", what));
        Some(CreationTarget {
            cluster: p.cluster.clone().ok_or_else(|| missing("--ovirt-cluster"))?,
            template: p.template.clone().ok_or_else(|| missing("--ovirt-template"))?,
            bootstrap: BootstrapConfig {
                authorized_ssh_keys: env_secret(&p.ssh_key_env, "--pub-sshkey")?,
            },
        })
    };

    Ok(ProvisionOptions {
        creation,
        batch_size: p.batch_size,
        budget: PollBudget {
            iterations: p.num_of_iterations,
            settle_delay: Duration::from_secs(p.sleep_between_iterations_secs),
        },
        primary_interface: p.primary_interface.clone(),
    })
}

/// Releases the session whatever `result` is.
async fn close_after<T>(client: &OvirtClient, result: Result<T>) -> Result<T> {
    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close oVirt session");
    }
    result
}

async fn handle_provision_command(args: &ProvisionArgs, settings: &Settings) -> Result<()> {
    let prefix = args.name_prefix.trim();
    if prefix.is_empty() {
        return Err(ProvisionError::Config("Prefix can't be empty".into()).into());
    }

    // Everything is validated before the first platform call.
    let options = provision_options(settings, args.info)?;
    options.validate()?;
    let connect = connect_options(settings)?;

    let topology = ClusterTopology::new(prefix, settings.topology);
    info!(machines = ?topology.names(), "Cluster topology");

    let client = OvirtClient::connect(&connect)
        .await
        .context("failed to connect to the oVirt engine")?;

    let result = run_pipeline(&client, options, &topology, args.info).await;
    let report = close_after(&client, result).await?;
    print!("{}", report);
    Ok(())
}

async fn run_pipeline<P: Platform + ?Sized>(
    platform: &P,
    options: ProvisionOptions,
    topology: &ClusterTopology,
    info_only: bool,
) -> Result<AddressReport> {
    let provisioner = Provisioner::new(platform, options)?;
    if info_only {
        return Ok(provisioner.info(topology).await?);
    }

    let outcome = provisioner.provision(topology).await?;
    eprintln!(
        "{} {} VMs ready ({} created, {} started)",
        "✓".green(),
        outcome.addresses.len(),
        outcome.created.len(),
        outcome.startup.started.len()
    );
    Ok(outcome.report)
}

async fn handle_clusters_command(settings: &Settings, mountpoint: Option<&Path>) -> Result<()> {
    let connect = connect_options(settings)?;
    let entries = match mountpoint {
        Some(dir) => Some(read_dir_names(dir)?),
        None => None,
    };

    let client = OvirtClient::connect(&connect)
        .await
        .context("failed to connect to the oVirt engine")?;
    let result = cluster::discover_clusters(&client)
        .await
        .map_err(anyhow::Error::from);
    let live = close_after(&client, result).await?;

    match entries {
        Some(entries) => println!("{}", cluster::stale_clusters(&live, entries).join(" ")),
        None => {
            for name in &live {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn read_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let name = entry?.file_name();
        let name = name
            .into_string()
            .map_err(|raw| anyhow!("non UTF-8 entry {:?} in {}", raw, dir.display()))?;
        names.push(name);
    }
    Ok(names)
}

fn handle_init_command(config_dir: Option<&Path>, force: bool) -> Result<()> {
    let config_dir = config_dir.unwrap_or_else(|| Path::new("config"));
    let target = config_dir.join("default.toml");
    if target.exists() && !force {
        warn!("{} already exists. Use --force to overwrite.", target.display());
        return Ok(());
    }

    std::fs::create_dir_all(config_dir)?;
    let default_config = crate::config::generate_default_config();
    let config_str = toml::to_string_pretty(&default_config)?;
    std::fs::write(&target, config_str)?;

    eprintln!("{} Default configuration written to {}", "✓".green(), target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::generate_default_config;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "cluster-vm-provisioner",
            "provision",
            "--name-prefix",
            "demo",
            "--ovirt-cluster",
            "Lab",
            "--masters",
            "3",
            "--block-size",
            "4",
            "--sleep-between-iterations",
            "1",
            "--primary-interface",
            "ens3",
        ]);
        let Commands::Provision(args) = cli.command else {
            panic!("expected provision");
        };
        let mut settings = generate_default_config();
        args.apply(&mut settings);
        assert_eq!(settings.provisioning.cluster.as_deref(), Some("Lab"));
        assert_eq!(settings.provisioning.template.as_deref(), Some("Blank"));
        assert_eq!(settings.provisioning.batch_size, 4);
        assert_eq!(settings.provisioning.sleep_between_iterations_secs, 1);
        assert_eq!(settings.provisioning.primary_interface, "ens3");
        assert_eq!(settings.topology.masters, 3);
        assert_eq!(settings.topology.infra, 2);
    }

    #[test]
    fn missing_secret_env_is_a_config_error() {
        let err = env_secret("PROVISIONER_TEST_SURELY_UNSET_VAR", "--ovirt-pass").unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
        assert!(err.to_string().contains("PROVISIONER_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn info_mode_needs_no_cluster_or_key() {
        let mut settings = generate_default_config();
        settings.provisioning.cluster = None;
        settings.provisioning.template = None;
        settings.provisioning.ssh_key_env = "PROVISIONER_TEST_SURELY_UNSET_VAR".into();
        let info = provision_options(&settings, true).unwrap();
        assert!(info.creation.is_none());
        assert!(info.validate().is_ok());
        assert!(provision_options(&settings, false).is_err());
    }

    #[test]
    fn provision_mode_carries_cluster_and_template() {
        let mut settings = generate_default_config();
        settings.provisioning.cluster = Some("Lab".into());
        settings.provisioning.ssh_key_env = "PROVISIONER_TEST_KEY_FOR_CREATION".into();
        std::env::set_var("PROVISIONER_TEST_KEY_FOR_CREATION", "ssh-rsa AAAA ci");
        let options = provision_options(&settings, false).unwrap();
        let target = options.creation.expect("creation target");
        assert_eq!(target.cluster, "Lab");
        assert_eq!(target.template, "Blank");
        assert_eq!(target.bootstrap.authorized_ssh_keys, "ssh-rsa AAAA ci");
    }

    #[tokio::test]
    async fn empty_prefix_is_rejected_before_connecting() {
        let cli = Cli::parse_from(["cluster-vm-provisioner", "provision", "--name-prefix", "  "]);
        let Commands::Provision(args) = cli.command else {
            panic!("expected provision");
        };
        let err = handle_provision_command(&args, &generate_default_config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Prefix can't be empty"));
    }
}
