//! Command-line interface definitions.

use crate::logging::LogFormat;
use clap::{Args, Parser, Subcommand};
use eru_client::config::Settings;
use eru_client::deploy::Overrides;
use std::path::PathBuf;

/// erucli - deploy workloads to an Eru core.
#[derive(Parser, Debug)]
#[command(name = "erucli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Core address, e.g. https://core:5001
    #[arg(long, env = "ERU_CORE", global = true)]
    pub core: Option<String>,

    /// PEM file with the core's CA certificate
    #[arg(long, env = "ERU_CA_FILE", global = true)]
    pub ca_file: Option<PathBuf>,

    /// Bearer token sent to the core
    #[arg(long, env = "ERU_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "ERU_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy instances of an entrypoint from a spec document
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Spec document, a local path or an http(s) URL
    pub spec: String,

    /// Pod to deploy into
    #[arg(long)]
    pub pod: String,

    /// Entrypoint of the spec to run
    #[arg(long)]
    pub entry: String,

    /// Image to run
    #[arg(long)]
    pub image: String,

    /// Pin instances to this node
    #[arg(long, default_value = "")]
    pub node: String,

    /// Network to attach to, or a reserved mode like host
    #[arg(long, default_value = "")]
    pub network: String,

    /// CPU quota in cores
    #[arg(long, default_value_t = 1.0)]
    pub cpu: f64,

    /// Memory limit, e.g. 512MiB
    #[arg(long, default_value = "512MiB")]
    pub mem: bytesize::ByteSize,

    /// Environment variable as KEY=VALUE, can be repeated
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Number of instances
    #[arg(long, default_value_t = 1)]
    pub count: u32,
}

impl Cli {
    /// Connection settings from the flags, or from the environment when no core is given
    pub fn settings(&self) -> anyhow::Result<Settings> {
        match self.core.clone().filter(|core| !core.is_empty()) {
            Some(core) => Ok(Settings {
                core,
                ca_file: self.ca_file.clone(),
                token: self.token.clone(),
            }),
            None => Ok(Settings::from_env()?),
        }
    }
}

impl DeployArgs {
    pub fn overrides(&self) -> anyhow::Result<Overrides> {
        Ok(Overrides {
            pod: self.pod.clone(),
            node: self.node.clone(),
            entrypoint: self.entry.clone(),
            image: self.image.clone(),
            network: self.network.clone(),
            cpu_quota: self.cpu,
            memory: i64::try_from(self.mem.as_u64())?,
            env: self.env.clone(),
            count: self.count,
        })
    }
}
