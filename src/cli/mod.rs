//! Command-line interface definitions for the `burrow` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `burrow` binary.
#[derive(Debug, Parser)]
#[command(
    name = "burrow",
    version,
    about = "Turn a throwaway cloud VM into a personal PPTP VPN endpoint",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision the VM, install the VPN and optionally connect to it.
    #[command(name = "up", about = "Provision the VM and install the VPN server")]
    Up(UpCommand),
    /// Destroy the VM after confirmation.
    #[command(name = "down", about = "Destroy the VM after typing YES")]
    Down(ProviderArgs),
    /// List every VM on the provider account.
    #[command(name = "show", about = "List every VM on the provider account")]
    Show(ProviderArgs),
}

/// Provider selection shared by all subcommands.
#[derive(Debug, Args)]
pub(crate) struct ProviderArgs {
    /// Read this configuration file instead of discovering `burrow.toml`.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub(crate) config: Option<String>,
    /// Override the configured provider (`digitalocean` or `vultr`).
    #[arg(long, short = 'p', value_name = "PROVIDER")]
    pub(crate) provider: Option<String>,
    /// Override the API token or key of the selected provider.
    #[arg(long, short = 'k', value_name = "KEY")]
    pub(crate) api_key: Option<String>,
}

/// Arguments for the `burrow up` subcommand.
#[derive(Debug, Args)]
pub(crate) struct UpCommand {
    #[command(flatten)]
    pub(crate) target: ProviderArgs,
    /// Override the provider region (slug or datacentre identifier).
    #[arg(long, short = 'r', value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Override whether the local connect commands run after setup.
    #[arg(long, short = 'a', value_name = "BOOL")]
    pub(crate) autoconnect: Option<bool>,
    /// Skip the local connect commands even when autoconnect is enabled.
    #[arg(long, conflicts_with = "autoconnect")]
    pub(crate) no_connect: bool,
    /// Idle minutes before the self-destruct script destroys the VM.
    #[arg(long, short = 'i', value_name = "MINUTES")]
    pub(crate) idletime: Option<u32>,
    /// Uptime minutes before the self-destruct script destroys the VM.
    #[arg(long, short = 'u', value_name = "MINUTES")]
    pub(crate) uptime: Option<u32>,
}
