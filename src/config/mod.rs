//! Configuration loading via `ortho-config`.
//!
//! Three layered structures are loaded independently from the same
//! `burrow.toml`: [`BurrowConfig`] for the tool itself and one per provider
//! ([`DigitalOceanConfig`], [`VultrConfig`]). Each merges defaults, the file
//! and environment variables in that order of precedence. File keys are flat,
//! so `region` and `request_pacing_ms` apply to whichever provider is
//! selected.

mod local_file;

use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8Path;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::provider::ResourceDefaults;

pub use local_file::{expand_tilde, read_local_file};

/// Tool-wide settings loaded from `burrow.toml` and `BURROW_*` variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BURROW",
    discovery(
        app_name = "burrow",
        env_var = "BURROW_CONFIG_PATH",
        config_file_name = "burrow.toml",
        dotfile_name = ".burrow.toml",
        project_file_name = "burrow.toml"
    )
)]
pub struct BurrowConfig {
    /// Provider to use, `digitalocean` or `vultr`.
    #[ortho_config(default = "digitalocean".to_owned())]
    pub provider: String,
    /// Name used for both the SSH key and the virtual machine.
    #[ortho_config(default = "burrow".to_owned())]
    pub resource_name: String,
    /// Private key used for SSH and SCP. Supports `~/` expansion.
    #[ortho_config(default = "~/.ssh/id_rsa".to_owned())]
    pub ssh_private_key: String,
    /// Public key registered with the provider. Supports `~/` expansion.
    #[ortho_config(default = "~/.ssh/id_rsa.pub".to_owned())]
    pub ssh_public_key: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Whether to run the local connect command after setup.
    #[ortho_config(default = false)]
    pub autoconnect: bool,
    /// Local commands run on autoconnect, one argument list per command.
    /// Arguments may use `$IP`, `$USER` and `$PASS`.
    #[serde(default)]
    #[ortho_config(default = Vec::new(), skip_cli)]
    pub connect_command: Vec<Vec<String>>,
    /// Local script uploaded to the machine and started in the background
    /// with the idle and uptime limits as arguments.
    pub self_destruct_script: Option<String>,
    /// Idle minutes passed to the self-destruct script.
    #[ortho_config(default = 15)]
    pub max_idle_minutes: u32,
    /// Uptime minutes passed to the self-destruct script.
    #[ortho_config(default = 360)]
    pub max_uptime_minutes: u32,
    /// Overall limit for each wait phase; waits forever when unset.
    pub poll_timeout_secs: Option<u64>,
}

/// DigitalOcean settings loaded from `burrow.toml` and the
/// `DIGITALOCEAN_*` variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DIGITALOCEAN",
    discovery(
        app_name = "burrow",
        env_var = "BURROW_CONFIG_PATH",
        config_file_name = "burrow.toml",
        dotfile_name = ".burrow.toml",
        project_file_name = "burrow.toml"
    )
)]
pub struct DigitalOceanConfig {
    /// Personal access token sent as a bearer token.
    #[ortho_config(default = String::new())]
    pub api_token: String,
    /// Region slug for new droplets.
    #[ortho_config(default = "ams3".to_owned())]
    pub region: String,
    /// Size slug for new droplets.
    #[ortho_config(default = "s-1vcpu-1gb".to_owned())]
    pub size: String,
    /// Image slug for new droplets.
    #[ortho_config(default = "ubuntu-22-04-x64".to_owned())]
    pub image: String,
    /// Pause before every API request, in milliseconds.
    #[ortho_config(default = 0)]
    pub request_pacing_ms: u64,
}

/// Vultr settings loaded from `burrow.toml` and the `VULTR_*` variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VULTR",
    discovery(
        app_name = "burrow",
        env_var = "BURROW_CONFIG_PATH",
        config_file_name = "burrow.toml",
        dotfile_name = ".burrow.toml",
        project_file_name = "burrow.toml"
    )
)]
pub struct VultrConfig {
    /// API key sent as the `api_key` query parameter.
    #[ortho_config(default = String::new())]
    pub api_key: String,
    /// Datacentre identifier (`DCID`).
    #[ortho_config(default = "9".to_owned())]
    pub region: String,
    /// Plan identifier (`VPSPLANID`).
    #[ortho_config(default = "201".to_owned())]
    pub plan: String,
    /// Operating system identifier (`OSID`).
    #[ortho_config(default = "270".to_owned())]
    pub os: String,
    /// Pause before every API request, in milliseconds. Vultr rate limits
    /// accounts to two requests per second.
    #[ortho_config(default = 500)]
    pub request_pacing_ms: u64,
}

/// Supported providers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderKind {
    /// DigitalOcean API v2.
    DigitalOcean,
    /// Vultr API v1.
    Vultr,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "digitalocean" | "do" => Ok(Self::DigitalOcean),
            "vultr" => Ok(Self::Vultr),
            other => Err(ConfigError::UnknownProvider(other.to_owned())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DigitalOcean => "digitalocean",
            Self::Vultr => "vultr",
        })
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to burrow.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

fn parse_error(err: &ortho_config::OrthoError) -> ConfigError {
    ConfigError::Parse(err.to_string())
}

/// Arguments handed to the generated loaders: the binary name and, when an
/// explicit file is requested, the hidden `--config-path` flag.
fn loader_args(config_path: Option<&Utf8Path>) -> Vec<OsString> {
    let mut args = vec![OsString::from("burrow")];
    if let Some(path) = config_path {
        args.push(OsString::from("--config-path"));
        args.push(OsString::from(path.as_str()));
    }
    args
}

impl BurrowConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, reading `config_path` instead of discovering
    /// `burrow.toml` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the file is missing or the merge
    /// fails.
    pub fn load_from(config_path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        Self::load_from_iter(loader_args(config_path)).map_err(|err| parse_error(&err))
    }

    /// Checks required fields and the provider name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank values and
    /// [`ConfigError::UnknownProvider`] for an unsupported provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider_kind()?;
        require_field(
            &self.resource_name,
            &FieldMetadata::new("resource name", "BURROW_RESOURCE_NAME", "resource_name"),
        )?;
        require_field(
            &self.ssh_private_key,
            &FieldMetadata::new("SSH private key", "BURROW_SSH_PRIVATE_KEY", "ssh_private_key"),
        )?;
        require_field(
            &self.ssh_public_key,
            &FieldMetadata::new("SSH public key", "BURROW_SSH_PUBLIC_KEY", "ssh_public_key"),
        )?;
        require_field(
            &self.ssh_user,
            &FieldMetadata::new("SSH user", "BURROW_SSH_USER", "ssh_user"),
        )?;
        require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh executable", "BURROW_SSH_BIN", "ssh_bin"),
        )?;
        require_field(
            &self.scp_bin,
            &FieldMetadata::new("scp executable", "BURROW_SCP_BIN", "scp_bin"),
        )
    }

    /// Resolves the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProvider`] for unsupported names.
    pub fn provider_kind(&self) -> Result<ProviderKind, ConfigError> {
        self.provider.parse()
    }

    /// Returns the configured connect commands, skipping empty entries.
    #[must_use]
    pub fn connect_commands(&self) -> Vec<Vec<String>> {
        self.connect_command
            .iter()
            .filter(|args| !args.is_empty())
            .cloned()
            .collect()
    }

    /// Returns the per-phase wait limit, if any.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }
}

impl DigitalOceanConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, reading `config_path` instead of discovering
    /// `burrow.toml` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the file is missing or the merge
    /// fails.
    pub fn load_from(config_path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        Self::load_from_iter(loader_args(config_path)).map_err(|err| parse_error(&err))
    }

    /// Checks that the token and creation defaults are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the blank field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.api_token,
            &FieldMetadata::new("DigitalOcean API token", "DIGITALOCEAN_API_TOKEN", "api_token"),
        )?;
        require_field(
            &self.region,
            &FieldMetadata::new("DigitalOcean region", "DIGITALOCEAN_REGION", "region"),
        )?;
        require_field(
            &self.size,
            &FieldMetadata::new("DigitalOcean size", "DIGITALOCEAN_SIZE", "size"),
        )?;
        require_field(
            &self.image,
            &FieldMetadata::new("DigitalOcean image", "DIGITALOCEAN_IMAGE", "image"),
        )
    }

    /// Returns the creation defaults for new droplets.
    #[must_use]
    pub fn defaults(&self) -> ResourceDefaults {
        ResourceDefaults {
            image: self.image.clone(),
            size: self.size.clone(),
            region: self.region.clone(),
        }
    }
}

impl VultrConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, reading `config_path` instead of discovering
    /// `burrow.toml` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the file is missing or the merge
    /// fails.
    pub fn load_from(config_path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        Self::load_from_iter(loader_args(config_path)).map_err(|err| parse_error(&err))
    }

    /// Checks that the key and creation defaults are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the blank field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.api_key,
            &FieldMetadata::new("Vultr API key", "VULTR_API_KEY", "api_key"),
        )?;
        require_field(
            &self.region,
            &FieldMetadata::new("Vultr datacentre", "VULTR_REGION", "region"),
        )?;
        require_field(
            &self.plan,
            &FieldMetadata::new("Vultr plan", "VULTR_PLAN", "plan"),
        )?;
        require_field(&self.os, &FieldMetadata::new("Vultr OS", "VULTR_OS", "os"))
    }

    /// Returns the creation defaults for new servers.
    #[must_use]
    pub fn defaults(&self) -> ResourceDefaults {
        ResourceDefaults {
            image: self.os.clone(),
            size: self.plan.clone(),
            region: self.region.clone(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the provider name is not supported.
    #[error("unknown provider `{0}`: expected digitalocean or vultr")]
    UnknownProvider(String),
    /// Raised when a key file or script cannot be read.
    #[error("failed to read {path}: {message}")]
    LocalFile {
        /// Path after tilde expansion.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        parse_error(&value)
    }
}
