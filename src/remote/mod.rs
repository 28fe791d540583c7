//! Remote command execution and file upload over SSH.
//!
//! Commands shell out to the system `ssh` and `scp` binaries through a
//! [`CommandRunner`], so tests can script outcomes without a network.

mod runner;

use std::ffi::OsString;
use std::io::Write;
use std::net::Ipv4Addr;

use camino::Utf8Path;
use thiserror::Error;
use tracing::debug;

use crate::config::{BurrowConfig, expand_tilde};

pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError, run_blocking};

/// Default SSH port.
pub const SSH_PORT: u16 = 22;

/// Permissions applied to uploaded files.
pub const UPLOAD_MODE: &str = "0750";

/// Connection settings for the remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteSettings {
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    pub scp_bin: String,
    /// Remote user.
    pub user: String,
    /// Private key file, already tilde-expanded.
    pub identity_file: String,
    /// SSH port.
    pub port: u16,
}

impl RemoteSettings {
    /// Derives settings from the tool configuration.
    #[must_use]
    pub fn from_config(config: &BurrowConfig) -> Self {
        Self {
            ssh_bin: config.ssh_bin.clone(),
            scp_bin: config.scp_bin.clone(),
            user: config.ssh_user.clone(),
            identity_file: expand_tilde(&config.ssh_private_key),
            port: SSH_PORT,
        }
    }
}

/// Raised when a remote command or upload fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("`{command}` failed: {cause}: {stderr}")]
pub struct RemoteExecError {
    /// Command that was run remotely, or the upload description.
    pub command: String,
    /// Captured standard error, trimmed.
    pub stderr: String,
    /// Exit status or spawn failure.
    pub cause: String,
}

/// Runs commands on a remote host using `ssh` and `scp`.
#[derive(Clone, Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    settings: RemoteSettings,
    runner: R,
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor.
    #[must_use]
    pub const fn new(settings: RemoteSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Returns the connection settings.
    #[must_use]
    pub const fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Runs `command` remotely and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteExecError`] when `ssh` cannot start or the command
    /// exits unsuccessfully.
    pub async fn run(&self, address: Ipv4Addr, command: &str) -> Result<String, RemoteExecError> {
        debug!(%address, command, "running remote command");
        let args = self.ssh_args(address, command);
        let output = run_blocking(&self.runner, &self.settings.ssh_bin, args)
            .await
            .map_err(|err| spawn_failure(command, &err))?;
        check(command, output)
    }

    /// Runs `command` remotely and copies its standard output to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteExecError`] when the command fails or the output
    /// cannot be written.
    pub async fn call<W: Write>(
        &self,
        address: Ipv4Addr,
        command: &str,
        output: &mut W,
    ) -> Result<(), RemoteExecError> {
        let stdout = self.run(address, command).await?;
        output
            .write_all(stdout.as_bytes())
            .map_err(|err| RemoteExecError {
                command: command.to_owned(),
                stderr: String::new(),
                cause: format!("failed to write output: {err}"),
            })
    }

    /// Copies a local file into the remote user's home directory and marks it
    /// executable for the owner and group.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteExecError`] when the copy or the `chmod` fails.
    pub async fn upload(
        &self,
        address: Ipv4Addr,
        local: &Utf8Path,
        remote_name: &str,
    ) -> Result<(), RemoteExecError> {
        let description = format!("upload {local} to {remote_name}");
        debug!(%address, %local, remote_name, "uploading file");
        let args = self.scp_args(address, local, remote_name);
        let output = run_blocking(&self.runner, &self.settings.scp_bin, args)
            .await
            .map_err(|err| spawn_failure(&description, &err))?;
        check(&description, output)?;
        let chmod = format!(
            "chmod {UPLOAD_MODE} {}",
            shell_escape::unix::escape(remote_name.into())
        );
        self.run(address, &chmod).await.map(|_| ())
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if !self.settings.identity_file.trim().is_empty() {
            args.push(OsString::from("-i"));
            args.push(OsString::from(&self.settings.identity_file));
        }
        for option in [
            "BatchMode=yes",
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "ConnectTimeout=10",
            "LogLevel=ERROR",
        ] {
            args.push(OsString::from("-o"));
            args.push(OsString::from(option));
        }
        args
    }

    fn ssh_args(&self, address: Ipv4Addr, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.settings.port.to_string()),
        ];
        args.extend(self.common_options());
        args.push(OsString::from(format!("{}@{address}", self.settings.user)));
        args.push(OsString::from(command));
        args
    }

    fn scp_args(&self, address: Ipv4Addr, local: &Utf8Path, remote_name: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-P"),
            OsString::from(self.settings.port.to_string()),
        ];
        args.extend(self.common_options());
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(format!(
            "{}@{address}:{remote_name}",
            self.settings.user
        )));
        args
    }
}

fn spawn_failure(command: &str, err: &SpawnError) -> RemoteExecError {
    RemoteExecError {
        command: command.to_owned(),
        stderr: String::new(),
        cause: err.to_string(),
    }
}

fn check(command: &str, output: CommandOutput) -> Result<String, RemoteExecError> {
    if output.is_success() {
        return Ok(output.stdout);
    }
    Err(RemoteExecError {
        command: command.to_owned(),
        cause: output.status_text(),
        stderr: output.stderr.trim().to_owned(),
    })
}

#[cfg(test)]
mod tests;
