//! PPTP VPN installation on a ready machine.
//!
//! Setup is skipped when a `pptpd` process is already running; in that case
//! the login already in `/chap-secrets` is read back so autoconnect uses the
//! credentials the server actually accepts.

use std::io::Write;
use std::net::Ipv4Addr;

use camino::Utf8Path;
use thiserror::Error;
use tracing::info;

use crate::config::expand_tilde;
use crate::login::VpnLogin;
use crate::remote::{CommandRunner, RemoteExecError, RemoteExecutor};

/// Container image providing the PPTP daemon.
pub const PPTPD_IMAGE: &str = "jamesclonk/docker-pptpd";

/// Remote path of the login file mounted into the container.
pub const CHAP_SECRETS_PATH: &str = "/chap-secrets";

/// Remote file name of the uploaded self-destruct script.
pub const SELF_DESTRUCT_NAME: &str = "self-destruct.sh";

const PPTPD_STATUS_COMMAND: &str = r#"ps -ef | grep pptpd | grep -v grep; echo "...""#;

const INSTALL_STEPS: [&str; 5] = [
    "apt-get update -qq",
    "DEBIAN_FRONTEND=noninteractive apt-get install -qy docker.io pptpd iptables",
    "service pptpd stop",
    "service docker restart",
    "docker pull jamesclonk/docker-pptpd",
];

/// Errors raised while configuring the VPN endpoint.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum VpnError {
    /// A remote command failed.
    #[error(transparent)]
    Remote(#[from] RemoteExecError),
    /// `pptpd` is running but its login file holds no usable entry.
    #[error("pptpd is already running but {path} holds no readable login")]
    UnknownLogin {
        /// Remote path that was read.
        path: String,
    },
    /// Progress output could not be written.
    #[error("failed to write setup output: {0}")]
    Output(String),
}

/// Reachable VPN endpoint and the login that works against it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VpnEndpoint {
    /// Public address of the server.
    pub address: Ipv4Addr,
    /// Login accepted by the server.
    pub login: VpnLogin,
    /// Whether this run installed the server.
    pub freshly_installed: bool,
}

/// Script and limits for the optional self-destruct timer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelfDestructPlan {
    /// Local script path; `~/` is expanded.
    pub script: String,
    /// Minutes without VPN sessions before shutdown.
    pub max_idle_minutes: u32,
    /// Minutes of uptime before shutdown.
    pub max_uptime_minutes: u32,
}

/// Installs and starts the PPTP server over SSH.
pub struct VpnSetup<'a, R: CommandRunner> {
    executor: &'a RemoteExecutor<R>,
}

impl<'a, R: CommandRunner> VpnSetup<'a, R> {
    /// Creates a setup driver.
    #[must_use]
    pub const fn new(executor: &'a RemoteExecutor<R>) -> Self {
        Self { executor }
    }

    /// Ensures a PPTP server is running on `address`, installing it with
    /// `login` when none is running.
    ///
    /// # Errors
    ///
    /// Returns [`VpnError`] when a remote step fails or an existing server's
    /// login cannot be read.
    pub async fn ensure<W: Write>(
        &self,
        address: Ipv4Addr,
        login: VpnLogin,
        output: &mut W,
    ) -> Result<VpnEndpoint, VpnError> {
        let processes = self.executor.run(address, PPTPD_STATUS_COMMAND).await?;
        if processes.contains("pptpd") {
            info!(%address, "pptpd already running");
            let contents = self
                .executor
                .run(address, &format!("cat {CHAP_SECRETS_PATH}"))
                .await?;
            let existing =
                VpnLogin::parse_chap_secrets(&contents).ok_or_else(|| VpnError::UnknownLogin {
                    path: CHAP_SECRETS_PATH.to_owned(),
                })?;
            return Ok(VpnEndpoint {
                address,
                login: existing,
                freshly_installed: false,
            });
        }

        for step in INSTALL_STEPS {
            info!(%address, step, "installing VPN server");
            writeln!(output, "==> {step}").map_err(|err| VpnError::Output(err.to_string()))?;
            self.executor.call(address, step, output).await?;
        }
        self.write_login(address, &login).await?;
        let run = format!(
            "docker run --name pptpd --privileged -d -p 1723:1723 \
             -v {CHAP_SECRETS_PATH}:/etc/ppp/chap-secrets:ro {PPTPD_IMAGE}"
        );
        info!(%address, "starting pptpd container");
        self.executor.call(address, &run, output).await?;
        Ok(VpnEndpoint {
            address,
            login,
            freshly_installed: true,
        })
    }

    /// Uploads the self-destruct script and starts it in the background.
    ///
    /// # Errors
    ///
    /// Returns [`VpnError::Remote`] when the upload or launch fails.
    pub async fn install_self_destruct(
        &self,
        address: Ipv4Addr,
        plan: &SelfDestructPlan,
    ) -> Result<(), VpnError> {
        let script = expand_tilde(&plan.script);
        info!(%address, script = %script, "installing self-destruct timer");
        self.executor
            .upload(address, Utf8Path::new(&script), SELF_DESTRUCT_NAME)
            .await?;
        let launch = format!(
            "nohup ./{SELF_DESTRUCT_NAME} {} {} >/dev/null 2>&1 &",
            plan.max_idle_minutes, plan.max_uptime_minutes
        );
        self.executor.run(address, &launch).await?;
        Ok(())
    }

    async fn write_login(&self, address: Ipv4Addr, login: &VpnLogin) -> Result<(), VpnError> {
        let line = login.chap_secrets_line();
        let command = format!(
            "echo {} > {CHAP_SECRETS_PATH}",
            shell_escape::unix::escape(line.as_str().into())
        );
        self.executor.run(address, &command).await?;
        Ok(())
    }
}
