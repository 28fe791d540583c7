//! Orchestrates the `up` flow: key, machine, VPN, optional self-destruct.

use std::io::Write;

use thiserror::Error;
use tracing::info;

use crate::credential::reconcile_credential;
use crate::login::VpnLogin;
use crate::poll::Progress;
use crate::provider::{ManagedResource, Provider, ProviderError};
use crate::remote::{CommandRunner, RemoteExecutor};
use crate::resource::{PollSettings, ReconcileError, ResourceReconciler};
use crate::vpn::{SelfDestructPlan, VpnEndpoint, VpnError, VpnSetup};

/// Inputs for a single `up` run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpRequest {
    /// Name shared by the SSH key and the machine.
    pub name: String,
    /// Public key text to register.
    pub public_key: String,
    /// Optional self-destruct timer to install after setup.
    pub self_destruct: Option<SelfDestructPlan>,
}

/// Result of a successful `up` run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpOutcome {
    /// Provider record of the ready machine.
    pub resource: ManagedResource,
    /// VPN endpoint and its login.
    pub endpoint: VpnEndpoint,
}

/// Errors raised by [`UpOrchestrator::execute`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum UpError {
    /// SSH key reconciliation failed.
    #[error("SSH key reconciliation failed: {0}")]
    Credential(#[source] ProviderError),
    /// Machine reconciliation failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// VPN setup failed.
    #[error("VPN setup failed: {0}")]
    Vpn(#[from] VpnError),
    /// Summary output could not be written.
    #[error("failed to write output: {0}")]
    Output(String),
}

/// Runs the `up` flow against a provider and a remote executor.
pub struct UpOrchestrator<'a, P: Provider + ?Sized, R: CommandRunner, G: Progress> {
    provider: &'a P,
    executor: RemoteExecutor<R>,
    progress: G,
    settings: PollSettings,
}

impl<'a, P: Provider + ?Sized, R: CommandRunner, G: Progress> UpOrchestrator<'a, P, R, G> {
    /// Creates an orchestrator with the standard poll settings.
    #[must_use]
    pub const fn new(provider: &'a P, executor: RemoteExecutor<R>, progress: G) -> Self {
        Self {
            provider,
            executor,
            progress,
            settings: PollSettings::standard(),
        }
    }

    /// Overrides the poll settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Reconciles the key and machine, installs the VPN and, when requested,
    /// the self-destruct timer.
    ///
    /// # Errors
    ///
    /// Returns [`UpError`] naming the step that failed.
    pub async fn execute<W: Write>(
        &self,
        request: &UpRequest,
        output: &mut W,
    ) -> Result<UpOutcome, UpError> {
        let credential_id = reconcile_credential(self.provider, &request.public_key, &request.name)
            .await
            .map_err(UpError::Credential)?;
        info!(credential = %credential_id, "SSH key in place");

        let ready = ResourceReconciler::new(self.provider, &self.executor, self.progress.clone())
            .with_settings(self.settings)
            .ensure(&request.name, &credential_id)
            .await?;
        writeln!(output, "Virtual machine ready: {}", ready.resource)
            .map_err(|err| UpError::Output(err.to_string()))?;

        let setup = VpnSetup::new(&self.executor);
        let endpoint = setup
            .ensure(ready.address, VpnLogin::generate(), output)
            .await?;
        if let Some(plan) = &request.self_destruct {
            setup.install_self_destruct(ready.address, plan).await?;
        }

        Ok(UpOutcome {
            resource: ready.resource,
            endpoint,
        })
    }
}
