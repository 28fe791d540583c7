//! Virtual machine reconciliation: find or create, then wait until usable.
//!
//! [`ResourceReconciler::ensure`] walks a resource through four waits:
//! visible in the listing, active with an address, SSH port accepting
//! connections, and the package manager lock released.

mod teardown;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use crate::poll::{PollPolicy, PollTimeout, Progress, poll_until};
use crate::provider::{ManagedResource, Provider, ProviderError, ResourceRequest};
use crate::remote::{CommandRunner, RemoteExecError, RemoteExecutor};

pub use teardown::{CONFIRMATION, TeardownOutcome, teardown};

/// Remote command that prints `locked` while dpkg holds its lock.
pub const LOCK_CHECK_COMMAND: &str =
    r#"lsof /var/lib/dpkg/lock >/dev/null 2>&1; [ $? = 0 ] && echo "locked"; echo "...""#;

/// Lifecycle stages reported while reconciling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceStage {
    /// No resource with the name exists.
    Absent,
    /// Creation was requested; waiting for the listing.
    Creating,
    /// Listed; waiting for the active status and an address.
    Provisioning,
    /// Active with an address; waiting for SSH.
    Booting,
    /// Reachable; waiting for the package manager.
    Configuring,
    /// Ready for remote configuration.
    Ready,
}

impl fmt::Display for ResourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Provisioning => "provisioning",
            Self::Booting => "booting",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
        })
    }
}

/// Poll policies for each wait phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Waiting for a created resource to be listed.
    pub creation: PollPolicy,
    /// Waiting for the active status and an address.
    pub status: PollPolicy,
    /// Waiting for the SSH port to accept connections.
    pub reachability: PollPolicy,
    /// Waiting for the package manager lock.
    pub readiness: PollPolicy,
    /// Limit for a single TCP connection attempt.
    pub connect_timeout: Duration,
}

impl PollSettings {
    /// Intervals used against real providers.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            creation: PollPolicy::every(Duration::from_secs(15)),
            status: PollPolicy::every(Duration::from_secs(10)),
            reachability: PollPolicy::every(Duration::from_secs(5)),
            readiness: PollPolicy::every(Duration::from_secs(15)),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Applies the same overall limit to every phase.
    #[must_use]
    pub const fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.creation = self.creation.with_timeout(limit);
        self.status = self.status.with_timeout(limit);
        self.reachability = self.reachability.with_timeout(limit);
        self.readiness = self.readiness.with_timeout(limit);
        self
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::standard()
    }
}

/// Resource that is active, reachable and ready.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadyResource {
    /// Latest provider record.
    pub resource: ManagedResource,
    /// Public IPv4 address.
    pub address: Ipv4Addr,
}

/// Errors raised while reconciling or tearing down a resource.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ReconcileError {
    /// A provider request failed.
    #[error("provider request failed: {0}")]
    Provider(#[from] ProviderError),
    /// The remote readiness check failed.
    #[error("readiness check failed: {0}")]
    Remote(#[from] RemoteExecError),
    /// A wait phase exceeded its limit.
    #[error(transparent)]
    Timeout(#[from] PollTimeout),
    /// The confirmation prompt could not be read or written.
    #[error("confirmation prompt failed: {0}")]
    Prompt(String),
}

/// Returns the first resource whose name matches exactly.
///
/// # Errors
///
/// Returns the provider error from the listing.
pub async fn find_by_name<P: Provider + ?Sized>(
    provider: &P,
    name: &str,
) -> Result<Option<ManagedResource>, ProviderError> {
    let resources = provider.list_resources().await?;
    Ok(resources.into_iter().find(|resource| resource.name == name))
}

/// Drives a named resource to the ready state.
pub struct ResourceReconciler<'a, P: Provider + ?Sized, R: CommandRunner, G: Progress> {
    provider: &'a P,
    executor: &'a RemoteExecutor<R>,
    progress: G,
    settings: PollSettings,
}

impl<'a, P: Provider + ?Sized, R: CommandRunner, G: Progress> ResourceReconciler<'a, P, R, G> {
    /// Creates a reconciler using the standard poll settings.
    #[must_use]
    pub const fn new(provider: &'a P, executor: &'a RemoteExecutor<R>, progress: G) -> Self {
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

    /// Finds or creates the resource called `name` and waits until it is
    /// ready. Creation happens at most once per call.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when a provider request or the readiness
    /// check fails, or a wait phase times out.
    pub async fn ensure(
        &self,
        name: &str,
        credential_id: &str,
    ) -> Result<ReadyResource, ReconcileError> {
        let resource = match find_by_name(self.provider, name).await? {
            Some(existing) => {
                info!(id = %existing.id, name, status = %existing.status, "resource already exists");
                existing
            }
            None => {
                info!(stage = %ResourceStage::Absent, name, "no resource with this name");
                self.create(name, credential_id).await?
            }
        };

        info!(stage = %ResourceStage::Provisioning, id = %resource.id, "waiting for active status");
        let ready = self.wait_until_active(&resource.id).await?;
        info!(stage = %ResourceStage::Booting, address = %ready.address, "waiting for SSH");
        self.wait_until_reachable(ready.address).await?;
        info!(stage = %ResourceStage::Configuring, address = %ready.address, "waiting for package manager");
        self.wait_until_ready(ready.address).await?;
        info!(stage = %ResourceStage::Ready, id = %ready.resource.id, "resource ready");
        Ok(ready)
    }

    async fn create(
        &self,
        name: &str,
        credential_id: &str,
    ) -> Result<ManagedResource, ReconcileError> {
        let request = ResourceRequest::builder()
            .name(name)
            .defaults(self.provider.defaults())
            .credential_id(credential_id)
            .build()?;
        let id = self.provider.create_resource(&request).await?;
        info!(stage = %ResourceStage::Creating, id = %id, name, "creation requested");

        let provider = self.provider;
        poll_until(&self.settings.creation, "resource creation", &self.progress, || async move {
            Ok::<_, ReconcileError>(find_by_name(provider, name).await?)
        })
        .await
    }

    async fn wait_until_active(&self, id: &str) -> Result<ReadyResource, ReconcileError> {
        let provider = self.provider;
        poll_until(&self.settings.status, "active status", &self.progress, || async move {
            let resources = provider.list_resources().await?;
            let ready = resources
                .into_iter()
                .find(|resource| resource.id == id && resource.status.is_active())
                .and_then(|resource| {
                    resource
                        .address
                        .map(|address| ReadyResource { resource, address })
                });
            Ok::<_, ReconcileError>(ready)
        })
        .await
    }

    async fn wait_until_reachable(&self, address: Ipv4Addr) -> Result<(), ReconcileError> {
        let target = SocketAddr::from((address, self.executor.settings().port));
        let connect_timeout = self.settings.connect_timeout;
        poll_until(&self.settings.reachability, "SSH port", &self.progress, || async move {
            let connected = matches!(
                timeout(connect_timeout, TcpStream::connect(target)).await,
                Ok(Ok(_))
            );
            Ok::<_, ReconcileError>(connected.then_some(()))
        })
        .await
    }

    async fn wait_until_ready(&self, address: Ipv4Addr) -> Result<(), ReconcileError> {
        let executor = self.executor;
        poll_until(&self.settings.readiness, "package manager lock", &self.progress, || async move {
            let output = executor.run(address, LOCK_CHECK_COMMAND).await?;
            Ok::<_, ReconcileError>((!output.contains("locked")).then_some(()))
        })
        .await
    }
}

#[cfg(test)]
mod tests;
