//! Core library for the Burrow VPN provisioning tool.
//!
//! The crate reconciles a named virtual machine and its SSH key against a
//! cloud provider (DigitalOcean or Vultr), waits until the machine is active
//! and ready for remote configuration, and then turns it into a PPTP VPN
//! endpoint over SSH. Teardown finds the machine by name and destroys it after
//! an interactive confirmation.

pub mod config;
pub mod connect;
pub mod credential;
pub mod login;
pub mod poll;
pub mod provider;
pub mod remote;
pub mod resource;
pub mod test_support;
pub mod up;
pub mod vpn;

pub use config::{BurrowConfig, ConfigError, DigitalOceanConfig, ProviderKind, VultrConfig};
pub use connect::{ConnectError, run_connect_commands, substitute_variables};
pub use credential::{read_public_key, reconcile_credential};
pub use login::VpnLogin;
pub use poll::{PollPolicy, PollTimeout, Progress, StdoutProgress, poll_until};
pub use provider::{
    Credential, ManagedResource, Provider, ProviderError, ResourceDefaults, ResourceRequest,
    ResourceStatus,
};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteExecError, RemoteExecutor,
    RemoteSettings,
};
pub use resource::{
    PollSettings, ReadyResource, ReconcileError, ResourceReconciler, TeardownOutcome, teardown,
};
pub use up::{UpError, UpOrchestrator, UpOutcome, UpRequest};
pub use vpn::{SelfDestructPlan, VpnEndpoint, VpnError, VpnSetup};
