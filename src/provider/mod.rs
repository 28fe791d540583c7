//! Provider capability contract shared by the cloud backends.
//!
//! The reconcilers only ever talk to a [`Provider`]. Each adapter keeps its
//! wire shapes private and converts them into [`ManagedResource`] and
//! [`Credential`] records before handing them back.

pub mod digitalocean;
mod error;
mod http;
mod pacer;
mod types;
pub mod vultr;

use std::future::Future;
use std::pin::Pin;

pub use digitalocean::DigitalOcean;
pub use error::ProviderError;
pub use pacer::Pacer;
pub use types::{
    Credential, ManagedResource, ResourceDefaults, ResourceRequest, ResourceRequestBuilder,
    ResourceStatus,
};
pub use vultr::Vultr;

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Future returned by [`Provider::throttle_delay`].
pub type PauseFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Operations every cloud backend exposes to the reconcilers.
///
/// The trait is object safe so the CLI can pick a backend at runtime and
/// pass it around as `&dyn Provider`.
pub trait Provider: Send + Sync {
    /// Short provider name used in logs and listings.
    fn name(&self) -> &str;

    /// Image, size and region used when a resource has to be created.
    fn defaults(&self) -> &ResourceDefaults;

    /// Lists the SSH keys registered on the account.
    ///
    /// An account without keys yields an empty vector, not an error.
    fn list_credentials(&self) -> ProviderFuture<'_, Vec<Credential>>;

    /// Registers a new SSH key and returns its provider identifier.
    fn create_credential<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String>;

    /// Replaces the key material of an existing SSH key.
    ///
    /// Backends may update in place or delete and recreate; the returned
    /// identifier is the one to use afterwards.
    fn replace_credential<'a>(
        &'a self,
        id: &'a str,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String>;

    /// Lists every compute resource on the account.
    fn list_resources(&self) -> ProviderFuture<'_, Vec<ManagedResource>>;

    /// Requests a new compute resource and returns its provider identifier.
    ///
    /// A successful return does not mean the resource is listed yet.
    fn create_resource<'a>(&'a self, request: &'a ResourceRequest) -> ProviderFuture<'a, String>;

    /// Destroys the resource with the given identifier.
    fn destroy_resource<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Pauses before an outbound request to respect the account rate limit.
    fn throttle_delay(&self) -> PauseFuture<'_>;
}
