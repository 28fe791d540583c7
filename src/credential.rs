//! SSH key reconciliation.

use tracing::info;

use crate::config::{ConfigError, read_local_file};
use crate::provider::{Provider, ProviderError};

/// Ensures the account holds a key called `name` with `public_key` and
/// returns its identifier.
///
/// An existing key with that name is always replaced, even when the material
/// already matches. When several keys share the name, the first listed wins.
///
/// # Errors
///
/// Returns the provider error from the listing, creation or replacement.
pub async fn reconcile_credential<P: Provider + ?Sized>(
    provider: &P,
    public_key: &str,
    name: &str,
) -> Result<String, ProviderError> {
    let credentials = provider.list_credentials().await?;
    match credentials.into_iter().find(|credential| credential.name == name) {
        Some(existing) => {
            info!(provider = provider.name(), id = %existing.id, name, "replacing SSH key");
            provider
                .replace_credential(&existing.id, name, public_key)
                .await
        }
        None => {
            info!(provider = provider.name(), name, "registering SSH key");
            provider.create_credential(name, public_key).await
        }
    }
}

/// Reads a public key file, dropping trailing whitespace.
///
/// # Errors
///
/// Returns [`ConfigError::LocalFile`] when the file cannot be read.
pub fn read_public_key(path: &str) -> Result<String, ConfigError> {
    read_local_file(path).map(|contents| contents.trim_end().to_owned())
}
