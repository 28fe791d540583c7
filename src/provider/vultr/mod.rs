//! Vultr adapter for the v1 REST API.
//!
//! Requests authenticate with an `api_key` query parameter and send
//! form-encoded bodies. SSH keys are updated in place, so the identifier is
//! stable. Accounts are rate limited, so every request is paced.

mod wire;

use reqwest::StatusCode;
use tracing::debug;

use super::http::{HTTP_CLIENT, RawResponse, send};
use super::{
    Credential, ManagedResource, Pacer, PauseFuture, Provider, ProviderError, ProviderFuture,
    ResourceDefaults, ResourceRequest,
};
use crate::config::{ConfigError, VultrConfig};

pub use wire::{decode_created_key, decode_created_server, decode_keys, decode_servers};

const DEFAULT_BASE_URL: &str = "https://api.vultr.com/v1";

/// Provider backed by the Vultr API.
#[derive(Clone, Debug)]
pub struct Vultr {
    api_key: String,
    defaults: ResourceDefaults,
    pacer: Pacer,
    base_url: String,
}

impl Vultr {
    /// Creates an adapter from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the key or a creation
    /// default is blank.
    pub fn new(config: &VultrConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            api_key: config.api_key.trim().to_owned(),
            defaults: config.defaults(),
            pacer: Pacer::from_millis(config.request_pacing_ms),
            base_url: DEFAULT_BASE_URL.to_owned(),
        })
    }

    /// Points the adapter at a different API root (used by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Overrides request pacing.
    #[must_use]
    pub const fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<RawResponse, ProviderError> {
        let url = self.url(path);
        self.throttle_delay().await;
        debug!(method = "GET", url = %url, "vultr request");
        send(
            HTTP_CLIENT.get(&url).query(&[("api_key", &self.api_key)]),
            &url,
        )
        .await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<RawResponse, ProviderError> {
        let url = self.url(path);
        self.throttle_delay().await;
        debug!(method = "POST", url = %url, "vultr request");
        send(
            HTTP_CLIENT
                .post(&url)
                .query(&[("api_key", &self.api_key)])
                .form(form),
            &url,
        )
        .await
    }
}

impl Provider for Vultr {
    fn name(&self) -> &'static str {
        "vultr"
    }

    fn defaults(&self) -> &ResourceDefaults {
        &self.defaults
    }

    fn list_credentials(&self) -> ProviderFuture<'_, Vec<Credential>> {
        Box::pin(async move {
            let response = self.get("/sshkey/list").await?;
            decode_keys(&response.require(StatusCode::OK)?)
        })
    }

    fn create_credential<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let response = self
                .post_form("/sshkey/create", &[("name", name), ("ssh_key", public_key)])
                .await?;
            decode_created_key(&response.require(StatusCode::OK)?)
        })
    }

    fn replace_credential<'a>(
        &'a self,
        id: &'a str,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.post_form(
                "/sshkey/update",
                &[("SSHKEYID", id), ("name", name), ("ssh_key", public_key)],
            )
            .await?
            .require(StatusCode::OK)?;
            Ok(id.to_owned())
        })
    }

    fn list_resources(&self) -> ProviderFuture<'_, Vec<ManagedResource>> {
        Box::pin(async move {
            let response = self.get("/server/list").await?;
            decode_servers(&response.require(StatusCode::OK)?)
        })
    }

    fn create_resource<'a>(&'a self, request: &'a ResourceRequest) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            request.validate()?;
            let form = [
                ("DCID", request.region.as_str()),
                ("VPSPLANID", request.size.as_str()),
                ("OSID", request.image.as_str()),
                ("label", request.name.as_str()),
                ("SSHKEYID", request.credential_id.as_str()),
            ];
            let response = self.post_form("/server/create", &form).await?;
            decode_created_server(&response.require(StatusCode::OK)?)
        })
    }

    fn destroy_resource<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.post_form("/server/destroy", &[("SUBID", id)])
                .await?
                .require(StatusCode::OK)
                .map(|_| ())
        })
    }

    fn throttle_delay(&self) -> PauseFuture<'_> {
        Box::pin(self.pacer.pause())
    }
}
