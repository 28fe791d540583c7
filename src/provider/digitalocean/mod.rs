//! DigitalOcean adapter for the v2 REST API.
//!
//! Requests authenticate with a bearer token. SSH keys are replaced by
//! deleting the old key and registering a new one, so the identifier changes.
//! Listings request the largest page size and follow `links.pages.next`.

mod wire;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use super::http::{HTTP_CLIENT, RawResponse, send};
use super::{
    Credential, ManagedResource, Pacer, PauseFuture, Provider, ProviderError, ProviderFuture,
    ResourceDefaults, ResourceRequest,
};
use crate::config::{ConfigError, DigitalOceanConfig};

pub use wire::{decode_created_droplet, decode_created_key, decode_droplets, decode_keys};

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com/v2";

/// Largest `per_page` value the API accepts.
const PAGE_SIZE: u32 = 200;

/// Provider backed by the DigitalOcean API.
#[derive(Clone, Debug)]
pub struct DigitalOcean {
    api_token: String,
    defaults: ResourceDefaults,
    pacer: Pacer,
    base_url: String,
}

impl DigitalOcean {
    /// Creates an adapter from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the token or a creation
    /// default is blank.
    pub fn new(config: &DigitalOceanConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            api_token: config.api_token.trim().to_owned(),
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

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, url: &str) -> Result<RawResponse, ProviderError> {
        self.throttle_delay().await;
        debug!(method = "GET", url = %url, "digitalocean request");
        send(HTTP_CLIENT.get(url).bearer_auth(&self.api_token), url).await
    }

    /// Fetches every page of the listing at `path`.
    async fn get_all<T>(
        &self,
        path: &str,
        decode: fn(&str) -> Result<wire::Page<T>, ProviderError>,
    ) -> Result<Vec<T>, ProviderError> {
        let mut items = Vec::new();
        let mut next = Some(self.url(&format!("{path}?per_page={PAGE_SIZE}")));
        while let Some(url) = next {
            let response = self.get(&url).await?;
            let page = decode(&response.require(StatusCode::OK)?)?;
            items.extend(page.items);
            // A link back to the page just read would never terminate.
            next = page.next.filter(|link| *link != url);
        }
        Ok(items)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<RawResponse, ProviderError> {
        let url = self.url(path);
        self.throttle_delay().await;
        debug!(method = "POST", url = %url, "digitalocean request");
        send(
            HTTP_CLIENT.post(&url).bearer_auth(&self.api_token).json(body),
            &url,
        )
        .await
    }

    async fn delete(&self, path: &str) -> Result<RawResponse, ProviderError> {
        let url = self.url(path);
        self.throttle_delay().await;
        debug!(method = "DELETE", url = %url, "digitalocean request");
        send(HTTP_CLIENT.delete(&url).bearer_auth(&self.api_token), &url).await
    }

    async fn register_key(&self, name: &str, public_key: &str) -> Result<String, ProviderError> {
        let body = wire::NewKey { name, public_key };
        let response = self.post("/account/keys", &body).await?;
        decode_created_key(&response.require(StatusCode::CREATED)?)
    }
}

impl Provider for DigitalOcean {
    fn name(&self) -> &'static str {
        "digitalocean"
    }

    fn defaults(&self) -> &ResourceDefaults {
        &self.defaults
    }

    fn list_credentials(&self) -> ProviderFuture<'_, Vec<Credential>> {
        Box::pin(async move { self.get_all("/account/keys", wire::decode_key_page).await })
    }

    fn create_credential<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move { self.register_key(name, public_key).await })
    }

    fn replace_credential<'a>(
        &'a self,
        id: &'a str,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.delete(&format!("/account/keys/{id}"))
                .await?
                .require(StatusCode::NO_CONTENT)?;
            self.register_key(name, public_key).await
        })
    }

    fn list_resources(&self) -> ProviderFuture<'_, Vec<ManagedResource>> {
        Box::pin(async move { self.get_all("/droplets", wire::decode_droplet_page).await })
    }

    fn create_resource<'a>(&'a self, request: &'a ResourceRequest) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            request.validate()?;
            let body = wire::NewDroplet::from_request(request);
            let response = self.post("/droplets", &body).await?;
            decode_created_droplet(&response.require(StatusCode::ACCEPTED)?)
        })
    }

    fn destroy_resource<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.delete(&format!("/droplets/{id}"))
                .await?
                .require(StatusCode::NO_CONTENT)
                .map(|_| ())
        })
    }

    fn throttle_delay(&self) -> PauseFuture<'_> {
        Box::pin(self.pacer.pause())
    }
}

#[cfg(test)]
mod tests;
