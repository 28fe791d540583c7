//! Request and response bodies for the DigitalOcean v2 API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::types::parse_address;
use crate::provider::{Credential, ManagedResource, ProviderError, ResourceRequest, ResourceStatus};

#[derive(Debug, Serialize)]
pub(super) struct NewKey<'a> {
    pub(super) name: &'a str,
    pub(super) public_key: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct NewDroplet<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: &'a str,
    ssh_keys: Vec<Value>,
}

impl<'a> NewDroplet<'a> {
    pub(super) fn from_request(request: &'a ResourceRequest) -> Self {
        Self {
            name: &request.name,
            region: &request.region,
            size: &request.size,
            image: &request.image,
            ssh_keys: vec![key_reference(&request.credential_id)],
        }
    }
}

/// The API accepts numeric key identifiers or fingerprints.
fn key_reference(id: &str) -> Value {
    id.parse::<u64>()
        .map_or_else(|_| Value::String(id.to_owned()), Value::from)
}

/// One page of a listing and the absolute URL of the next page, if any.
#[derive(Debug)]
pub(super) struct Page<T> {
    pub(super) items: Vec<T>,
    pub(super) next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Option<PageLinks>,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

impl Links {
    fn next(self) -> Option<String> {
        self.pages
            .and_then(|pages| pages.next)
            .filter(|link| !link.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct KeyList {
    #[serde(default)]
    ssh_keys: Vec<Key>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct KeyEnvelope {
    ssh_key: Option<Key>,
}

#[derive(Debug, Deserialize)]
struct Key {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    public_key: String,
}

impl From<Key> for Credential {
    fn from(key: Key) -> Self {
        Self {
            id: key.id.to_string(),
            name: key.name,
            public_key: key.public_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DropletList {
    #[serde(default)]
    droplets: Vec<Droplet>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Option<Droplet>,
}

#[derive(Debug, Default, Deserialize)]
struct Slugged {
    #[serde(default)]
    slug: String,
}

#[derive(Debug, Default, Deserialize)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkV4>,
}

#[derive(Debug, Deserialize)]
struct NetworkV4 {
    #[serde(default)]
    ip_address: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    region: Slugged,
    #[serde(default)]
    image: Slugged,
    #[serde(default)]
    networks: Networks,
}

impl From<Droplet> for ManagedResource {
    fn from(droplet: Droplet) -> Self {
        let public = droplet
            .networks
            .v4
            .iter()
            .find(|network| network.kind == "public")
            .or_else(|| droplet.networks.v4.first());
        Self {
            id: droplet.id.to_string(),
            name: droplet.name,
            operating_system: droplet.image.slug,
            address: public.and_then(|network| parse_address(&network.ip_address)),
            region: droplet.region.slug,
            status: ResourceStatus::parse(&droplet.status),
        }
    }
}

/// Decodes the body of `GET /account/keys`.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] when the body is not the expected JSON.
pub fn decode_keys(body: &str) -> Result<Vec<Credential>, ProviderError> {
    decode_key_page(body).map(|page| page.items)
}

pub(super) fn decode_key_page(body: &str) -> Result<Page<Credential>, ProviderError> {
    let list: KeyList =
        serde_json::from_str(body).map_err(|err| ProviderError::decode("ssh key list", &err))?;
    Ok(Page {
        items: list.ssh_keys.into_iter().map(Credential::from).collect(),
        next: list.links.next(),
    })
}

/// Decodes the body of `POST /account/keys` into the new key identifier.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] for malformed JSON and
/// [`ProviderError::MissingIdentifier`] when no key object is present.
pub fn decode_created_key(body: &str) -> Result<String, ProviderError> {
    let envelope: KeyEnvelope =
        serde_json::from_str(body).map_err(|err| ProviderError::decode("ssh key", &err))?;
    envelope
        .ssh_key
        .map(|key| key.id.to_string())
        .ok_or_else(|| ProviderError::MissingIdentifier {
            what: "ssh key".to_owned(),
            body: body.to_owned(),
        })
}

/// Decodes the body of `GET /droplets`.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] when the body is not the expected JSON.
pub fn decode_droplets(body: &str) -> Result<Vec<ManagedResource>, ProviderError> {
    decode_droplet_page(body).map(|page| page.items)
}

pub(super) fn decode_droplet_page(body: &str) -> Result<Page<ManagedResource>, ProviderError> {
    let list: DropletList =
        serde_json::from_str(body).map_err(|err| ProviderError::decode("droplet list", &err))?;
    Ok(Page {
        items: list
            .droplets
            .into_iter()
            .map(ManagedResource::from)
            .collect(),
        next: list.links.next(),
    })
}

/// Decodes the body of `POST /droplets` into the new droplet identifier.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] for malformed JSON and
/// [`ProviderError::MissingIdentifier`] when no droplet object is present.
pub fn decode_created_droplet(body: &str) -> Result<String, ProviderError> {
    let envelope: DropletEnvelope =
        serde_json::from_str(body).map_err(|err| ProviderError::decode("droplet", &err))?;
    envelope
        .droplet
        .map(|droplet| droplet.id.to_string())
        .ok_or_else(|| ProviderError::MissingIdentifier {
            what: "droplet".to_owned(),
            body: body.to_owned(),
        })
}
