//! Response bodies for the Vultr v1 API.
//!
//! Listings are JSON objects keyed by identifier, or a bare `[]` when the
//! account holds nothing. Keys are sorted so "first match" is stable.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::provider::types::parse_address;
use crate::provider::{Credential, ManagedResource, ProviderError, ResourceStatus};

#[derive(Debug, Deserialize)]
struct Key {
    #[serde(rename = "SSHKEYID")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ssh_key: String,
}

#[derive(Debug, Deserialize)]
struct Server {
    #[serde(rename = "SUBID")]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    os: String,
    #[serde(default)]
    main_ip: String,
    #[serde(rename = "DCID", default)]
    region: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct CreatedKey {
    #[serde(rename = "SSHKEYID")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedServer {
    #[serde(rename = "SUBID")]
    id: Option<String>,
}

fn decode_map<T: DeserializeOwned>(
    body: &str,
    what: &str,
) -> Result<BTreeMap<String, T>, ProviderError> {
    if body.trim() == "[]" {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(body).map_err(|err| ProviderError::decode(what, &err))
}

fn created_id(id: Option<String>, what: &str, body: &str) -> Result<String, ProviderError> {
    id.filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ProviderError::MissingIdentifier {
            what: what.to_owned(),
            body: body.to_owned(),
        })
}

/// Decodes the body of `GET /sshkey/list`.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] when the body is neither `[]` nor the
/// expected object.
pub fn decode_keys(body: &str) -> Result<Vec<Credential>, ProviderError> {
    let keys: BTreeMap<String, Key> = decode_map(body, "ssh key list")?;
    Ok(keys
        .into_values()
        .map(|key| Credential {
            id: key.id,
            name: key.name,
            public_key: key.ssh_key,
        })
        .collect())
}

/// Decodes the body of `POST /sshkey/create`.
///
/// # Errors
///
/// Returns [`ProviderError::MissingIdentifier`] when `SSHKEYID` is absent.
pub fn decode_created_key(body: &str) -> Result<String, ProviderError> {
    let created: CreatedKey =
        serde_json::from_str(body).map_err(|err| ProviderError::decode("ssh key", &err))?;
    created_id(created.id, "ssh key", body)
}

/// Decodes the body of `GET /server/list`.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] when the body is neither `[]` nor the
/// expected object.
pub fn decode_servers(body: &str) -> Result<Vec<ManagedResource>, ProviderError> {
    let servers: BTreeMap<String, Server> = decode_map(body, "server list")?;
    Ok(servers
        .into_values()
        .map(|server| ManagedResource {
            address: parse_address(&server.main_ip),
            status: ResourceStatus::parse(&server.status),
            id: server.id,
            name: server.label,
            operating_system: server.os,
            region: server.region,
        })
        .collect())
}

/// Decodes the body of `POST /server/create`.
///
/// # Errors
///
/// Returns [`ProviderError::MissingIdentifier`] when `SUBID` is absent.
pub fn decode_created_server(body: &str) -> Result<String, ProviderError> {
    let created: CreatedServer =
        serde_json::from_str(body).map_err(|err| ProviderError::decode("server", &err))?;
    created_id(created.id, "server", body)
}
