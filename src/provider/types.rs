//! Provider-neutral records returned by the adapters.

use std::fmt;
use std::net::Ipv4Addr;

use super::ProviderError;

/// Lifecycle state reported for a compute resource.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ResourceStatus {
    /// The provider returned no status.
    #[default]
    Unknown,
    /// The resource is still being provisioned.
    Pending,
    /// The resource is running.
    Active,
    /// Any other provider specific status, kept verbatim.
    Other(String),
}

impl ResourceStatus {
    /// Maps a raw provider status string onto a [`ResourceStatus`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::Unknown,
            "new" | "pending" => Self::Pending,
            "active" => Self::Active,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the status as displayed in listings.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Other(raw) => raw,
        }
    }

    /// Returns `true` when the resource is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute resource as seen by the reconcilers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ManagedResource {
    /// Provider identifier.
    pub id: String,
    /// Resource name or label.
    pub name: String,
    /// Operating system image reported by the provider.
    pub operating_system: String,
    /// Public IPv4 address once one is assigned.
    pub address: Option<Ipv4Addr>,
    /// Region or datacentre identifier.
    pub region: String,
    /// Lifecycle state.
    pub status: ResourceStatus,
}

impl ManagedResource {
    /// Returns the address for display, or `-` while none is assigned.
    #[must_use]
    pub fn address_text(&self) -> String {
        self.address
            .map_or_else(|| "-".to_owned(), |address| address.to_string())
    }
}

impl fmt::Display for ManagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} name={} os={} address={} region={} status={}",
            self.id,
            self.name,
            self.operating_system,
            self.address_text(),
            self.region,
            self.status
        )
    }
}

/// Parses a provider supplied IPv4 address, treating placeholders such as
/// `0` or `0.0.0.0` as "not yet assigned".
pub(crate) fn parse_address(raw: &str) -> Option<Ipv4Addr> {
    raw.trim()
        .parse::<Ipv4Addr>()
        .ok()
        .filter(|address| !address.is_unspecified())
}

/// SSH key registered on the provider account.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Credential {
    /// Provider identifier.
    pub id: String,
    /// Key name.
    pub name: String,
    /// OpenSSH public key text.
    pub public_key: String,
}

/// Creation defaults configured per provider.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceDefaults {
    /// Image slug or operating system identifier.
    pub image: String,
    /// Size slug or plan identifier.
    pub size: String,
    /// Region slug or datacentre identifier.
    pub region: String,
}

/// Parameters required to create a compute resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRequest {
    /// Resource name or label.
    pub name: String,
    /// Image slug or operating system identifier.
    pub image: String,
    /// Size slug or plan identifier.
    pub size: String,
    /// Region slug or datacentre identifier.
    pub region: String,
    /// Identifier of the SSH key to install.
    pub credential_id: String,
}

impl ResourceRequest {
    /// Starts a builder for a [`ResourceRequest`].
    #[must_use]
    pub fn builder() -> ResourceRequestBuilder {
        ResourceRequestBuilder::default()
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] naming the first empty field.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let fields = [
            ("name", &self.name),
            ("image", &self.image),
            ("size", &self.size),
            ("region", &self.region),
            ("credential_id", &self.credential_id),
        ];
        match fields.iter().find(|(_, value)| value.is_empty()) {
            Some((field, _)) => Err(ProviderError::Validation((*field).to_owned())),
            None => Ok(()),
        }
    }
}

/// Builder for [`ResourceRequest`] that trims and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceRequestBuilder {
    name: String,
    image: String,
    size: String,
    region: String,
    credential_id: String,
}

impl ResourceRequestBuilder {
    /// Sets the resource name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the image.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the size or plan.
    #[must_use]
    pub fn size(mut self, value: impl Into<String>) -> Self {
        self.size = value.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the SSH key identifier.
    #[must_use]
    pub fn credential_id(mut self, value: impl Into<String>) -> Self {
        self.credential_id = value.into();
        self
    }

    /// Copies image, size and region from provider defaults.
    #[must_use]
    pub fn defaults(self, defaults: &ResourceDefaults) -> Self {
        self.image(defaults.image.as_str())
            .size(defaults.size.as_str())
            .region(defaults.region.as_str())
    }

    /// Builds and validates the request, trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when any field is empty.
    pub fn build(self) -> Result<ResourceRequest, ProviderError> {
        let request = ResourceRequest {
            name: self.name.trim().to_owned(),
            image: self.image.trim().to_owned(),
            size: self.size.trim().to_owned(),
            region: self.region.trim().to_owned(),
            credential_id: self.credential_id.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}
