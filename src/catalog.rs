//! Service catalog returned at authentication time and endpoint resolution
//! against it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ClientError;
use crate::request::normalize_url;

/// Network visibility of a catalog endpoint.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Public,
    Internal,
    Admin,
}

impl Availability {
    /// Interface name as the identity API spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Clients configured for keystoneauth commonly spell these with a URL suffix.
        match value.trim().to_ascii_lowercase().trim_end_matches("url") {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "admin" => Ok(Self::Admin),
            _ => Err(ClientError::InvalidAvailability(value.to_owned())),
        }
    }
}

/// Filters used to pick one endpoint out of the catalog.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EndpointOpts {
    /// Service type, e.g. `network`. Filled in by service constructors.
    pub service_type: Option<String>,
    /// Service name, only needed when a cloud registers the same type twice.
    pub name: Option<String>,
    /// Region name or region id.
    pub region: Option<String>,
    /// Interface; defaults to [`Availability::Public`].
    pub availability: Option<Availability>,
    /// Major API version the caller expects. Zero-equivalent when `None`.
    pub version: Option<u32>,
}

impl EndpointOpts {
    /// No filters: public interface, any region.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Interface to resolve, e.g. [`Availability::Internal`] from inside the cloud.
    #[must_use]
    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = Some(availability);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the type a service constructor would fill in.
    #[must_use]
    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    /// Pins the major version; constructors reject a different one.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// True when the caller specified nothing at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills the service type when unset and defaults the interface to public.
    pub fn apply_defaults(&mut self, service_type: &str) {
        if self.service_type.as_deref().is_none_or(str::is_empty) {
            self.service_type = Some(service_type.to_owned());
        }
        if self.availability.is_none() {
            self.availability = Some(Availability::Public);
        }
    }

    /// The primary service type followed by its registered aliases.
    pub fn types(&self) -> Vec<&str> {
        let Some(primary) = self.service_type.as_deref() else {
            return Vec::new();
        };
        let mut types = vec![primary];
        types.extend_from_slice(service_type_aliases(primary));
        types
    }
}

/// Historical names clouds still publish for a service type.
pub fn service_type_aliases(service_type: &str) -> &'static [&'static str] {
    match service_type {
        "block-storage" => &["volumev3", "volumev2", "volume", "block-store"],
        "shared-file-system" => &["sharev2", "share"],
        "container-infrastructure-management" => &["container-infrastructure", "container-infra"],
        "application-container" => &["container"],
        "workflow" => &["workflowv2"],
        "message" => &["messaging"],
        "load-balancer" => &["octavia"],
        "baremetal" => &["bare-metal"],
        "baremetal-introspection" => &["introspection"],
        _ => &[],
    }
}

/// One endpoint of a catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CatalogEndpoint {
    pub interface: Availability,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

/// One service in the catalog.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// The service catalog of a session, normalized to the identity v3 shape.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServiceCatalog {
    pub entries: Vec<CatalogEntry>,
}

impl ServiceCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the catalog lists a service of the given type.
    pub fn contains(&self, service_type: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.service_type == service_type)
    }

    /// Resolves a single endpoint URL for `opts`.
    ///
    /// Types are tried in [`EndpointOpts::types`] order and the first type with
    /// any match decides. More than one match for that type is an error, so
    /// the result never depends on the order of catalog entries.
    pub fn endpoint_url(&self, opts: &EndpointOpts) -> Result<String, ClientError> {
        let Some(primary) = opts.service_type.clone().filter(|kind| !kind.is_empty()) else {
            return Err(ClientError::ServiceTypeRequired);
        };
        let availability = opts.availability.unwrap_or_default();
        let types = opts.types();

        for service_type in types {
            let matches: Vec<&CatalogEndpoint> = self
                .entries
                .iter()
                .filter(|entry| entry.service_type == service_type)
                .filter(|entry| {
                    opts.name
                        .as_deref()
                        .is_none_or(|name| entry.name.as_deref() == Some(name))
                })
                .flat_map(|entry| entry.endpoints.iter())
                .filter(|endpoint| endpoint.interface == availability)
                .filter(|endpoint| {
                    opts.region.as_deref().is_none_or(|region| {
                        endpoint.region.as_deref() == Some(region)
                            || endpoint.region_id.as_deref() == Some(region)
                    })
                })
                .collect();

            match matches.as_slice() {
                [] => {}
                [only] => return Ok(normalize_url(&only.url)),
                many => {
                    let mut urls: Vec<String> =
                        many.iter().map(|endpoint| endpoint.url.clone()).collect();
                    urls.sort();
                    return Err(ClientError::AmbiguousEndpoint {
                        service_type: service_type.to_owned(),
                        count: many.len(),
                        urls,
                    });
                }
            }
        }

        Err(ClientError::EndpointNotFound {
            service_type: primary,
            region: opts.region.clone(),
            availability: availability.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Availability, CatalogEndpoint, CatalogEntry, EndpointOpts, ServiceCatalog};
    use crate::ClientError;

    fn endpoint(interface: Availability, region: &str, url: &str) -> CatalogEndpoint {
        CatalogEndpoint {
            interface,
            region: Some(region.to_owned()),
            region_id: Some(region.to_owned()),
            url: url.to_owned(),
        }
    }

    fn entry(service_type: &str, endpoints: Vec<CatalogEndpoint>) -> CatalogEntry {
        CatalogEntry {
            service_type: service_type.to_owned(),
            name: None,
            id: None,
            endpoints,
        }
    }

    fn network_opts(region: &str) -> EndpointOpts {
        let mut opts = EndpointOpts::new().region(region);
        opts.apply_defaults("network");
        opts
    }

    #[test]
    fn resolves_public_endpoint_by_default() {
        let catalog = ServiceCatalog::new(vec![entry(
            "network",
            vec![
                endpoint(Availability::Internal, "RegionOne", "http://10.0.0.1:9696"),
                endpoint(Availability::Public, "RegionOne", "https://net.example.com"),
            ],
        )]);

        let url = catalog
            .endpoint_url(&network_opts("RegionOne"))
            .expect("one public endpoint");
        assert_eq!(url, "https://net.example.com/");
    }

    #[test]
    fn resolution_is_independent_of_entry_order() {
        let one = entry(
            "network",
            vec![endpoint(Availability::Public, "RegionOne", "http://one:9696/")],
        );
        let two = entry(
            "network",
            vec![endpoint(Availability::Public, "RegionTwo", "http://two:9696/")],
        );
        let forward = ServiceCatalog::new(vec![one.clone(), two.clone()]);
        let backward = ServiceCatalog::new(vec![two, one]);

        for region in ["RegionOne", "RegionTwo"] {
            assert_eq!(
                forward.endpoint_url(&network_opts(region)).expect("match"),
                backward.endpoint_url(&network_opts(region)).expect("match"),
            );
        }
    }

    #[test]
    fn ambiguous_match_is_reported() {
        let catalog = ServiceCatalog::new(vec![entry(
            "network",
            vec![
                endpoint(Availability::Public, "RegionOne", "http://b:9696/"),
                endpoint(Availability::Public, "RegionTwo", "http://a:9696/"),
            ],
        )]);

        let mut opts = EndpointOpts::new();
        opts.apply_defaults("network");
        match catalog.endpoint_url(&opts) {
            Err(ClientError::AmbiguousEndpoint { count, urls, .. }) => {
                assert_eq!(count, 2);
                assert_eq!(urls, vec!["http://a:9696/", "http://b:9696/"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_endpoint_is_a_resolution_error() {
        let catalog = ServiceCatalog::default();
        let error = catalog
            .endpoint_url(&network_opts("RegionOne"))
            .expect_err("empty catalog");
        assert!(error.is_resolution_error());
    }

    #[test]
    fn missing_service_type_is_rejected_before_lookup() {
        let catalog = ServiceCatalog::new(vec![entry(
            "network",
            vec![endpoint(Availability::Public, "RegionOne", "http://net:9696/")],
        )]);

        for opts in [EndpointOpts::new(), EndpointOpts::new().service_type("")] {
            let error = catalog.endpoint_url(&opts).expect_err("no service type");
            assert!(matches!(error, ClientError::ServiceTypeRequired));
            assert!(!error.is_resolution_error());
        }
    }

    #[test]
    fn primary_type_wins_over_alias() {
        let catalog = ServiceCatalog::new(vec![
            entry(
                "volumev3",
                vec![endpoint(Availability::Public, "RegionOne", "http://legacy:8776/v3")],
            ),
            entry(
                "block-storage",
                vec![endpoint(Availability::Public, "RegionOne", "http://new:8776/v3")],
            ),
        ]);
        let mut opts = EndpointOpts::new();
        opts.apply_defaults("block-storage");
        assert_eq!(
            catalog.endpoint_url(&opts).expect("primary match"),
            "http://new:8776/v3/"
        );
    }

    #[test]
    fn alias_is_used_when_primary_is_absent() {
        let catalog = ServiceCatalog::new(vec![entry(
            "volumev3",
            vec![endpoint(Availability::Public, "RegionOne", "http://legacy:8776/v3")],
        )]);
        let mut opts = EndpointOpts::new();
        opts.apply_defaults("block-storage");
        assert_eq!(
            catalog.endpoint_url(&opts).expect("alias match"),
            "http://legacy:8776/v3/"
        );
    }

    #[test]
    fn availability_parses_url_suffix() {
        assert_eq!(
            "internalURL".parse::<Availability>().expect("valid"),
            Availability::Internal
        );
        assert!("private".parse::<Availability>().is_err());
    }
}
