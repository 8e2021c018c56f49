//! Per-service clients bound to one catalog endpoint.

use reqwest::{Method, Url};

use crate::catalog::EndpointOpts;
use crate::identity::base_endpoint;
use crate::request::{RequestOptions, Response, join_path, parse_base_url};
use crate::{ClientError, ProviderClient};

/// A provider bound to one service endpoint.
///
/// Requests go through the provider, so they share its token and
/// reauthentication.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    provider: ProviderClient,
    endpoint: Url,
    resource_base: Option<Url>,
    service_type: String,
    more_headers: Vec<(String, String)>,
}

impl ServiceClient {
    /// Binds `provider` to an explicit endpoint, bypassing the catalog.
    pub fn new(
        provider: ProviderClient,
        endpoint: impl AsRef<str>,
        service_type: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            provider,
            endpoint: parse_base_url(endpoint.as_ref())?,
            resource_base: None,
            service_type: service_type.into(),
            more_headers: Vec::new(),
        })
    }

    /// Uses `resource_base` instead of the endpoint when building URLs.
    #[must_use]
    pub fn with_resource_base(mut self, resource_base: Url) -> Self {
        self.resource_base = Some(resource_base);
        self
    }

    /// Adds a header sent with every request of this client.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.more_headers.push((name.into(), value.into()));
        self
    }

    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    /// Catalog endpoint, always ending with `/`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Base that resource paths are joined onto.
    pub fn resource_base(&self) -> &Url {
        self.resource_base.as_ref().unwrap_or(&self.endpoint)
    }

    /// Primary catalog type this client was resolved for.
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn more_headers(&self) -> &[(String, String)] {
        &self.more_headers
    }

    /// Joins path parts onto the resource base with `/`.
    pub fn service_url(&self, parts: &[&str]) -> Result<Url, ClientError> {
        let path = parts
            .iter()
            .map(|part| part.trim_matches('/'))
            .collect::<Vec<_>>()
            .join("/");
        join_path(self.resource_base(), &path)
    }

    /// Sends a request with this client's extra headers.
    ///
    /// Per-request headers with the same name take precedence.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        mut options: RequestOptions,
    ) -> Result<Response, ClientError> {
        for (name, value) in &self.more_headers {
            let overridden = options
                .headers
                .iter()
                .any(|(existing, _)| existing.eq_ignore_ascii_case(name));
            if !overridden {
                options.headers.push((name.clone(), value.clone()));
            }
        }
        self.provider.request(method, url, options).await
    }

    /// Verb shorthands for [`ServiceClient::request`].
    pub async fn get(&self, url: Url, options: RequestOptions) -> Result<Response, ClientError> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: Url, options: RequestOptions) -> Result<Response, ClientError> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: Url, options: RequestOptions) -> Result<Response, ClientError> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn patch(&self, url: Url, options: RequestOptions) -> Result<Response, ClientError> {
        self.request(Method::PATCH, url, options).await
    }

    pub async fn delete(&self, url: Url, options: RequestOptions) -> Result<Response, ClientError> {
        self.request(Method::DELETE, url, options).await
    }

    pub async fn head(&self, url: Url, options: RequestOptions) -> Result<Response, ClientError> {
        self.request(Method::HEAD, url, options).await
    }
}

/// Resolves the endpoint for a versioned service from the catalog.
async fn init_client_opts(
    provider: &ProviderClient,
    mut eo: EndpointOpts,
    client_type: &str,
    version: u32,
) -> Result<ServiceClient, ClientError> {
    eo.apply_defaults(client_type);
    if let Some(requested) = eo.version.filter(|requested| *requested != 0 && *requested != version) {
        return Err(ClientError::VersionConflict {
            requested,
            supported: version,
        });
    }
    eo.version = Some(version);

    let url = provider.endpoint_url(&eo).await?;
    ServiceClient::new(provider.clone(), url, client_type)
}

fn with_suffix(client: ServiceClient, suffix: &str) -> Result<ServiceClient, ClientError> {
    let base = join_path(&client.endpoint, suffix)?;
    Ok(client.with_resource_base(base))
}

/// Identity v2.0 client. Without endpoint options the provider's identity
/// base is used and no session is required.
pub async fn identity_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let endpoint = if eo.is_empty() {
        join_path(provider.identity_base(), "v2.0/")?
    } else {
        let mut eo = eo;
        eo.apply_defaults("identity");
        parse_base_url(&provider.endpoint_url(&eo).await?)?
    };
    ServiceClient::new(provider.clone(), endpoint, "identity")
}

/// Identity v3 client. Catalog endpoints are re-based onto `/v3/`, since
/// clouds publish both unversioned and `/v2.0` identity URLs.
pub async fn identity_v3(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let endpoint = if eo.is_empty() {
        join_path(provider.identity_base(), "v3/")?
    } else {
        let mut eo = eo;
        eo.apply_defaults("identity");
        let located = parse_base_url(&provider.endpoint_url(&eo).await?)?;
        join_path(&base_endpoint(&located), "v3/")?
    };
    ServiceClient::new(provider.clone(), endpoint, "identity")
}

/// Compute v2 client.
pub async fn compute_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "compute", 2).await
}

/// Networking v2.0 client; resources live under `v2.0/`.
pub async fn network_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "network", 2).await?;
    with_suffix(client, "v2.0/")
}

/// Image v2 client; resources live under `v2/`.
pub async fn image_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "image", 2).await?;
    with_suffix(client, "v2/")
}

/// DNS v2 client, resources under `v2/`.
pub async fn dns_v2(provider: &ProviderClient, eo: EndpointOpts) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "dns", 2).await?;
    with_suffix(client, "v2/")
}

/// Block storage v1. Only ever published as `volume`.
pub async fn block_storage_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "volume", 1).await
}

/// Block storage v2, found under `block-storage` or one of its aliases.
pub async fn block_storage_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "block-storage", 2).await
}

/// Block storage v3.
pub async fn block_storage_v3(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "block-storage", 3).await
}

/// Object storage v1; the catalog URL already carries the account.
pub async fn object_storage_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "object-store", 1).await
}

/// Shared file systems v2.
pub async fn shared_file_system_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "shared-file-system", 2).await
}

/// Orchestration v1.
pub async fn orchestration_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "orchestration", 1).await
}

/// Database v1.
pub async fn db_v1(provider: &ProviderClient, eo: EndpointOpts) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "database", 1).await
}

/// Load balancer v2 client. Some clouds publish the endpoint with `v2.0/`
/// already appended; the resource base never doubles it.
pub async fn load_balancer_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "load-balancer", 2).await?;
    let endpoint = client.endpoint.as_str();
    let trimmed = endpoint.strip_suffix("v2.0/").unwrap_or(endpoint);
    let base = join_path(&parse_base_url(trimmed)?, "v2.0/")?;
    Ok(client.with_resource_base(base))
}

/// Messaging v2 client. Every request carries the `Client-ID` header.
pub async fn messaging_v2(
    provider: &ProviderClient,
    client_id: impl Into<String>,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "message", 2).await?;
    Ok(client.with_header("Client-ID", client_id))
}

/// Application container v1.
pub async fn container_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "application-container", 1).await
}

/// Key manager v1, resources under `v1/`.
pub async fn key_manager_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "key-manager", 1).await?;
    with_suffix(client, "v1/")
}

/// Container infrastructure management v1.
pub async fn container_infra_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "container-infrastructure-management", 1).await
}

/// Workflow v2.
pub async fn workflow_v2(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "workflow", 2).await
}

/// Placement v1.
pub async fn placement_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "placement", 1).await
}

/// Bare metal v1 client; `v1/` is appended unless the endpoint carries it.
pub async fn baremetal_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    let client = init_client_opts(provider, eo, "baremetal", 1).await?;
    if client.endpoint.path().trim_end_matches('/').ends_with("v1") {
        Ok(client)
    } else {
        with_suffix(client, "v1/")
    }
}

/// Bare metal introspection v1.
pub async fn baremetal_introspection_v1(
    provider: &ProviderClient,
    eo: EndpointOpts,
) -> Result<ServiceClient, ClientError> {
    init_client_opts(provider, eo, "baremetal-introspection", 1).await
}
