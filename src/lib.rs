//! Async client library for OpenStack clouds.
//!
//! Public API layers:
//! - [`identity`]: identity version negotiation, v2.0/v3 authentication and
//!   transparent reauthentication.
//! - [`ProviderClient`]: shared session (token plus service catalog) and the
//!   HTTP send path with reauthenticate-and-retry on `401`.
//! - [`service`]: [`ServiceClient`] constructors that resolve an endpoint from
//!   the catalog, one per OpenStack service.
//! - [`networking`]: typed networking resources.
//! - [`ClientError`]: unified error type used by all layers.
//!
//! ```no_run
//! # async fn run() -> Result<(), openstack_client::ClientError> {
//! use openstack_client::networking::v2::subnets;
//! use openstack_client::{AuthOptions, EndpointOpts, identity, service};
//!
//! let options = AuthOptions::from_env()?.with_reauth(true);
//! let provider = identity::authenticated_client(&options).await?;
//! let network = service::network_v2(&provider, EndpointOpts::new().region("RegionOne")).await?;
//! let all = subnets::list(&network, &subnets::ListOpts::default()).await?;
//! # let _ = all;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;
pub mod identity;
pub mod networking;
mod options;
mod provider;
mod request;
pub mod service;

/// Endpoint resolution against the session catalog.
pub use catalog::{
    Availability, CatalogEndpoint, CatalogEntry, EndpointOpts, ServiceCatalog,
    service_type_aliases,
};
/// Error type returned by all client operations.
pub use error::ClientError;
/// Credentials and token scope.
pub use options::{AuthOptions, AuthScope};
/// Shared provider state.
pub use provider::{
    AUTH_TOKEN_HEADER, AuthPhase, BoxFuture, ProviderClient, Reauthenticator, Session, Token,
    TokenScope,
};
/// Per-request options and responses.
pub use request::{RequestOptions, Response, default_ok_codes, normalize_url, query_pairs};
/// Client bound to one service endpoint.
pub use service::ServiceClient;
