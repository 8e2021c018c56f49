//! Identity service: version negotiation, token exchange and the
//! reauthenticator installed on the provider.

pub mod discovery;
mod v2;
mod v3;

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info};

pub use discovery::{IdentityVersion, base_endpoint, choose_version};

use crate::catalog::EndpointOpts;
use crate::options::AuthOptions;
use crate::provider::{BoxFuture, Reauthenticator, Session};
use crate::service;
use crate::{ClientError, ProviderClient};

/// Creates an unauthenticated provider for an identity endpoint.
pub fn new_client(identity_endpoint: impl AsRef<str>) -> Result<ProviderClient, ClientError> {
    ProviderClient::new(identity_endpoint)
}

/// Creates a provider for `options.identity_endpoint` and authenticates it.
pub async fn authenticated_client(options: &AuthOptions) -> Result<ProviderClient, ClientError> {
    let provider = new_client(&options.identity_endpoint)?;
    authenticate(&provider, options).await?;
    Ok(provider)
}

/// Negotiates the identity version with the provider's identity endpoint,
/// then authenticates against it.
pub async fn authenticate(
    provider: &ProviderClient,
    options: &AuthOptions,
) -> Result<(), ClientError> {
    reject_passthrough_reauth(options)?;
    let (version, endpoint) = choose_version(provider, &IdentityVersion::ALL).await?;
    establish(provider, version, endpoint, options).await
}

/// Authenticates against identity v2.0, skipping negotiation.
///
/// With empty endpoint options the endpoint is `identity_base + "v2.0/"`.
pub async fn authenticate_v2(
    provider: &ProviderClient,
    options: &AuthOptions,
    eo: EndpointOpts,
) -> Result<(), ClientError> {
    reject_passthrough_reauth(options)?;
    let client = service::identity_v2(provider, eo).await?;
    establish(provider, IdentityVersion::V2, client.endpoint().clone(), options).await
}

/// Authenticates against identity v3, skipping negotiation.
///
/// With empty endpoint options the endpoint is `identity_base + "v3/"`.
pub async fn authenticate_v3(
    provider: &ProviderClient,
    options: &AuthOptions,
    eo: EndpointOpts,
) -> Result<(), ClientError> {
    reject_passthrough_reauth(options)?;
    let client = service::identity_v3(provider, eo).await?;
    establish(provider, IdentityVersion::V3, client.endpoint().clone(), options).await
}

// A looked-up token cannot be re-obtained once it expires.
fn reject_passthrough_reauth(options: &AuthOptions) -> Result<(), ClientError> {
    if options.allow_reauth && options.is_token_passthrough() {
        return Err(ClientError::ReauthWithPassthroughToken);
    }
    Ok(())
}

async fn establish(
    provider: &ProviderClient,
    version: IdentityVersion,
    endpoint: Url,
    options: &AuthOptions,
) -> Result<(), ClientError> {
    debug!(%version, %endpoint, "authenticating");
    let session = exchange(provider, version, &endpoint, options).await?;

    let reauthenticator = options.allow_reauth.then(|| {
        Arc::new(IdentityReauthenticator {
            version,
            endpoint: endpoint.clone(),
            options: options.without_reauth(),
        }) as Arc<dyn Reauthenticator>
    });

    info!(
        %version,
        %endpoint,
        catalog_entries = session.catalog.entries.len(),
        reauth = options.allow_reauth,
        "authenticated"
    );
    provider.install_session(session, reauthenticator).await;
    Ok(())
}

async fn exchange(
    provider: &ProviderClient,
    version: IdentityVersion,
    endpoint: &Url,
    options: &AuthOptions,
) -> Result<Session, ClientError> {
    match version {
        IdentityVersion::V2 => v2::authenticate(provider, endpoint, options).await,
        IdentityVersion::V3 => v3::authenticate(provider, endpoint, options).await,
    }
}

/// Repeats the original credential exchange against the same endpoint.
#[derive(Debug)]
struct IdentityReauthenticator {
    version: IdentityVersion,
    endpoint: Url,
    options: AuthOptions,
}

impl Reauthenticator for IdentityReauthenticator {
    fn reauthenticate<'a>(
        &'a self,
        throwaway: &'a ProviderClient,
    ) -> BoxFuture<'a, Result<Session, ClientError>> {
        Box::pin(exchange(
            throwaway,
            self.version,
            &self.endpoint,
            &self.options,
        ))
    }
}
