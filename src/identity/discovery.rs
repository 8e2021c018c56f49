use std::fmt;

use reqwest::{Method, Url};
use serde::Deserialize;
use tracing::debug;

use crate::request::{RequestOptions, ensure_trailing_slash, normalize_url};
use crate::{ClientError, ProviderClient};

/// Identity API major versions this client can authenticate against.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IdentityVersion {
    V2,
    V3,
}

impl IdentityVersion {
    /// Every version, in no particular order.
    pub const ALL: [Self; 2] = [Self::V2, Self::V3];

    /// Version id as published in discovery documents.
    pub fn id(self) -> &'static str {
        match self {
            Self::V2 => "v2.0",
            Self::V3 => "v3",
        }
    }

    /// Higher wins when several versions are available.
    pub fn priority(self) -> u8 {
        match self {
            Self::V2 => 20,
            Self::V3 => 30,
        }
    }

    /// Path suffix of an endpoint already pinned to this version.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::V2 => "/v2.0/",
            Self::V3 => "/v3/",
        }
    }
}

impl fmt::Display for IdentityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Deserialize)]
struct Discovery {
    #[serde(default)]
    versions: Option<VersionList>,
    #[serde(default)]
    version: Option<VersionValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionList {
    Wrapped { values: Vec<VersionValue> },
    Bare(Vec<VersionValue>),
}

#[derive(Debug, Deserialize)]
struct VersionValue {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    href: String,
    #[serde(default)]
    rel: String,
}

impl VersionValue {
    fn self_href(&self) -> Option<String> {
        self.links
            .iter()
            .rev()
            .find(|link| link.rel == "self" && !link.href.is_empty())
            .map(|link| normalize_url(&link.href))
    }

    fn has_usable_status(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "current" | "supported" | "stable"
        )
    }
}

/// Picks the identity version and the endpoint to request tokens from.
///
/// An identity endpoint that already ends with a recognized version suffix
/// is used as is. Otherwise the unversioned base is queried and the
/// highest-priority version with a usable status wins, unless one of the
/// advertised versions points exactly at the identity endpoint.
pub async fn choose_version(
    provider: &ProviderClient,
    recognized: &[IdentityVersion],
) -> Result<(IdentityVersion, Url), ClientError> {
    let identity_endpoint = provider.identity_endpoint();

    for version in recognized {
        if identity_endpoint.as_str().ends_with(version.suffix()) {
            debug!(%version, endpoint = %identity_endpoint, "identity version pinned by endpoint");
            return Ok((*version, identity_endpoint.clone()));
        }
    }

    let base = provider.identity_base();
    let response = provider
        .request(
            Method::GET,
            base.clone(),
            RequestOptions::new().ok_codes(&[200, 300]).omit_token(),
        )
        .await?;
    let discovery: Discovery = response.json()?;
    let values = match (discovery.versions, discovery.version) {
        (Some(VersionList::Wrapped { values } | VersionList::Bare(values)), _) => values,
        (None, Some(single)) => vec![single],
        (None, None) => Vec::new(),
    };

    let mut highest: Option<(IdentityVersion, Option<String>)> = None;

    for value in &values {
        let href = value.self_href();

        for version in recognized {
            if !value.id.contains(version.id()) {
                continue;
            }

            if href.as_deref() == Some(identity_endpoint.as_str()) {
                debug!(%version, endpoint = %identity_endpoint, "identity version matches endpoint");
                return Ok((*version, identity_endpoint.clone()));
            }

            if value.has_usable_status()
                && highest.as_ref().is_none_or(|(best, _)| version.priority() > best.priority())
            {
                highest = Some((*version, href.clone()));
            }
        }
    }

    let Some((version, href)) = highest else {
        return Err(ClientError::NoSupportedVersion(base.to_string()));
    };
    let Some(href) = href else {
        return Err(ClientError::MissingVersionEndpoint {
            version: version.id().to_owned(),
            base: base.to_string(),
        });
    };

    debug!(%version, endpoint = %href, "identity version negotiated");
    Ok((version, Url::parse(&href)?))
}

/// Cuts a URL before its first `v<digits>` path segment, dropping query and
/// fragment. The result always ends with `/`.
pub fn base_endpoint(endpoint: &Url) -> Url {
    let mut base = endpoint.clone();
    base.set_query(None);
    base.set_fragment(None);

    let segments: Vec<&str> = endpoint.path().split('/').collect();
    let cut = segments
        .iter()
        .position(|segment| is_version_segment(segment))
        .unwrap_or(segments.len());
    base.set_path(&segments[..cut].join("/"));

    ensure_trailing_slash(base)
}

fn is_version_segment(segment: &str) -> bool {
    let Some(rest) = segment.strip_prefix('v') else {
        return false;
    };
    rest.starts_with(|c: char| c.is_ascii_digit())
        && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
}
