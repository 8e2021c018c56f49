//! Subnets: IP address blocks attached to a network.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::request::{RequestOptions, query_pairs};
use crate::service::ServiceClient;
use crate::ClientError;

/// A start/end range of addresses handed out by DHCP.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AllocationPool {
    pub start: String,
    pub end: String,
}

/// A static route pushed to instances through DHCP.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct HostRoute {
    pub destination: String,
    #[serde(rename = "nexthop")]
    pub next_hop: String,
}

/// A subnet as returned by the networking service.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub name: String,
    pub description: String,
    pub ip_version: u8,
    pub cidr: String,
    /// `None` when the subnet has no gateway.
    pub gateway_ip: Option<String>,
    pub dns_nameservers: Vec<String>,
    pub dns_publish_fixed_ip: Option<bool>,
    pub service_types: Vec<String>,
    pub allocation_pools: Vec<AllocationPool>,
    pub host_routes: Vec<HostRoute>,
    pub enable_dhcp: bool,
    pub tenant_id: String,
    pub project_id: String,
    pub ipv6_address_mode: Option<String>,
    pub ipv6_ra_mode: Option<String>,
    #[serde(rename = "subnetpool_id")]
    pub subnet_pool_id: Option<String>,
    pub tags: Vec<String>,
    pub revision_number: i64,
    pub segment_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Filters and sorting for [`list`]. Unset fields are not sent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ListOpts {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dns_publish_fixed_ip: Option<bool>,
    pub enable_dhcp: Option<bool>,
    pub network_id: Option<String>,
    pub tenant_id: Option<String>,
    pub project_id: Option<String>,
    pub ip_version: Option<u8>,
    pub gateway_ip: Option<String>,
    pub cidr: Option<String>,
    pub ipv6_address_mode: Option<String>,
    pub ipv6_ra_mode: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "subnetpool_id")]
    pub subnet_pool_id: Option<String>,
    pub limit: Option<u32>,
    pub marker: Option<String>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
    pub tags: Option<String>,
    #[serde(rename = "tags-any")]
    pub tags_any: Option<String>,
    #[serde(rename = "not-tags")]
    pub not_tags: Option<String>,
    #[serde(rename = "not-tags-any")]
    pub not_tags_any: Option<String>,
    pub revision_number: Option<i64>,
    pub segment_id: Option<String>,
}

/// Attributes of a new subnet. Only `network_id` is required.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CreateOpts {
    pub network_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allocation_pools: Vec<AllocationPool>,
    /// `None` lets the service pick a gateway, `Some("")` creates the
    /// subnet without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dhcp: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_publish_fixed_ip: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_types: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host_routes: Vec<HostRoute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_ra_mode: Option<String>,
    #[serde(rename = "subnetpool_id", skip_serializing_if = "Option::is_none")]
    pub subnet_pool_id: Option<String>,
    #[serde(rename = "prefixlen", skip_serializing_if = "Option::is_none")]
    pub prefix_len: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

impl CreateOpts {
    pub fn new(network_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            ..Self::default()
        }
    }

    /// The `{"subnet": {...}}` request body.
    pub fn to_body(&self) -> Result<Value, ClientError> {
        if self.network_id.is_empty() {
            return Err(ClientError::MissingInput("network_id"));
        }
        wrap_subnet(serde_json::to_value(self)?)
    }
}

/// Attributes to change on an existing subnet. Unset fields are left alone.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allocation_pools: Vec<AllocationPool>,
    /// `Some("")` removes the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
    /// `Some(vec![])` clears the nameservers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_nameservers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_publish_fixed_ip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_routes: Option<Vec<HostRoute>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dhcp: Option<bool>,
    /// Sent as `If-Match: revision_number=<n>`; the update fails when the
    /// subnet has moved on.
    #[serde(skip)]
    pub revision_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

impl UpdateOpts {
    /// The `{"subnet": {...}}` request body.
    pub fn to_body(&self) -> Result<Value, ClientError> {
        wrap_subnet(serde_json::to_value(self)?)
    }

    fn if_match(&self) -> Option<String> {
        self.revision_number
            .map(|revision| format!("revision_number={revision}"))
    }
}

// An empty gateway means "no gateway", which the API spells as null.
fn wrap_subnet(mut fields: Value) -> Result<Value, ClientError> {
    let Some(map) = fields.as_object_mut() else {
        return Err(ClientError::MalformedResponse(
            "subnet options did not serialize to an object".to_owned(),
        ));
    };
    if map.get("gateway_ip").and_then(Value::as_str) == Some("") {
        map.insert("gateway_ip".to_owned(), Value::Null);
    }
    Ok(serde_json::json!({ "subnet": fields }))
}

/// One page of a subnet listing.
#[derive(Clone, Debug, Default)]
pub struct SubnetPage {
    pub subnets: Vec<Subnet>,
    /// Link to the following page, when there is one.
    pub next: Option<Url>,
}

#[derive(Debug, Deserialize)]
struct SubnetList {
    #[serde(default)]
    subnets: Vec<Subnet>,
    #[serde(default)]
    subnets_links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    #[serde(default)]
    rel: String,
}

#[derive(Debug, Deserialize)]
struct SubnetBody {
    subnet: Subnet,
}

/// URL of the first listing page, with `opts` encoded in the query.
pub fn list_url(client: &ServiceClient, opts: &ListOpts) -> Result<Url, ClientError> {
    let mut url = client.service_url(&["subnets"])?;
    let pairs = query_pairs(opts)?;
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
}

/// Lists every subnet matching `opts`, following `next` links.
pub async fn list(client: &ServiceClient, opts: &ListOpts) -> Result<Vec<Subnet>, ClientError> {
    let mut url = list_url(client, opts)?;
    let mut subnets = Vec::new();

    loop {
        let page = list_page(client, url.clone()).await?;
        let empty = page.subnets.is_empty();
        subnets.extend(page.subnets);

        match page.next {
            Some(next) if !empty && next != url => url = next,
            _ => break,
        }
    }

    debug!(count = subnets.len(), "listed subnets");
    Ok(subnets)
}

/// Fetches a single listing page.
pub async fn list_page(client: &ServiceClient, url: Url) -> Result<SubnetPage, ClientError> {
    let response = client.get(url, RequestOptions::new()).await?;
    let body: SubnetList = response.json()?;

    let next = body
        .subnets_links
        .iter()
        .find(|link| link.rel == "next")
        .map(|link| Url::parse(&link.href))
        .transpose()?;

    Ok(SubnetPage {
        subnets: body.subnets,
        next,
    })
}

/// Fetches one subnet by id.
pub async fn get(client: &ServiceClient, id: &str) -> Result<Subnet, ClientError> {
    let url = client.service_url(&["subnets", id])?;
    let response = client.get(url, RequestOptions::new()).await?;
    Ok(response.json::<SubnetBody>()?.subnet)
}

/// Creates a subnet. `network_id` is the only field neutron requires.
pub async fn create(client: &ServiceClient, opts: &CreateOpts) -> Result<Subnet, ClientError> {
    let body = opts.to_body()?;
    let url = client.service_url(&["subnets"])?;
    let response = client.post(url, RequestOptions::new().json(body)).await?;
    Ok(response.json::<SubnetBody>()?.subnet)
}

/// Updates a subnet in place.
///
/// With `revision_number` set, the update is conditional and a stale
/// revision fails with `412 Precondition Failed`.
pub async fn update(
    client: &ServiceClient,
    id: &str,
    opts: &UpdateOpts,
) -> Result<Subnet, ClientError> {
    let body = opts.to_body()?;
    let url = client.service_url(&["subnets", id])?;

    let mut options = RequestOptions::new().json(body).ok_codes(&[200, 201]);
    if let Some(if_match) = opts.if_match() {
        options = options.header("If-Match", if_match);
    }

    let response = client.put(url, options).await?;
    Ok(response.json::<SubnetBody>()?.subnet)
}

/// Deletes a subnet.
pub async fn delete(client: &ServiceClient, id: &str) -> Result<(), ClientError> {
    let url = client.service_url(&["subnets", id])?;
    client.delete(url, RequestOptions::new()).await?;
    Ok(())
}
