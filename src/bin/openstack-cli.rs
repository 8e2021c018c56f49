use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use openstack_client::networking::v2::subnets;
use openstack_client::{
    AuthOptions, Availability, EndpointOpts, ProviderClient, RequestOptions,
    ServiceClient, TokenScope, identity, service,
};
use reqwest::Method;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "openstack-cli",
    version,
    about = "Small async CLI for authenticating against OpenStack and querying its services"
)]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    /// Region used for endpoint lookups.
    #[arg(long, env = "OS_REGION_NAME", global = true)]
    region: Option<String>,

    /// Endpoint interface: public, internal or admin.
    #[arg(long, env = "OS_INTERFACE", default_value = "public", global = true)]
    interface: String,

    /// Emit compact JSON instead of pretty-printed output.
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

/// Flags override the matching `OS_*` variable; everything else, including
/// `OS_TENANT_*`, `OS_DOMAIN_*`, application credentials and
/// `OS_SYSTEM_SCOPE`, is read from the environment.
#[derive(Debug, Args)]
struct AuthArgs {
    /// Identity endpoint, versioned or not. [env: OS_AUTH_URL]
    #[arg(long)]
    auth_url: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    user_domain_name: Option<String>,

    #[arg(long)]
    user_domain_id: Option<String>,

    #[arg(long)]
    project_id: Option<String>,

    #[arg(long)]
    project_name: Option<String>,

    /// Domain of `--project-name`. Defaults to the user's domain.
    #[arg(long)]
    project_domain_name: Option<String>,

    #[arg(long)]
    project_domain_id: Option<String>,

    /// Existing token; looked up as is unless a project is given.
    #[arg(long)]
    token: Option<String>,
}

impl AuthArgs {
    fn overrides(&self) -> [(&'static str, Option<&String>); 12] {
        [
            ("OS_AUTH_URL", self.auth_url.as_ref()),
            ("OS_USERNAME", self.username.as_ref()),
            ("OS_USERID", self.user_id.as_ref()),
            ("OS_USER_ID", self.user_id.as_ref()),
            ("OS_PASSWORD", self.password.as_ref()),
            ("OS_USER_DOMAIN_NAME", self.user_domain_name.as_ref()),
            ("OS_USER_DOMAIN_ID", self.user_domain_id.as_ref()),
            ("OS_PROJECT_ID", self.project_id.as_ref()),
            ("OS_PROJECT_NAME", self.project_name.as_ref()),
            ("OS_PROJECT_DOMAIN_NAME", self.project_domain_name.as_ref()),
            ("OS_PROJECT_DOMAIN_ID", self.project_domain_id.as_ref()),
            ("OS_TOKEN", self.token.as_ref()),
        ]
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authenticate and print the issued token.
    Token,
    /// Print the service catalog of the session.
    Catalog,
    /// Resolve the endpoint of a service type.
    Endpoint {
        /// Service type, for example `network` or `compute`.
        service_type: String,
    },
    /// Manage networking subnets.
    #[command(subcommand)]
    Subnet(SubnetCommand),
    /// Send a raw HTTP request to a service endpoint.
    Request(RequestArgs),
}

#[derive(Debug, Subcommand)]
enum SubnetCommand {
    /// List subnets, following pagination.
    List {
        #[arg(long)]
        network_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show one subnet.
    Get { id: String },
    /// Create a subnet.
    Create {
        #[arg(long)]
        network_id: String,
        #[arg(long)]
        cidr: String,
        #[arg(long, default_value_t = 4)]
        ip_version: u8,
        #[arg(long)]
        name: Option<String>,
        /// Create the subnet without a gateway.
        #[arg(long)]
        no_gateway: bool,
    },
    /// Delete a subnet.
    Delete { id: String },
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// Service type whose endpoint the path is relative to.
    service_type: String,

    /// HTTP method (GET, POST, PUT, DELETE, ...).
    method: String,

    /// Request path (for example: v2.0/networks).
    path: String,

    /// Query parameter in form key=value. Repeat as needed.
    #[arg(long = "query", value_name = "KEY=VALUE")]
    query: Vec<String>,

    #[command(flatten)]
    body: BodyInput,
}

#[derive(Debug, Args)]
struct BodyInput {
    /// JSON request body literal.
    #[arg(long, conflicts_with = "body_file")]
    body_json: Option<String>,

    /// Path to a file containing a JSON request body.
    #[arg(long, value_name = "PATH", conflicts_with = "body_json")]
    body_file: Option<PathBuf>,
}

/// Entry point for the async CLI.
///
/// Authenticates with the `OS_*` settings, dispatches the subcommand and
/// prints JSON output.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let availability = Availability::from_str(&cli.interface)
        .with_context(|| format!("invalid --interface '{}'", cli.interface))?;
    let options = auth_options(&cli.auth)?;
    let provider = identity::authenticated_client(&options)
        .await
        .with_context(|| format!("failed to authenticate against '{}'", options.identity_endpoint))?;

    let mut eo = EndpointOpts::new().availability(availability);
    if let Some(region) = &cli.region {
        eo = eo.region(region.clone());
    }

    let output = match &cli.command {
        Command::Token => token(&provider).await?,
        Command::Catalog => {
            let session = provider
                .session()
                .await
                .context("provider has no session after authentication")?;
            serde_json::to_value(&session.catalog).context("failed to render catalog")?
        }
        Command::Endpoint { service_type } => {
            let url = provider
                .endpoint_url(&eo.clone().service_type(service_type.clone()))
                .await
                .with_context(|| format!("no endpoint for service type '{service_type}'"))?;
            json!({ "service_type": service_type, "url": url })
        }
        Command::Subnet(command) => {
            let network = service::network_v2(&provider, eo)
                .await
                .context("failed to resolve the network endpoint")?;
            subnet(&network, command).await?
        }
        Command::Request(args) => send_request(&provider, eo, args)
            .await
            .with_context(|| format!("request failed: {} {}", args.method, args.path))?,
    };

    print_json(&output, cli.compact).context("failed to print JSON output")?;
    Ok(())
}

/// Logs go to stderr so stdout stays valid JSON. `RUST_LOG` overrides the
/// default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn auth_options(args: &AuthArgs) -> Result<AuthOptions> {
    auth_options_from(args, |name| std::env::var(name).ok())
}

/// Reads the `OS_*` settings through `env`, with flags taking precedence.
fn auth_options_from<F>(args: &AuthArgs, env: F) -> Result<AuthOptions>
where
    F: Fn(&str) -> Option<String>,
{
    let overrides = args.overrides();
    AuthOptions::from_lookup(|name| {
        overrides
            .iter()
            .find(|(key, value)| *key == name && value.is_some())
            .and_then(|(_, value)| *value)
            .cloned()
            .or_else(|| env(name))
    })
    .context("incomplete credentials: set OS_* variables or pass --auth-url and friends")
}

async fn token(provider: &ProviderClient) -> Result<Value> {
    let session = provider
        .session()
        .await
        .context("provider has no session after authentication")?;

    let scope = match &session.scope {
        Some(TokenScope::Project { id, name, .. }) => json!({ "project": { "id": id, "name": name } }),
        Some(TokenScope::Domain { id, name }) => json!({ "domain": { "id": id, "name": name } }),
        Some(TokenScope::System) => json!({ "system": true }),
        Some(TokenScope::Trust { id }) => json!({ "trust": { "id": id } }),
        None => Value::Null,
    };

    Ok(json!({
        "id": session.token.id,
        "expires_at": session.token.expires_at,
        "identity_version": session.identity_version.to_string(),
        "scope": scope,
    }))
}

async fn subnet(network: &ServiceClient, command: &SubnetCommand) -> Result<Value> {
    let value = match command {
        SubnetCommand::List { network_id, name } => {
            let opts = subnets::ListOpts {
                network_id: network_id.clone(),
                name: name.clone(),
                ..subnets::ListOpts::default()
            };
            let all = subnets::list(network, &opts)
                .await
                .context("failed to list subnets")?;
            serde_json::to_value(all)?
        }
        SubnetCommand::Get { id } => {
            let subnet = subnets::get(network, id)
                .await
                .with_context(|| format!("failed to get subnet '{id}'"))?;
            serde_json::to_value(subnet)?
        }
        SubnetCommand::Create {
            network_id,
            cidr,
            ip_version,
            name,
            no_gateway,
        } => {
            let opts = subnets::CreateOpts {
                cidr: Some(cidr.clone()),
                ip_version: Some(*ip_version),
                name: name.clone(),
                gateway_ip: no_gateway.then(String::new),
                ..subnets::CreateOpts::new(network_id.clone())
            };
            let subnet = subnets::create(network, &opts)
                .await
                .context("failed to create subnet")?;
            serde_json::to_value(subnet)?
        }
        SubnetCommand::Delete { id } => {
            subnets::delete(network, id)
                .await
                .with_context(|| format!("failed to delete subnet '{id}'"))?;
            json!({ "deleted": id })
        }
    };
    Ok(value)
}

/// Sends a raw HTTP request relative to a catalog endpoint.
async fn send_request(
    provider: &ProviderClient,
    eo: EndpointOpts,
    args: &RequestArgs,
) -> Result<Value> {
    // Validate method eagerly so CLI errors are explicit before any network call.
    let method = Method::from_str(&args.method)
        .with_context(|| format!("invalid HTTP method '{}'", args.method))?;
    let query = parse_pairs(&args.query, "--query").context("failed to parse --query arguments")?;
    let body = parse_body(&args.body).context("failed to parse request body input")?;

    let endpoint = provider
        .endpoint_url(&eo.service_type(args.service_type.clone()))
        .await
        .with_context(|| format!("no endpoint for service type '{}'", args.service_type))?;
    let client = ServiceClient::new(provider.clone(), &endpoint, args.service_type.clone())?;
    let url = client.service_url(&[&args.path])?;

    let mut options = RequestOptions::new().query(query);
    if let Some(body) = body {
        options = options.json(body);
    }
    // Raw requests accept whatever 2xx the service answers with.
    options = options.ok_codes(&[200, 201, 202, 203, 204]);

    let response = client.request(method, url, options).await?;
    Ok(response.json_value()?)
}

/// Parses repeated `key=value` arguments into owned key/value pairs.
fn parse_pairs(values: &[String], flag_name: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(values.len());
    for item in values {
        let Some((key, value)) = item.split_once('=') else {
            bail!("invalid {flag_name} value '{item}': expected key=value");
        };
        if key.is_empty() {
            bail!("invalid {flag_name} value '{item}': empty key");
        }
        pairs.push((key.to_owned(), value.to_owned()));
    }
    Ok(pairs)
}

/// Parses an optional JSON body from inline text or a file path.
fn parse_body(body: &BodyInput) -> Result<Option<Value>> {
    match (&body.body_json, &body.body_file) {
        (Some(raw), None) => serde_json::from_str(raw)
            .context("failed to parse JSON from --body-json")
            .map(Some),
        (None, Some(path)) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read --body-file '{}'", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| {
                    format!("failed to parse JSON in --body-file '{}'", path.display())
                })
                .map(Some)
        }
        (None, None) => Ok(None),
        (Some(_), Some(_)) => bail!("use only one of --body-json or --body-file"),
    }
}

fn print_json(value: &Value, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    println!("{}", rendered.context("failed to render JSON")?);
    Ok(())
}
