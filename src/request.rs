use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ClientError;

/// Per-request knobs for [`crate::ProviderClient::request`].
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// JSON body sent with the request.
    pub json: Option<Value>,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Extra headers. Entries with an empty value are skipped.
    pub headers: Vec<(String, String)>,
    /// Accepted status codes. Empty means the method's defaults.
    pub ok_codes: Vec<u16>,
    /// Skip the `X-Auth-Token` header and never reauthenticate.
    pub omit_token: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    #[must_use]
    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    #[must_use]
    pub fn omit_token(mut self) -> Self {
        self.omit_token = true;
        self
    }

    pub(crate) fn accepts(&self, method: &Method, status: StatusCode) -> bool {
        let code = status.as_u16();
        if self.ok_codes.is_empty() {
            default_ok_codes(method).contains(&code)
        } else {
            self.ok_codes.contains(&code)
        }
    }
}

/// Status codes OpenStack services answer with on success, by method.
pub fn default_ok_codes(method: &Method) -> &'static [u16] {
    match *method {
        Method::GET => &[200],
        Method::POST | Method::PUT => &[201, 202],
        Method::PATCH => &[200, 202, 204],
        Method::DELETE => &[202, 204],
        Method::HEAD => &[204],
        _ => &[],
    }
}

/// A successful response, body already read.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    /// Parses the body as JSON. An empty body becomes [`Value::Null`].
    pub fn json_value(&self) -> Result<Value, ClientError> {
        if self.body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&self.body)?)
        }
    }

    /// Deserializes the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Appends a trailing slash to a URL string when missing.
pub fn normalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    }
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let parsed = Url::parse(raw).map_err(|_| ClientError::InvalidBaseUrl(raw.to_owned()))?;
    // `cloud:5000/v3` parses with `cloud` as its scheme.
    if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(ensure_trailing_slash(parsed))
}

pub(crate) fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_owned();
        path.push('/');
        url.set_path(&path);
    }
    url
}

/// Joins a relative path onto a base URL that ends with a slash.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, ClientError> {
    let relative = path.trim_start_matches('/');
    base.join(relative)
        .map_err(|_| ClientError::InvalidPath(path.to_owned()))
}

/// Flattens a serializable options struct into query pairs.
///
/// `None` fields are skipped; booleans and numbers use their JSON spelling.
pub fn query_pairs<T: Serialize>(options: &T) -> Result<Vec<(String, String)>, ClientError> {
    let Value::Object(fields) = serde_json::to_value(options)? else {
        return Ok(Vec::new());
    };

    let mut pairs = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::String(text) if text.is_empty() => {}
            Value::String(text) => pairs.push((key, text)),
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_to_string(item) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_to_string(other) {
                    pairs.push((key, text));
                }
            }
        }
    }
    Ok(pairs)
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode};
    use serde::Serialize;

    use super::{RequestOptions, join_path, normalize_url, parse_base_url, query_pairs};
    use crate::ClientError;

    #[test]
    fn joins_paths_from_base_with_nested_prefix() {
        let base = parse_base_url("https://example.com:9696/networking").expect("valid url");
        let resolved = join_path(&base, "/v2.0/subnets").expect("valid path");
        assert_eq!(
            resolved.as_str(),
            "https://example.com:9696/networking/v2.0/subnets"
        );
    }

    #[test]
    fn base_url_needs_http_scheme_and_host() {
        for raw in ["cloud:5000/v3", "mailto:admin@cloud", "ftp://cloud/v3", "not a url"] {
            assert!(
                matches!(parse_base_url(raw), Err(ClientError::InvalidBaseUrl(ref url)) if url == raw),
                "{raw} should be rejected"
            );
        }
        assert!(parse_base_url("https://cloud:5000/v3").is_ok());
    }

    #[test]
    fn normalize_adds_single_trailing_slash() {
        assert_eq!(normalize_url("http://cloud:5000"), "http://cloud:5000/");
        assert_eq!(normalize_url("http://cloud:5000/"), "http://cloud:5000/");
    }

    #[test]
    fn default_codes_depend_on_method() {
        let options = RequestOptions::new();
        assert!(options.accepts(&Method::GET, StatusCode::OK));
        assert!(!options.accepts(&Method::GET, StatusCode::CREATED));
        assert!(options.accepts(&Method::DELETE, StatusCode::NO_CONTENT));

        let explicit = RequestOptions::new().ok_codes(&[200, 201]);
        assert!(explicit.accepts(&Method::PUT, StatusCode::OK));
    }

    #[derive(Serialize)]
    struct Filters {
        name: Option<String>,
        enable_dhcp: Option<bool>,
        limit: Option<u32>,
        marker: String,
    }

    #[test]
    fn query_pairs_skip_unset_fields() {
        let filters = Filters {
            name: Some("private".to_owned()),
            enable_dhcp: Some(false),
            limit: None,
            marker: String::new(),
        };
        let mut pairs = query_pairs(&filters).expect("serializable");
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("enable_dhcp".to_owned(), "false".to_owned()),
                ("name".to_owned(), "private".to_owned()),
            ]
        );
    }
}
