use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use serde::Serialize;

use crate::{ClientConfig, CloudApiError, CredentialPolicy, RequestContext, Result};

/// Header carrying the API key credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the correlation id, in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Ordered query parameters. Keys may repeat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.push((name.into(), value.to_string()));
    }

    /// Replaces every value stored under `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        self.0.retain(|(key, _)| *key != name);
        self.0.push((name, value.to_string()));
    }

    /// Adds the pair only when `value` is set.
    pub fn push_opt<V: ToString>(&mut self, name: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.push(name, value);
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.push(name, value);
        self
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.to_string()))
                .collect(),
        )
    }
}

/// Everything needed to issue one logical API call.
///
/// The body is held as encoded bytes so every retry sends the same payload.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
    pub query: QueryParams,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: QueryParams::new(),
        }
    }

    /// Builds a descriptor from a textual method such as `"GET"`.
    pub fn parse(method: &str, path: impl Into<String>) -> Result<Self> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|err| {
            CloudApiError::RequestConstruction(format!("invalid method '{method}': {err}"))
        })?;
        Ok(Self::new(method, path))
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Encodes `body` as JSON once and stores the bytes.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let encoded = serde_json::to_vec(body).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(
                method = %self.method,
                path = %self.path,
                error = %err,
                "failed to encode request body"
            );
            CloudApiError::Serialization(err)
        })?;
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Stores a pre-encoded body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }
}

/// Assembles a transport request from the client configuration, the call
/// context and a descriptor.
pub(crate) fn build_request(
    http: &reqwest::Client,
    config: &ClientConfig,
    ctx: &RequestContext,
    descriptor: &RequestDescriptor,
) -> Result<reqwest::Request> {
    #[cfg(feature = "tracing")]
    tracing::debug!(
        method = %descriptor.method,
        path = %descriptor.path,
        has_body = descriptor.body.is_some(),
        "building request"
    );

    let url = build_url(&config.base_url, &descriptor.path, &descriptor.query)?;
    let headers = build_headers(config, ctx)?;

    let mut builder = http
        .request(descriptor.method.clone(), url)
        .headers(headers);
    if let Some(body) = &descriptor.body {
        builder = builder.body(body.clone());
    }
    builder
        .build()
        .map_err(|err| CloudApiError::RequestConstruction(err.to_string()))
}

fn build_url(base_url: &str, path: &str, query: &QueryParams) -> Result<Url> {
    if let Some(bad) = path.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(CloudApiError::RequestConstruction(format!(
            "path {path:?} contains invalid character {bad:?}"
        )));
    }

    let raw = format!("{}{path}", base_url.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|err| {
        CloudApiError::RequestConstruction(format!("invalid url '{raw}': {err}"))
    })?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }
    Ok(url)
}

fn build_headers(config: &ClientConfig, ctx: &RequestContext) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let send_api_key = config.bearer_token.is_none()
        || config.credential_policy == CredentialPolicy::SendBoth;
    if let Some(token) = &config.bearer_token {
        headers.insert(
            header::AUTHORIZATION,
            header_value("authorization", &normalize_bearer_authorization(token))?,
        );
    }
    if let Some(api_key) = config.api_key.as_ref().filter(|_| send_api_key) {
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            header_value(API_KEY_HEADER, api_key)?,
        );
    }
    #[cfg(feature = "tracing")]
    if config.api_key.is_some() && !send_api_key {
        tracing::debug!("api key and bearer token both configured; sending bearer token only");
    }

    headers.insert(
        header::USER_AGENT,
        header_value("user-agent", &config.user_agent)?,
    );
    headers.insert(
        header::CONTENT_TYPE,
        header_value("content-type", &config.content_type)?,
    );

    // An unusable correlation id drops the header, never the call.
    if let Some(request_id) = ctx.request_id() {
        match HeaderValue::from_str(request_id) {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(request_id, "propagating request id");
                headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    request_id = ?request_id,
                    error = %_err,
                    "request id is not a valid header value; omitting it"
                );
            }
        }
    }

    for (name, value) in &config.custom_headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            CloudApiError::RequestConstruction(format!("invalid header name '{name}': {err}"))
        })?;
        let value = header_value(name.as_str(), value)?;
        headers.insert(name, value);
    }

    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|err| {
        CloudApiError::RequestConstruction(format!("invalid value for header '{name}': {err}"))
    })
}

pub(crate) fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
