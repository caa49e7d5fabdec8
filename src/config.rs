use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{ClientOptions, CloudApiError, Result};

/// Default `User-Agent` header value.
pub const DEFAULT_USER_AGENT: &str = concat!("cloudapi-http/", env!("CARGO_PKG_VERSION"));

/// Default `Content-Type` header value.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Regional API endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    BrNe1,
    BrSe1,
    BrMgl1,
    /// Endpoint for services that are not bound to a region.
    Global,
}

impl Region {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::BrNe1 => "https://api.magalu.cloud/br-ne1",
            Self::BrSe1 => "https://api.magalu.cloud/br-se1",
            Self::BrMgl1 => "https://api.magalu.cloud/br-se-1",
            Self::Global => "https://api.magalu.cloud",
        }
    }
}

impl FromStr for Region {
    type Err = CloudApiError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "br-ne1" => Ok(Self::BrNe1),
            "br-se1" => Ok(Self::BrSe1),
            "br-mgl1" => Ok(Self::BrMgl1),
            "global" => Ok(Self::Global),
            other => Err(CloudApiError::Config(format!("unknown region '{other}'"))),
        }
    }
}

/// What to send when both an API key and a bearer token are configured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Send only `Authorization: Bearer …`.
    #[default]
    PreferBearer,
    /// Send `Authorization` and `X-API-Key` together.
    SendBoth,
}

/// Read-only configuration shared by every call of a client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Value for the `X-API-Key` header.
    pub api_key: Option<String>,
    /// Token for `Authorization: Bearer`. The prefix is optional.
    pub bearer_token: Option<String>,
    pub credential_policy: CredentialPolicy,
    pub user_agent: String,
    pub content_type: String,
    /// Extra headers; each replaces a same-named default header.
    pub custom_headers: BTreeMap<String, String>,
    pub options: ClientOptions,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .field("credential_policy", &self.credential_policy)
            .field("user_agent", &self.user_agent)
            .field("content_type", &self.content_type)
            .field("custom_headers", &self.custom_headers)
            .field("options", &self.options)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            bearer_token: None,
            credential_policy: CredentialPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            custom_headers: BTreeMap::new(),
            options: ClientOptions::default(),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Reads:
    /// - `CLOUDAPI_BASE_URL`, or `CLOUDAPI_REGION` (`br-ne1`, `br-se1`,
    ///   `br-mgl1`, `global`) when the URL is unset
    /// - `CLOUDAPI_API_KEY` and/or `CLOUDAPI_TOKEN` (at least one)
    /// - `CLOUDAPI_USER_AGENT` (optional)
    /// - `CLOUDAPI_TIMEOUT_MS` and `CLOUDAPI_MAX_ATTEMPTS` (optional)
    pub fn from_env() -> Result<Self> {
        let base_url = match non_empty_var("CLOUDAPI_BASE_URL") {
            Some(url) => url,
            None => {
                let region = non_empty_var("CLOUDAPI_REGION").ok_or_else(|| {
                    CloudApiError::Config(
                        "missing CLOUDAPI_BASE_URL or CLOUDAPI_REGION environment variable"
                            .to_owned(),
                    )
                })?;
                region.parse::<Region>()?.base_url().to_owned()
            }
        };

        let mut config = Self::new(base_url);
        config.api_key = non_empty_var("CLOUDAPI_API_KEY");
        config.bearer_token = non_empty_var("CLOUDAPI_TOKEN");
        if config.api_key.is_none() && config.bearer_token.is_none() {
            return Err(CloudApiError::Config(
                "missing CLOUDAPI_API_KEY or CLOUDAPI_TOKEN environment variable".to_owned(),
            ));
        }

        if let Some(user_agent) = non_empty_var("CLOUDAPI_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(timeout_ms) = parse_var::<u64>("CLOUDAPI_TIMEOUT_MS")? {
            config.options.timeout_ms = timeout_ms;
        }
        if let Some(max_attempts) = parse_var::<u32>("CLOUDAPI_MAX_ATTEMPTS")? {
            if max_attempts == 0 {
                return Err(CloudApiError::Config(
                    "CLOUDAPI_MAX_ATTEMPTS must be at least 1".to_owned(),
                ));
            }
            config.options.retry.max_attempts = max_attempts;
        }

        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    non_empty_var(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| CloudApiError::Config(format!("{name} has invalid value '{value}'")))
        })
        .transpose()
}
