use std::{fmt, sync::Arc};

use bytes::{Bytes, BytesMut};
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;

use crate::{
    classify::{is_retryable_status, is_success_status},
    context::CallGuard,
    decode::{decode_body, is_bodiless, ResponseFormat},
    pagination::{PaginatedResponse, Paginator},
    request::{build_request, REQUEST_ID_HEADER},
    AttemptError, ClientConfig, ClientOptions, CloudApiError, CredentialPolicy, HttpError,
    QueryParams, Region, RequestContext, RequestDescriptor, Result,
};

/// Query parameter carrying the listing offset.
pub const OFFSET_PARAM: &str = "_offset";

/// Query parameter carrying the page size.
pub const LIMIT_PARAM: &str = "_limit";

/// Response header carrying the server-side trace id.
#[cfg(feature = "tracing")]
const TRACE_ID_HEADER: &str = "x-mgc-trace-id";

/// HTTP client executing API calls with retries, backoff and deadlines.
///
/// Cloning is cheap; clones share the transport and the configuration.
#[derive(Clone)]
pub struct CloudApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl fmt::Debug for CloudApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudApiClient")
            .field("config", &self.config)
            .finish()
    }
}

/// Response of one attempt, with as much of the body as could be read.
struct RawResponse {
    status: StatusCode,
    content_type: Option<String>,
    request_id: Option<String>,
    body: Bytes,
    body_error: Option<reqwest::Error>,
}

impl CloudApiClient {
    /// Creates a client for `base_url` with default options and no
    /// credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(base_url))
    }

    /// Creates a client for a regional endpoint.
    pub fn for_region(region: Region) -> Self {
        Self::new(region.base_url())
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    /// Creates a client from `CLOUDAPI_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`] for the variables read.
    pub fn from_env() -> Result<Self> {
        ClientConfig::from_env().map(Self::from_config)
    }

    /// Sends `X-API-Key` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config_mut().api_key = Some(api_key.into());
        self
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config_mut().bearer_token = Some(token.into());
        self
    }

    pub fn with_credential_policy(mut self, policy: CredentialPolicy) -> Self {
        self.config_mut().credential_policy = policy;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config_mut().user_agent = user_agent.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config_mut().content_type = content_type.into();
        self
    }

    /// Adds a header sent with every request, replacing any default header
    /// of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_mut()
            .custom_headers
            .insert(name.into(), value.into());
        self
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.config_mut().options = options;
        self
    }

    /// Uses a preconfigured `reqwest` client as transport (proxies, TLS,
    /// pool settings).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ClientConfig {
        Arc::make_mut(&mut self.config)
    }

    /// Executes a call and decodes the response body into `T`.
    ///
    /// Returns `Ok(None)` only for bodiless success statuses such as
    /// `204 No Content`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        descriptor: &RequestDescriptor,
    ) -> Result<Option<T>> {
        let response = self.send_with_retry(ctx, descriptor).await?;
        if is_bodiless(response.status) {
            return Ok(None);
        }
        let format = ResponseFormat::from_content_type(response.content_type.as_deref());
        decode_body(&response.body, format).map(Some)
    }

    /// Executes a call whose success body is not needed.
    pub async fn execute_unit(
        &self,
        ctx: &RequestContext,
        descriptor: &RequestDescriptor,
    ) -> Result<()> {
        self.send_with_retry(ctx, descriptor).await.map(|_| ())
    }

    pub async fn get<T: DeserializeOwned>(&self, ctx: &RequestContext, path: &str) -> Result<T> {
        self.execute_value(ctx, &RequestDescriptor::get(path)).await
    }

    pub async fn post<B, T>(&self, ctx: &RequestContext, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let descriptor = RequestDescriptor::post(path).with_json(body)?;
        self.execute_value(ctx, &descriptor).await
    }

    pub async fn put<B, T>(&self, ctx: &RequestContext, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let descriptor = RequestDescriptor::put(path).with_json(body)?;
        self.execute_value(ctx, &descriptor).await
    }

    pub async fn patch<B, T>(&self, ctx: &RequestContext, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let descriptor = RequestDescriptor::patch(path).with_json(body)?;
        self.execute_value(ctx, &descriptor).await
    }

    pub async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        self.execute_unit(ctx, &RequestDescriptor::delete(path)).await
    }

    /// Fetches every item of a paginated listing at `path`.
    ///
    /// Each page is requested with `_offset` and `_limit` appended to
    /// `query` and decoded as a [`PaginatedResponse`].
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        query: &QueryParams,
        page_size: usize,
    ) -> Result<Vec<T>> {
        self.list_all_with(ctx, path, query, Paginator::new(page_size))
            .await
    }

    /// Like [`CloudApiClient::list_all`] with a custom [`Paginator`].
    pub async fn list_all_with<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        query: &QueryParams,
        paginator: Paginator,
    ) -> Result<Vec<T>> {
        paginator
            .collect_all(|offset, limit| {
                let mut query = query.clone();
                query.set(OFFSET_PARAM, offset);
                query.set(LIMIT_PARAM, limit);
                let descriptor = RequestDescriptor::get(path).with_query(query);
                async move {
                    let response: PaginatedResponse<T> =
                        self.execute_value(ctx, &descriptor).await?;
                    Ok(response.into_page())
                }
            })
            .await
    }

    async fn execute_value<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        descriptor: &RequestDescriptor,
    ) -> Result<T> {
        self.execute(ctx, descriptor)
            .await?
            .ok_or(CloudApiError::NullResponse)
    }

    /// Runs the attempt loop and returns the first success response.
    async fn send_with_retry(
        &self,
        ctx: &RequestContext,
        descriptor: &RequestDescriptor,
    ) -> Result<RawResponse> {
        let request = build_request(&self.http, &self.config, ctx, descriptor)?;
        let retry = &self.config.options.retry;
        let max_attempts = retry.effective_max_attempts();
        let guard = CallGuard::new(ctx, self.config.options.timeout());

        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let delay = retry.delay_before_retry(attempt - 1);
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "waiting before retry"
                );
                guard.run(sleep(delay)).await?;
            }
            guard.check()?;

            // Body bytes are shared, so every clone replays the same payload.
            let attempt_request = request.try_clone().ok_or_else(|| {
                CloudApiError::RequestConstruction("request body cannot be replayed".to_owned())
            })?;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %attempt_request.method(),
                url = %attempt_request.url(),
                attempt = attempt + 1,
                "sending request"
            );

            let failure = match guard.run(self.send_once(attempt_request)).await? {
                Ok(mut response) if is_success_status(response.status) => {
                    if let Some(err) = response.body_error.take() {
                        return Err(CloudApiError::Decode(format!(
                            "failed to read {} response body: {err}",
                            response.status
                        )));
                    }
                    return Ok(response);
                }
                Ok(response) => {
                    #[cfg(feature = "tracing")]
                    if let Some(err) = &response.body_error {
                        tracing::debug!(error = %err, "error response body was cut short");
                    }
                    let error =
                        HttpError::new(response.status, &response.body, response.request_id);
                    if !is_retryable_status(response.status) {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(status = error.status, "terminal http status");
                        return Err(CloudApiError::Http(error));
                    }
                    AttemptError::Http(error)
                }
                Err(err) => AttemptError::Transport(err),
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(attempt = attempt + 1, error = %failure, "attempt failed");

            attempt += 1;
            if attempt >= max_attempts {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempts = attempt, "retry attempts exhausted");
                return Err(CloudApiError::RetryExhausted {
                    attempts: attempt,
                    last_error: Box::new(failure),
                });
            }
        }
    }

    /// Sends one attempt. Only a failure to obtain a response at all is a
    /// transport error; a body that breaks off is kept as `body_error`.
    async fn send_once(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut response = self.http.execute(request).await?;
        let status = response.status();
        let content_type = header_string(response.headers(), header::CONTENT_TYPE.as_str());
        let request_id = header_string(response.headers(), REQUEST_ID_HEADER);

        #[cfg(feature = "tracing")]
        {
            let trace_id = header_string(response.headers(), TRACE_ID_HEADER);
            tracing::debug!(
                %status,
                request_id = request_id.as_deref().unwrap_or("-"),
                trace_id = trace_id.as_deref().unwrap_or("-"),
                "response received"
            );
        }

        let (body, body_error) = read_body(&mut response).await;
        Ok(RawResponse {
            status,
            content_type,
            request_id,
            body,
            body_error,
        })
    }
}

async fn read_body(response: &mut reqwest::Response) -> (Bytes, Option<reqwest::Error>) {
    let mut body = BytesMut::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => return (body.freeze(), None),
            Err(err) => return (body.freeze(), Some(err)),
        }
    }
}

fn header_string(headers: &header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::CloudApiClient;
    use crate::{ClientOptions, CredentialPolicy, Region, RetryConfig};

    #[test]
    fn debug_redacts_credentials() {
        let client = CloudApiClient::new("https://api.example.test")
            .with_api_key("secret-key")
            .with_bearer_token("secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn builder_does_not_affect_existing_clones() {
        let base = CloudApiClient::for_region(Region::Global);
        let tuned = base
            .clone()
            .with_header("X-Tenant", "t-1")
            .with_credential_policy(CredentialPolicy::SendBoth)
            .with_options(ClientOptions {
                timeout_ms: 0,
                retry: RetryConfig::new(
                    5,
                    Duration::from_millis(10),
                    Duration::from_secs(1),
                    1.5,
                ),
            });

        assert!(base.config().custom_headers.is_empty());
        assert_eq!(base.config().base_url, Region::Global.base_url());
        assert_eq!(tuned.config().custom_headers["X-Tenant"], "t-1");
        assert_eq!(tuned.config().credential_policy, CredentialPolicy::SendBoth);
        assert_eq!(tuned.config().options.retry.max_attempts, 5);
        assert_eq!(tuned.config().options.timeout(), None);
    }
}
