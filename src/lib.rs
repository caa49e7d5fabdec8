//! `cloudapi-http` is the request execution core of a cloud REST API client.
//!
//! Resource services describe a call with a [`RequestDescriptor`] and hand it
//! to [`CloudApiClient`], which:
//! - builds the request with credentials, user agent and correlation id
//! - retries `429`/`5xx` responses and transport failures with exponential
//!   backoff ([`backoff_delay`])
//! - bounds the whole call by a timeout and a caller [`CancelToken`]
//! - decodes JSON or YAML bodies, rejecting `null` payloads
//!
//! [`Paginator`] and [`CloudApiClient::list_all`] walk offset/limit listings.

mod backoff;
mod classify;
mod client;
mod config;
mod context;
mod decode;
mod error;
mod options;
mod pagination;
mod request;

pub use backoff::backoff_delay;
pub use classify::{is_retryable_status, is_success_status};
pub use client::{CloudApiClient, LIMIT_PARAM, OFFSET_PARAM};
pub use config::{
    ClientConfig, CredentialPolicy, Region, DEFAULT_CONTENT_TYPE, DEFAULT_USER_AGENT,
};
pub use context::{CancelToken, RequestContext};
pub use decode::{decode_body, is_bodiless, ResponseFormat};
pub use error::{AttemptError, CloudApiError, HttpError};
pub use options::{ClientOptions, RetryConfig};
pub use pagination::{collect_all, Page, PageInfo, PageMeta, PaginatedResponse, Paginator};
pub use request::{QueryParams, RequestDescriptor, API_KEY_HEADER, REQUEST_ID_HEADER};

pub type Result<T> = std::result::Result<T, CloudApiError>;
