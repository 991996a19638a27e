mod http;

pub use http::ReqwestTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP error {status} fetching {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How the stream validator touches a candidate URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    /// `HEAD` request, no body.
    #[default]
    Head,
    /// `GET` with `Range: bytes=0-0`, for hosts that reject `HEAD`.
    RangedGet,
}

/// Header name/value pairs attached to a single request.
pub type Headers<'a> = &'a [(&'a str, &'a str)];

/// Trait for the HTTP calls the resolution strategies and the validator make.
///
/// Every call carries its own timeout so strategies can be bounded
/// independently. The trait is object-safe and Send + Sync so one transport
/// can be shared by any number of concurrent resolutions.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body and return the response text of a 2xx reply.
    async fn post_json(
        &self,
        url: &str,
        headers: Headers<'_>,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<String, TransportError>;

    /// GET a page and return the response text of a 2xx reply.
    async fn get_text(
        &self,
        url: &str,
        headers: Headers<'_>,
        timeout: Duration,
    ) -> Result<String, TransportError>;

    /// Check that `url` answers with a 2xx status without downloading the body.
    async fn probe(
        &self,
        url: &str,
        method: ProbeMethod,
        timeout: Duration,
    ) -> Result<(), TransportError>;
}
