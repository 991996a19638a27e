use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use super::{Headers, HttpTransport, ProbeMethod, TransportError};

const NO_HEADERS: Headers<'static> = &[];
const FIRST_BYTE: Headers<'static> = &[("Range", "bytes=0-0")];

/// `reqwest`-backed transport with connection pooling.
///
/// The client is cheap to clone and is meant to be shared by every strategy
/// and the validator; per-request timeouts come from the caller.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            client: Self::build_client(connect_timeout),
        }
    }

    pub fn from_config(config: &crate::config::ResolverConfig) -> Self {
        Self::new(config.connect_timeout)
    }

    pub fn build_client(connect_timeout: Duration) -> Client {
        Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(8)
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client")
    }

    async fn send(
        &self,
        url: &str,
        request: RequestBuilder,
        headers: Headers<'_>,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let mut request = request.timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(url, "Request timed out");
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                warn!(url, error = %e, "Request network error");
                TransportError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            warn!(url, status = status.as_u16(), "Request returned error status");
            Err(TransportError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            })
        }
    }

    async fn read_text(url: &str, response: Response) -> Result<String, TransportError> {
        response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: Headers<'_>,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        debug!(url, timeout_ms = timeout.as_millis() as u64, "POST");
        let response = self
            .send(url, self.client.post(url).json(body), headers, timeout)
            .await?;
        Self::read_text(url, response).await
    }

    async fn get_text(
        &self,
        url: &str,
        headers: Headers<'_>,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        debug!(url, timeout_ms = timeout.as_millis() as u64, "GET");
        let response = self.send(url, self.client.get(url), headers, timeout).await?;
        Self::read_text(url, response).await
    }

    async fn probe(
        &self,
        url: &str,
        method: ProbeMethod,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let (request, headers) = match method {
            ProbeMethod::Head => (self.client.head(url), NO_HEADERS),
            ProbeMethod::RangedGet => (self.client.get(url), FIRST_BYTE),
        };
        // Dropping the response without reading it closes the body stream.
        self.send(url, request, headers, timeout).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_text_returns_body_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(header("cookie", "CONSENT=YES+cb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::default();
        let body = transport
            .get_text(
                &format!("{}/watch", server.uri()),
                &[("Cookie", "CONSENT=YES+cb")],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(body.contains("ok"));
    }

    #[tokio::test]
    async fn post_json_sends_body_and_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/player"))
            .and(header("user-agent", "test-agent/1.0"))
            .and(body_partial_json(serde_json::json!({ "videoId": "abc123" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::default();
        let body = transport
            .post_json(
                &format!("{}/player", server.uri()),
                &[("User-Agent", "test-agent/1.0")],
                &serde_json::json!({ "videoId": "abc123" }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn post_json_reports_status_on_403() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::default();
        let err = transport
            .post_json(
                &format!("{}/player", server.uri()),
                &[],
                &serde_json::json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn get_text_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::default();
        let err = transport
            .get_text(&server.uri(), &[], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn probe_head_accepts_2xx_and_rejects_404() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/live.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/expired.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::default();
        let timeout = Duration::from_secs(5);
        assert!(transport
            .probe(&format!("{}/live.mp4", server.uri()), ProbeMethod::Head, timeout)
            .await
            .is_ok());
        let err = transport
            .probe(&format!("{}/expired.mp4", server.uri()), ProbeMethod::Head, timeout)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn probe_ranged_get_sends_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .and(header("range", "bytes=0-0"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8]))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::default();
        let result = transport
            .probe(
                &format!("{}/video.mp4", server.uri()),
                ProbeMethod::RangedGet,
                Duration::from_secs(5),
            )
            .await;
        assert!(result.is_ok());
    }
}
