use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::config::ResolverConfig;
use crate::transport::{HttpTransport, ProbeMethod};

/// Cheap reachability check for a chosen stream URL.
///
/// A probe never fails loudly: anything other than a 2xx answer within the
/// timeout (bad URL, 4xx/5xx, refused connection, slow host) is `false`.
pub struct StreamValidator {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    method: ProbeMethod,
}

impl StreamValidator {
    pub fn new(transport: Arc<dyn HttpTransport>, timeout: Duration, method: ProbeMethod) -> Self {
        Self {
            transport,
            timeout,
            method,
        }
    }

    pub fn from_config(config: &ResolverConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(transport, config.probe_timeout, config.probe_method)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn probe(&self, url: &str) -> bool {
        if !is_http_url(url) {
            warn!(url, "Refusing to probe non-HTTP URL");
            return false;
        }

        let started = std::time::Instant::now();
        // The transport applies the timeout too; this bounds transports that don't.
        let result =
            tokio::time::timeout(self.timeout, self.transport.probe(url, self.method, self.timeout))
                .await;

        match result {
            Ok(Ok(())) => {
                debug!(
                    url,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stream is reachable"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "Stream probe failed");
                false
            }
            Err(_) => {
                warn!(url, timeout_ms = self.timeout.as_millis() as u64, "Stream probe timed out");
                false
            }
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}
