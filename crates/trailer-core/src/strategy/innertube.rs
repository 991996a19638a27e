use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::{Strategy, StrategyFailure};
use crate::config::{ClientIdentity, ResolverConfig};
use crate::model::{StreamingManifest, VideoId};
use crate::schema::PlayerResponse;
use crate::transport::HttpTransport;

/// Asks the platform's private player endpoint for the manifest while
/// posing as a mobile client that receives un-ciphered URLs.
pub struct InternalApiStrategy {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    client: ClientIdentity,
    language: String,
    region: String,
    timeout: Duration,
}

impl InternalApiStrategy {
    pub const NAME: &'static str = "internal_api";

    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: impl Into<String>,
        client: ClientIdentity,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            client,
            language: "en".into(),
            region: "US".into(),
            timeout,
        }
    }

    pub fn from_config(config: &ResolverConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let mut strategy = Self::new(
            transport,
            config.player_endpoint.clone(),
            config.client.clone(),
            config.content_timeout,
        );
        strategy.language = config.language.clone();
        strategy.region = config.region.clone();
        strategy
    }

    pub fn request_body(&self, video_id: &VideoId) -> Value {
        let mut client = json!({
            "clientName": self.client.name,
            "clientVersion": self.client.version,
            "hl": self.language,
            "gl": self.region,
        });
        if let Some(sdk) = self.client.android_sdk_version {
            client["androidSdkVersion"] = json!(sdk);
        }
        if let Some(make) = &self.client.device_make {
            client["deviceMake"] = json!(make);
        }
        if let Some(model) = &self.client.device_model {
            client["deviceModel"] = json!(model);
        }

        json!({
            "videoId": video_id.as_str(),
            "context": { "client": client },
            "contentCheckOk": true,
            "racyCheckOk": true,
        })
    }
}

#[async_trait]
impl Strategy for InternalApiStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(&self, video_id: &VideoId) -> Result<StreamingManifest, StrategyFailure> {
        Url::parse(&self.endpoint).map_err(|e| {
            StrategyFailure::InvalidConfig(format!("player endpoint {}: {e}", self.endpoint))
        })?;
        let body = self.request_body(video_id);
        debug!(
            video_id = %video_id,
            client = %self.client.name,
            client_version = %self.client.version,
            "Requesting player response"
        );

        let headers = [("User-Agent", self.client.user_agent.as_str())];
        let text = self
            .transport
            .post_json(&self.endpoint, &headers, &body, self.timeout)
            .await?;

        let response = PlayerResponse::from_json(&text).map_err(|e| {
            warn!(video_id = %video_id, error = %e, "Player response did not decode");
            StrategyFailure::Decode(e.to_string())
        })?;
        let manifest = response.into_manifest();

        info!(
            video_id = %video_id,
            formats = manifest.formats.len(),
            hls = manifest.hls_manifest_url.is_some(),
            playable = manifest.playability.is_ok(),
            "Player response decoded"
        );
        Ok(manifest)
    }
}
