use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use super::{Strategy, StrategyFailure};
use crate::config::ResolverConfig;
use crate::model::{StreamingManifest, VideoId};
use crate::scan;
use crate::schema::PlayerResponse;
use crate::transport::HttpTransport;

const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse";

lazy_static! {
    static ref HLS_MANIFEST_RE: Regex =
        Regex::new(r#"\\?"hlsManifestUrl\\?"\s*:\s*\\?"((?:[^"\\]|\\.)+?)\\?""#)
            .expect("valid regex");
}

/// How a manifest was pulled out of the watch page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technique {
    HlsPattern,
    EmbeddedJson,
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HlsPattern => write!(f, "hls_pattern"),
            Self::EmbeddedJson => write!(f, "embedded_json"),
        }
    }
}

/// Fetches the public watch page once and extracts a manifest from the HTML.
pub struct HtmlScrapeStrategy {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    user_agent: String,
    consent_cookie: String,
    language: String,
    timeout: Duration,
}

impl HtmlScrapeStrategy {
    pub const NAME: &'static str = "html_scrape";

    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        consent_cookie: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            user_agent: user_agent.into(),
            consent_cookie: consent_cookie.into(),
            language: "en".into(),
            timeout,
        }
    }

    pub fn from_config(config: &ResolverConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let mut strategy = Self::new(
            transport,
            config.watch_page_base.clone(),
            config.browser_user_agent.clone(),
            config.consent_cookie.clone(),
            config.content_timeout,
        );
        strategy.language = config.language.clone();
        strategy
    }

    pub fn watch_url(&self, video_id: &VideoId) -> Result<String, StrategyFailure> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            StrategyFailure::InvalidConfig(format!("watch page URL {}: {e}", self.base_url))
        })?;
        url.query_pairs_mut()
            .append_pair("v", video_id.as_str())
            .append_pair("hl", &self.language)
            .append_pair("bpctr", "9999999999")
            .append_pair("has_verified", "1");
        Ok(url.into())
    }
}

#[async_trait]
impl Strategy for HtmlScrapeStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(&self, video_id: &VideoId) -> Result<StreamingManifest, StrategyFailure> {
        let url = self.watch_url(video_id)?;
        debug!(video_id = %video_id, url = %url, "Fetching watch page");

        let headers = [
            ("User-Agent", self.user_agent.as_str()),
            ("Cookie", self.consent_cookie.as_str()),
            ("Accept-Language", "en-US,en;q=0.9"),
        ];
        let html = self.transport.get_text(&url, &headers, self.timeout).await?;

        match extract_manifest(&html) {
            Some((technique, manifest)) => {
                info!(
                    video_id = %video_id,
                    technique = %technique,
                    formats = manifest.formats.len(),
                    playable = manifest.playability.is_ok(),
                    "Manifest extracted from watch page"
                );
                Ok(manifest)
            }
            None => {
                warn!(video_id = %video_id, bytes = html.len(), "No manifest found in watch page");
                Err(StrategyFailure::NoData)
            }
        }
    }
}

/// Pull a manifest out of watch page HTML.
///
/// The HLS URL pattern is tried first and, when it matches, the embedded JSON
/// is never parsed. Otherwise every object assigned to the player response
/// marker is decoded until one yields a manifest.
pub fn extract_manifest(html: &str) -> Option<(Technique, StreamingManifest)> {
    if let Some(url) = find_hls_manifest_url(html) {
        return Some((Technique::HlsPattern, StreamingManifest::hls_only(url)));
    }

    scan::objects_after_marker(html, PLAYER_RESPONSE_MARKER)
        .find_map(|object| match PlayerResponse::from_json(object) {
            Ok(response) => Some(response.into_manifest()),
            Err(e) => {
                debug!(error = %e, "Embedded player response did not decode");
                None
            }
        })
        .map(|manifest| (Technique::EmbeddedJson, manifest))
}

/// Find and unescape the first `"hlsManifestUrl":"..."` in raw page text.
pub fn find_hls_manifest_url(text: &str) -> Option<String> {
    HLS_MANIFEST_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| unescape_json_string(m.as_str()))
        .find(|url| url.starts_with("https://") || url.starts_with("http://"))
}

/// Undo JSON string escaping (`\/`, `\u0026`, ...). When the player response
/// is embedded as a JS string literal the capture is escaped twice, so up to
/// two more passes run while backslashes remain.
fn unescape_json_string(raw: &str) -> Option<String> {
    let mut value: String = serde_json::from_str(&format!("\"{raw}\"")).ok()?;
    for _ in 0..2 {
        if !value.contains('\\') {
            break;
        }
        value = serde_json::from_str(&format!("\"{value}\"")).ok()?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormatKind, Playability};
    use crate::transport::ReqwestTransport;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HLS_PAGE: &str = r#"<html><script>var ytInitialPlayerResponse = {"streamingData":{"hlsManifestUrl":"https:\/\/manifest.example\/api\/manifest\/hls_variant\/id\/abc\/file\/index.m3u8?a=1&b=2"}};</script></html>"#;

    fn embedded_page(payload: &str) -> String {
        format!(
            "<html><head></head><body><script>var ytInitialPlayerResponse = {payload};</script>\
             <script>var other = {{\"x\": 1}};</script></body></html>"
        )
    }

    #[test]
    fn hls_pattern_is_unescaped() {
        let url = find_hls_manifest_url(HLS_PAGE).unwrap();
        assert_eq!(
            url,
            "https://manifest.example/api/manifest/hls_variant/id/abc/file/index.m3u8?a=1&b=2"
        );
    }

    // Player response serialized into a JS string literal: quotes are
    // backslash-escaped and the URL's own escapes are doubled.
    const STRING_EMBEDDED_PAGE: &str = r#"<html><script>var ytInitialPlayerResponse = "{\"streamingData\":{\"hlsManifestUrl\":\"https:\\/\\/manifest.example\\/api\\/index.m3u8?a=1\\u0026b=2\"}}";</script></html>"#;

    #[test]
    fn string_embedded_hls_url_is_unescaped() {
        assert_eq!(
            find_hls_manifest_url(STRING_EMBEDDED_PAGE).as_deref(),
            Some("https://manifest.example/api/index.m3u8?a=1&b=2")
        );
    }

    #[test]
    fn string_embedded_page_yields_hls_manifest() {
        let (technique, manifest) = extract_manifest(STRING_EMBEDDED_PAGE).unwrap();
        assert_eq!(technique, Technique::HlsPattern);
        assert_eq!(
            manifest,
            StreamingManifest::hls_only("https://manifest.example/api/index.m3u8?a=1&b=2")
        );
    }

    #[test]
    fn hls_match_skips_json_extraction() {
        // The embedded object is truncated, so decoding it would fail.
        let html = r#"<script>var ytInitialPlayerResponse = {"streamingData":{"hlsManifestUrl":"https://m.example/i.m3u8", "formats": [</script>"#;
        let (technique, manifest) = extract_manifest(html).unwrap();
        assert_eq!(technique, Technique::HlsPattern);
        assert_eq!(manifest, StreamingManifest::hls_only("https://m.example/i.m3u8"));
    }

    #[test]
    fn embedded_json_survives_script_terminator_in_strings() {
        let payload = r#"{"playabilityStatus":{"status":"OK"},"videoDetails":{"shortDescription":"see };</script> here"},"streamingData":{"formats":[{"itag":18,"url":"https://cdn.example/18","mimeType":"video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"","height":360}]}}"#;
        let (technique, manifest) = extract_manifest(&embedded_page(payload)).unwrap();
        assert_eq!(technique, Technique::EmbeddedJson);
        assert!(manifest.playability.is_ok());
        assert_eq!(manifest.formats.len(), 1);
        assert_eq!(manifest.formats[0].kind, FormatKind::Combined);
    }

    #[test]
    fn embedded_json_carries_not_ok_status() {
        let payload = r#"{"playabilityStatus":{"status":"LOGIN_REQUIRED","reason":"Sign in to confirm your age"}}"#;
        let (_, manifest) = extract_manifest(&embedded_page(payload)).unwrap();
        assert_eq!(
            manifest.playability,
            Playability::not_ok("LOGIN_REQUIRED", Some("Sign in to confirm your age".into()))
        );
    }

    #[test]
    fn page_without_manifest_yields_none() {
        assert!(extract_manifest("<html><body>consent.youtube.com</body></html>").is_none());
        assert!(extract_manifest("var ytInitialPlayerResponse = null;").is_none());
    }

    #[test]
    fn watch_url_carries_id_and_bypass_params() {
        let s = HtmlScrapeStrategy::new(
            Arc::new(ReqwestTransport::default()),
            "https://www.youtube.com/watch",
            "ua",
            "CONSENT=YES+cb",
            Duration::from_secs(1),
        );
        let url = s.watch_url(&VideoId::new_unchecked("abc_-1")).unwrap();
        assert!(url.starts_with("https://www.youtube.com/watch?v=abc_-1&hl=en"), "{url}");
        assert!(url.contains("has_verified=1"));
    }

    #[tokio::test]
    async fn unparsable_base_url_is_a_config_failure() {
        let s = HtmlScrapeStrategy::new(
            Arc::new(ReqwestTransport::default()),
            "not a url",
            "ua",
            "CONSENT=YES+cb",
            Duration::from_secs(1),
        );
        let err = s.attempt(&VideoId::new_unchecked("abc")).await.unwrap_err();
        assert!(matches!(err, StrategyFailure::InvalidConfig(_)), "{err:?}");
    }

    #[tokio::test]
    async fn fetches_page_with_consent_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", "trailer01"))
            .and(header("cookie", "CONSENT=YES+cb"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HLS_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let config = ResolverConfig::default()
            .with_watch_page_base(format!("{}/watch", server.uri()))
            .with_content_timeout(2000);
        let strategy = HtmlScrapeStrategy::from_config(&config, Arc::new(ReqwestTransport::default()));
        let manifest = strategy
            .attempt(&VideoId::new_unchecked("trailer01"))
            .await
            .unwrap();
        assert!(manifest.hls_manifest_url.is_some());
    }

    #[tokio::test]
    async fn empty_page_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let config = ResolverConfig::default().with_watch_page_base(format!("{}/watch", server.uri()));
        let strategy = HtmlScrapeStrategy::from_config(&config, Arc::new(ReqwestTransport::default()));
        let err = strategy
            .attempt(&VideoId::new_unchecked("nothing"))
            .await
            .unwrap_err();
        assert_eq!(err, StrategyFailure::NoData);
    }
}
