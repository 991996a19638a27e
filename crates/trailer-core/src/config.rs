use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::selector::CodecPolicy;
use crate::transport::ProbeMethod;

pub const DEFAULT_PLAYER_ENDPOINT: &str =
    "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";
pub const DEFAULT_WATCH_PAGE_BASE: &str = "https://www.youtube.com/watch";
pub const DEFAULT_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
pub const DEFAULT_CONSENT_COOKIE: &str = "CONSENT=YES+cb";

/// The mobile client the internal player endpoint is told it is talking to.
///
/// Only clients that receive un-ciphered `url` fields are useful here; web
/// clients get `signatureCipher` entries the selector has to discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_sdk_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
}

impl ClientIdentity {
    pub fn android_vr() -> Self {
        Self {
            name: "ANDROID_VR".into(),
            version: "1.71.26".into(),
            user_agent: "com.google.android.apps.youtube.vr.oculus/1.71.26 \
                (Linux; U; Android 12L; eureka-user Build/SQ3A.220605.009.A1) gzip"
                .into(),
            android_sdk_version: Some(32),
            device_make: Some("Oculus".into()),
            device_model: Some("Quest 3".into()),
        }
    }

    pub fn ios() -> Self {
        Self {
            name: "IOS".into(),
            version: "21.02.3".into(),
            user_agent:
                "com.google.ios.youtube/21.02.3 (iPhone16,2; U; CPU iOS 18_1_0 like Mac OS X;)"
                    .into(),
            android_sdk_version: None,
            device_make: Some("Apple".into()),
            device_model: Some("iPhone16,2".into()),
        }
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::android_vr()
    }
}

/// Configuration for a trailer resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Timeout for the player endpoint call and the watch page fetch (default: 15s).
    pub content_timeout: Duration,
    /// Timeout for each reachability probe (default: 10s).
    pub probe_timeout: Duration,
    /// TCP/TLS connect timeout for the shared HTTP client.
    pub connect_timeout: Duration,
    pub player_endpoint: String,
    pub watch_page_base: String,
    pub client: ClientIdentity,
    /// User agent sent with the watch page request.
    pub browser_user_agent: String,
    /// Cookie that skips the consent interstitial on the watch page.
    pub consent_cookie: String,
    /// Interface language (`hl`).
    pub language: String,
    /// Content region (`gl`).
    pub region: String,
    pub codecs: CodecPolicy,
    pub probe_method: ProbeMethod,
    /// Whether a separate audio track is probed before it is returned.
    pub probe_audio: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            content_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            player_endpoint: DEFAULT_PLAYER_ENDPOINT.into(),
            watch_page_base: DEFAULT_WATCH_PAGE_BASE.into(),
            client: ClientIdentity::default(),
            browser_user_agent: DEFAULT_BROWSER_USER_AGENT.into(),
            consent_cookie: DEFAULT_CONSENT_COOKIE.into(),
            language: "en".into(),
            region: "US".into(),
            codecs: CodecPolicy::default(),
            probe_method: ProbeMethod::Head,
            probe_audio: true,
        }
    }
}

impl ResolverConfig {
    pub fn with_content_timeout(mut self, ms: u64) -> Self {
        self.content_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_probe_timeout(mut self, ms: u64) -> Self {
        self.probe_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_player_endpoint(mut self, url: impl Into<String>) -> Self {
        self.player_endpoint = url.into();
        self
    }

    pub fn with_watch_page_base(mut self, url: impl Into<String>) -> Self {
        self.watch_page_base = url.into();
        self
    }

    pub fn with_client(mut self, client: ClientIdentity) -> Self {
        self.client = client;
        self
    }

    pub fn with_browser_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.browser_user_agent = user_agent.into();
        self
    }

    pub fn with_consent_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.consent_cookie = cookie.into();
        self
    }

    pub fn with_locale(mut self, language: impl Into<String>, region: impl Into<String>) -> Self {
        self.language = language.into();
        self.region = region.into();
        self
    }

    pub fn with_codecs(mut self, codecs: CodecPolicy) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_probe_method(mut self, method: ProbeMethod) -> Self {
        self.probe_method = method;
        self
    }

    pub fn with_probe_audio(mut self, enabled: bool) -> Self {
        self.probe_audio = enabled;
        self
    }

    /// Upper bound on one resolution over `strategies` strategies: one content
    /// fetch plus a video and an audio probe per strategy.
    pub fn worst_case_latency(&self, strategies: usize) -> Duration {
        (self.content_timeout + self.probe_timeout * 2) * strategies as u32
    }
}
