//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [output]
//! log_format = "json"
//!
//! [resolver]
//! content_timeout_ms = 12000
//! probe_timeout_ms = 8000
//! probe_method = "ranged_get"
//! probe_audio = true
//! language = "en"
//! region = "GB"
//!
//! [resolver.client]
//! name = "IOS"
//!
//! [resolver.codecs]
//! video = ["avc1"]
//! audio = ["mp4a"]
//! ```

use std::path::Path;

use serde::Deserialize;

use trailer_core::{ClientIdentity, CodecPolicy, ProbeMethod, ResolverConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub resolver: ResolverDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Overrides applied on top of `ResolverConfig::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolverDef {
    pub content_timeout_ms: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub player_endpoint: Option<String>,
    pub watch_page_base: Option<String>,
    pub browser_user_agent: Option<String>,
    pub consent_cookie: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    pub probe_method: Option<ProbeMethod>,
    pub probe_audio: Option<bool>,

    #[serde(default)]
    pub client: Option<ClientDef>,

    #[serde(default)]
    pub codecs: Option<CodecsDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientDef {
    /// `ANDROID_VR` or `IOS` select a built-in identity; anything else needs
    /// `version` and `user_agent`.
    pub name: String,
    pub version: Option<String>,
    pub user_agent: Option<String>,
    pub android_sdk_version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodecsDef {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl ClientDef {
    fn to_identity(&self) -> Result<ClientIdentity, String> {
        let mut identity = match self.name.to_ascii_uppercase().as_str() {
            "ANDROID_VR" => ClientIdentity::android_vr(),
            "IOS" => ClientIdentity::ios(),
            _ => {
                let (Some(version), Some(user_agent)) = (&self.version, &self.user_agent) else {
                    return Err(format!(
                        "Client '{}' is not built in: version and user_agent are required",
                        self.name
                    ));
                };
                ClientIdentity {
                    name: self.name.clone(),
                    version: version.clone(),
                    user_agent: user_agent.clone(),
                    android_sdk_version: None,
                    device_make: None,
                    device_model: None,
                }
            }
        };
        if let Some(version) = &self.version {
            identity.version = version.clone();
        }
        if let Some(user_agent) = &self.user_agent {
            identity.user_agent = user_agent.clone();
        }
        if self.android_sdk_version.is_some() {
            identity.android_sdk_version = self.android_sdk_version;
        }
        Ok(identity)
    }
}

impl ResolverDef {
    pub fn to_resolver_config(&self) -> Result<ResolverConfig, String> {
        let mut c = ResolverConfig::default();
        if let Some(ms) = self.content_timeout_ms {
            c = c.with_content_timeout(ms);
        }
        if let Some(ms) = self.probe_timeout_ms {
            c = c.with_probe_timeout(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            c = c.with_connect_timeout(ms);
        }
        if let Some(url) = &self.player_endpoint {
            c = c.with_player_endpoint(url);
        }
        if let Some(url) = &self.watch_page_base {
            c = c.with_watch_page_base(url);
        }
        if let Some(ua) = &self.browser_user_agent {
            c = c.with_browser_user_agent(ua);
        }
        if let Some(cookie) = &self.consent_cookie {
            c = c.with_consent_cookie(cookie);
        }
        if self.language.is_some() || self.region.is_some() {
            let language = self.language.clone().unwrap_or_else(|| c.language.clone());
            let region = self.region.clone().unwrap_or_else(|| c.region.clone());
            c = c.with_locale(language, region);
        }
        if let Some(method) = self.probe_method {
            c = c.with_probe_method(method);
        }
        if let Some(enabled) = self.probe_audio {
            c = c.with_probe_audio(enabled);
        }
        if let Some(client) = &self.client {
            c = c.with_client(client.to_identity()?);
        }
        if let Some(codecs) = &self.codecs {
            c = c.with_codecs(CodecPolicy::new(codecs.video.clone(), codecs.audio.clone()));
        }
        Ok(c)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        let r = &self.resolver;

        for (field, value) in [
            ("content_timeout_ms", r.content_timeout_ms),
            ("probe_timeout_ms", r.probe_timeout_ms),
            ("connect_timeout_ms", r.connect_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(format!("{field} must be greater than zero"));
            }
        }

        for (field, value) in [
            ("player_endpoint", &r.player_endpoint),
            ("watch_page_base", &r.watch_page_base),
        ] {
            if let Some(raw) = value {
                let parsed = url::Url::parse(raw)
                    .map_err(|e| format!("Invalid {field} URL: {raw} ({e})"))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(format!("{field} must use http or https: {raw}"));
                }
            }
        }

        if let Some(codecs) = &r.codecs {
            if codecs.video.is_empty() || codecs.audio.is_empty() {
                return Err("Codec lists must not be empty".into());
            }
        }

        if let Some(client) = &r.client {
            client.to_identity()?;
        }

        match self.output.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}
