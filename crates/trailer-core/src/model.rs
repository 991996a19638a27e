use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid video identifier: {0:?}")]
pub struct InvalidVideoId(pub String);

/// Opaque identifier of a video on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Trim and check the identifier. Only the URL-safe base64 alphabet the
    /// platform uses for ids is accepted, so the id can be dropped into a
    /// query string or JSON body without further escaping.
    pub fn parse(raw: &str) -> Result<Self, InvalidVideoId> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidVideoId(raw.to_string()))
        }
    }

    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    VideoOnly,
    AudioOnly,
    Combined,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoOnly => write!(f, "video-only"),
            Self::AudioOnly => write!(f, "audio-only"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// One stream variant offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFormat {
    pub kind: FormatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itag: Option<u32>,
    /// Container and codecs, e.g. `video/mp4; codecs="avc1.640028"`.
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    /// Direct media URL. `None` when the platform only offers a ciphered URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_label: Option<String>,
}

impl CandidateFormat {
    pub fn new(kind: FormatKind, mime_type: impl Into<String>) -> Self {
        Self {
            kind,
            itag: None,
            mime_type: mime_type.into(),
            width: None,
            height: None,
            bitrate: None,
            url: None,
            quality_label: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// The codec list inside `codecs="..."`, lowercased and split on commas.
    pub fn codecs(&self) -> Vec<String> {
        let Some(start) = self.mime_type.find("codecs=") else {
            return Vec::new();
        };
        self.mime_type[start + "codecs=".len()..]
            .trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// A format is only selectable when the platform handed out a direct URL.
    pub fn is_selectable(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Playability {
    Ok,
    NotOk {
        /// Raw platform status, e.g. `LOGIN_REQUIRED`.
        platform_status: String,
        reason: Option<String>,
    },
}

impl Playability {
    pub fn not_ok(status: impl Into<String>, reason: Option<String>) -> Self {
        Self::NotOk {
            platform_status: status.into(),
            reason,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// What one strategy obtained from the platform for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingManifest {
    pub playability: Playability,
    pub formats: Vec<CandidateFormat>,
    pub hls_manifest_url: Option<String>,
}

impl StreamingManifest {
    pub fn new(playability: Playability, formats: Vec<CandidateFormat>) -> Self {
        Self {
            playability,
            formats,
            hls_manifest_url: None,
        }
    }

    /// A playable manifest that carries nothing but an HLS URL.
    pub fn hls_only(url: impl Into<String>) -> Self {
        Self {
            playability: Playability::Ok,
            formats: Vec::new(),
            hls_manifest_url: Some(url.into()),
        }
    }

    pub fn with_hls_manifest_url(mut self, url: impl Into<String>) -> Self {
        self.hls_manifest_url = Some(url.into());
        self
    }
}

/// Final result handed to the playback component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// e.g. `1080p`, `720p (no audio)`, `HLS`.
    pub quality_label: String,
    /// Name of the strategy that produced the stream.
    pub source: String,
}

impl ResolvedStream {
    pub fn is_hls(&self) -> bool {
        self.quality_label == crate::selector::HLS_LABEL
    }
}
