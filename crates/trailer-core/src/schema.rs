//! Typed view of the platform's player response.
//!
//! The upstream schema is undocumented and drifts, so decoding is lenient at
//! every level: a field with an unexpected type decodes to its default, and a
//! malformed entry in a format list is skipped instead of failing the list.
//! Only a body that is not a JSON object at all is rejected.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{CandidateFormat, FormatKind, Playability, StreamingManifest};

const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub playability_status: Option<PlayabilityStatus>,
    #[serde(default, deserialize_with = "lenient")]
    pub streaming_data: Option<StreamingData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayabilityStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub error_screen: Option<Value>,
}

impl PlayabilityStatus {
    /// `reason`, falling back to the text of the error screen renderer.
    pub fn reason_text(&self) -> Option<String> {
        if let Some(reason) = self.reason.as_deref().filter(|r| !r.is_empty()) {
            return Some(reason.to_string());
        }
        let renderer = self.error_screen.as_ref()?.get("playerErrorMessageRenderer")?;
        let reason = renderer.get("reason")?;
        if let Some(text) = reason.get("simpleText").and_then(Value::as_str) {
            return Some(text.to_string());
        }
        let runs = reason.get("runs")?.as_array()?;
        let joined: String = runs
            .iter()
            .filter_map(|r| r.get("text").and_then(Value::as_str))
            .collect();
        (!joined.is_empty()).then_some(joined)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    #[serde(default, deserialize_with = "lenient_list")]
    pub adaptive_formats: Vec<RawFormat>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub formats: Vec<RawFormat>,
    #[serde(default, deserialize_with = "lenient")]
    pub hls_manifest_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFormat {
    #[serde(default, deserialize_with = "lenient")]
    pub itag: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub bitrate: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub quality_label: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub audio_sample_rate: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub audio_channels: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub signature_cipher: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub cipher: Option<String>,
}

impl RawFormat {
    /// Kind of an entry from `adaptiveFormats`: the MIME major type decides,
    /// with video dimensions or audio fields as a fallback.
    fn adaptive_kind(&self) -> Option<FormatKind> {
        let major = self
            .mime_type
            .as_deref()
            .and_then(|m| m.split('/').next())
            .map(|m| m.trim().to_ascii_lowercase());
        match major.as_deref() {
            Some("video") => Some(FormatKind::VideoOnly),
            Some("audio") => Some(FormatKind::AudioOnly),
            _ if self.width.is_some() || self.height.is_some() => Some(FormatKind::VideoOnly),
            _ if self.audio_sample_rate.is_some() || self.audio_channels.is_some() => {
                Some(FormatKind::AudioOnly)
            }
            _ => None,
        }
    }

    fn into_candidate(self, kind: FormatKind) -> CandidateFormat {
        // Ciphered entries keep `url` empty; the candidate is kept (it is
        // still an offered variant) but can never be selected.
        let url = if self.signature_cipher.is_some() || self.cipher.is_some() {
            None
        } else {
            self.url.filter(|u| !u.is_empty())
        };
        CandidateFormat {
            kind,
            itag: self.itag,
            mime_type: self.mime_type.unwrap_or_default(),
            width: self.width,
            height: self.height,
            bitrate: self.bitrate,
            url,
            quality_label: self.quality_label,
        }
    }
}

impl PlayerResponse {
    /// Decode a player response body. Fails only when the text is not a
    /// JSON object.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if !value.is_object() {
            return Err(serde::de::Error::custom("player response is not a JSON object"));
        }
        serde_json::from_value(value)
    }

    /// Map into the strategy-independent manifest shape.
    ///
    /// A missing `playabilityStatus` is treated as playable only when
    /// streaming data is present.
    pub fn into_manifest(self) -> StreamingManifest {
        let playability = match &self.playability_status {
            Some(ps) => match ps.status.as_deref() {
                Some(STATUS_OK) => Playability::Ok,
                Some(status) => Playability::not_ok(status, ps.reason_text()),
                None if self.streaming_data.is_some() => Playability::Ok,
                None => Playability::not_ok("UNKNOWN", ps.reason_text()),
            },
            None if self.streaming_data.is_some() => Playability::Ok,
            None => Playability::not_ok("UNKNOWN", None),
        };

        let data = self.streaming_data.unwrap_or_default();
        let mut formats = Vec::with_capacity(data.adaptive_formats.len() + data.formats.len());
        for raw in data.adaptive_formats {
            if let Some(kind) = raw.adaptive_kind() {
                formats.push(raw.into_candidate(kind));
            }
        }
        formats.extend(
            data.formats
                .into_iter()
                .map(|raw| raw.into_candidate(FormatKind::Combined)),
        );

        StreamingManifest {
            playability,
            formats,
            hls_manifest_url: data.hls_manifest_url.filter(|u| !u.is_empty()),
        }
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Numbers sometimes arrive as strings (`"bitrate": "128000"`).
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player_json() -> Value {
        json!({
            "playabilityStatus": { "status": "OK" },
            "streamingData": {
                "adaptiveFormats": [
                    {
                        "itag": 137,
                        "url": "https://cdn.example/137",
                        "mimeType": "video/mp4; codecs=\"avc1.640028\"",
                        "width": 1920, "height": 1080, "bitrate": 4400000
                    },
                    {
                        "itag": 140,
                        "url": "https://cdn.example/140",
                        "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"",
                        "bitrate": "130000",
                        "audioSampleRate": "44100"
                    },
                    {
                        "itag": 251,
                        "signatureCipher": "s=abc&url=https%3A%2F%2Fcdn.example%2F251",
                        "mimeType": "audio/webm; codecs=\"opus\""
                    }
                ],
                "formats": [
                    {
                        "itag": 18,
                        "url": "https://cdn.example/18",
                        "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
                        "width": 640, "height": 360
                    }
                ]
            }
        })
    }

    #[test]
    fn decodes_formats_and_kinds() {
        let manifest = PlayerResponse::from_value(player_json()).unwrap().into_manifest();
        assert!(manifest.playability.is_ok());
        assert_eq!(manifest.formats.len(), 4);
        assert_eq!(manifest.formats[0].kind, FormatKind::VideoOnly);
        assert_eq!(manifest.formats[0].height, Some(1080));
        assert_eq!(manifest.formats[1].kind, FormatKind::AudioOnly);
        assert_eq!(manifest.formats[1].bitrate, Some(130000));
        assert_eq!(manifest.formats[3].kind, FormatKind::Combined);
        assert!(manifest.hls_manifest_url.is_none());
    }

    #[test]
    fn ciphered_format_has_no_url() {
        let manifest = PlayerResponse::from_value(player_json()).unwrap().into_manifest();
        let opus = manifest.formats.iter().find(|f| f.itag == Some(251)).unwrap();
        assert!(opus.url.is_none());
        assert!(!opus.is_selectable());
    }

    #[test]
    fn malformed_entries_and_fields_do_not_abort_the_parse() {
        let body = json!({
            "playabilityStatus": { "status": "OK", "reason": 42 },
            "streamingData": {
                "adaptiveFormats": [
                    "not an object",
                    { "itag": "weird", "url": "https://cdn.example/a", "mimeType": "video/mp4; codecs=\"avc1\"", "height": "tall" }
                ],
                "formats": { "unexpected": true },
                "hlsManifestUrl": 7,
                "someNewField": [1, 2, 3]
            },
            "videoDetails": { "title": "Trailer" }
        });
        let manifest = PlayerResponse::from_value(body).unwrap().into_manifest();
        assert!(manifest.playability.is_ok());
        assert_eq!(manifest.formats.len(), 1);
        assert_eq!(manifest.formats[0].itag, None);
        assert_eq!(manifest.formats[0].height, None);
        assert!(manifest.hls_manifest_url.is_none());
    }

    #[test]
    fn not_ok_status_keeps_reason() {
        let body = json!({
            "playabilityStatus": {
                "status": "LOGIN_REQUIRED",
                "reason": "Sign in to confirm your age"
            },
            "streamingData": { "formats": [] }
        });
        let manifest = PlayerResponse::from_value(body).unwrap().into_manifest();
        assert_eq!(
            manifest.playability,
            Playability::not_ok("LOGIN_REQUIRED", Some("Sign in to confirm your age".into()))
        );
    }

    #[test]
    fn reason_falls_back_to_error_screen() {
        let body = json!({
            "playabilityStatus": {
                "status": "ERROR",
                "errorScreen": {
                    "playerErrorMessageRenderer": {
                        "reason": { "runs": [{ "text": "Video " }, { "text": "unavailable" }] }
                    }
                }
            }
        });
        let manifest = PlayerResponse::from_value(body).unwrap().into_manifest();
        assert_eq!(
            manifest.playability,
            Playability::not_ok("ERROR", Some("Video unavailable".into()))
        );
    }

    #[test]
    fn hls_url_is_carried() {
        let body = json!({
            "playabilityStatus": { "status": "OK" },
            "streamingData": { "hlsManifestUrl": "https://manifest.example/hls/index.m3u8" }
        });
        let manifest = PlayerResponse::from_value(body).unwrap().into_manifest();
        assert_eq!(
            manifest.hls_manifest_url.as_deref(),
            Some("https://manifest.example/hls/index.m3u8")
        );
    }

    #[test]
    fn missing_status_without_data_is_not_playable() {
        let manifest = PlayerResponse::from_json("{}").unwrap().into_manifest();
        assert!(!manifest.playability.is_ok());
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(PlayerResponse::from_json("[1,2]").is_err());
        assert!(PlayerResponse::from_json("<html>").is_err());
    }
}
