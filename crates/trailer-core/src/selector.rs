use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{CandidateFormat, FormatKind, Playability, StreamingManifest};

pub const HLS_LABEL: &str = "HLS";

/// Codecs the playback component can decode, as lowercase prefixes of the
/// entries in a format's `codecs="..."` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPolicy {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl Default for CodecPolicy {
    fn default() -> Self {
        Self {
            video: vec!["avc1".into(), "avc3".into(), "h264".into()],
            audio: vec!["mp4a".into(), "aac".into()],
        }
    }
}

impl CodecPolicy {
    pub fn new(video: Vec<String>, audio: Vec<String>) -> Self {
        Self {
            video: video.into_iter().map(|c| c.to_ascii_lowercase()).collect(),
            audio: audio.into_iter().map(|c| c.to_ascii_lowercase()).collect(),
        }
    }

    pub fn allows_video(&self, format: &CandidateFormat) -> bool {
        Self::matches(&self.video, format)
    }

    pub fn allows_audio(&self, format: &CandidateFormat) -> bool {
        Self::matches(&self.audio, format)
    }

    /// An adaptive track carries exactly one codec; an empty or unknown codec
    /// list never matches.
    fn matches(allowed: &[String], format: &CandidateFormat) -> bool {
        let codecs = format.codecs();
        !codecs.is_empty()
            && codecs
                .iter()
                .all(|codec| allowed.iter().any(|prefix| codec.starts_with(prefix.as_str())))
    }
}

/// The stream chosen from one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Self-negotiating manifest; exempt from probing.
    Hls { url: String },
    Direct {
        video_url: String,
        audio_url: Option<String>,
        height: Option<u32>,
        /// Set for combined formats, where audio travels inside the video URL.
        embedded_audio: bool,
    },
}

impl Selection {
    pub fn label(&self) -> String {
        match self {
            Self::Hls { .. } => HLS_LABEL.to_string(),
            Self::Direct {
                audio_url,
                height,
                embedded_audio,
                ..
            } => {
                let base = match height {
                    Some(h) if *h > 0 => format!("{h}p"),
                    _ => "unknown".to_string(),
                };
                if audio_url.is_none() && !embedded_audio {
                    format!("{base} (no audio)")
                } else {
                    base
                }
            }
        }
    }

    pub fn video_url(&self) -> &str {
        match self {
            Self::Hls { url } => url,
            Self::Direct { video_url, .. } => video_url,
        }
    }

    pub fn audio_url(&self) -> Option<&str> {
        match self {
            Self::Hls { .. } => None,
            Self::Direct { audio_url, .. } => audio_url.as_deref(),
        }
    }

    /// Same selection with the separate audio track removed.
    pub fn without_audio(self) -> Self {
        match self {
            Self::Direct {
                video_url,
                height,
                embedded_audio,
                ..
            } => Self::Direct {
                video_url,
                audio_url: None,
                height,
                embedded_audio,
            },
            hls => hls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("Video is not playable ({status})")]
    NotPlayable { status: String, reason: Option<String> },
    #[error("No format with a compatible codec and a direct URL")]
    NoCompatibleCodec,
}

/// Pick the best playable stream from a manifest.
///
/// Order of preference: HLS manifest, best allowed adaptive video (height,
/// then bitrate) paired with the best allowed adaptive audio (bitrate),
/// adaptive video alone, best combined format (height, then bitrate).
/// Formats without a direct URL are never chosen.
pub fn select_format(
    manifest: &StreamingManifest,
    policy: &CodecPolicy,
) -> Result<Selection, SelectError> {
    if let Playability::NotOk {
        platform_status,
        reason,
    } = &manifest.playability
    {
        return Err(SelectError::NotPlayable {
            status: platform_status.clone(),
            reason: reason.clone(),
        });
    }

    if let Some(url) = manifest.hls_manifest_url.as_deref().filter(|u| !u.is_empty()) {
        debug!("Selected HLS manifest");
        return Ok(Selection::Hls {
            url: url.to_string(),
        });
    }

    let usable = |kind: FormatKind| {
        manifest
            .formats
            .iter()
            .filter(move |f| f.kind == kind && f.is_selectable())
    };

    let best_video = usable(FormatKind::VideoOnly)
        .filter(|f| policy.allows_video(f))
        .max_by_key(|f| (f.height.unwrap_or(0), f.bitrate.unwrap_or(0), Reverse(f.itag)));

    let best_audio = usable(FormatKind::AudioOnly)
        .filter(|f| policy.allows_audio(f))
        .max_by_key(|f| (f.bitrate.unwrap_or(0), Reverse(f.itag)));

    if let Some(video) = best_video {
        debug!(
            itag = ?video.itag,
            height = ?video.height,
            audio_itag = ?best_audio.and_then(|a| a.itag),
            "Selected adaptive video"
        );
        return Ok(Selection::Direct {
            video_url: url_of(video),
            audio_url: best_audio.map(url_of),
            height: video.height,
            embedded_audio: false,
        });
    }

    let best_combined = usable(FormatKind::Combined)
        .max_by_key(|f| (f.height.unwrap_or(0), f.bitrate.unwrap_or(0), Reverse(f.itag)));

    match best_combined {
        Some(combined) => {
            debug!(itag = ?combined.itag, height = ?combined.height, "Selected combined format");
            Ok(Selection::Direct {
                video_url: url_of(combined),
                audio_url: None,
                height: combined.height,
                embedded_audio: true,
            })
        }
        None => Err(SelectError::NoCompatibleCodec),
    }
}

fn url_of(format: &CandidateFormat) -> String {
    format.url.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(codec: &str, height: u32, bitrate: u64, url: &str) -> CandidateFormat {
        CandidateFormat::new(FormatKind::VideoOnly, format!("video/mp4; codecs=\"{codec}\""))
            .with_size(height * 16 / 9, height)
            .with_bitrate(bitrate)
            .with_url(url)
    }

    fn audio(mime: &str, codec: &str, bitrate: u64, url: &str) -> CandidateFormat {
        CandidateFormat::new(FormatKind::AudioOnly, format!("{mime}; codecs=\"{codec}\""))
            .with_bitrate(bitrate)
            .with_url(url)
    }

    fn combined(height: u32, url: &str) -> CandidateFormat {
        CandidateFormat::new(
            FormatKind::Combined,
            "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
        )
        .with_size(height * 16 / 9, height)
        .with_url(url)
    }

    fn manifest(formats: Vec<CandidateFormat>) -> StreamingManifest {
        StreamingManifest::new(Playability::Ok, formats)
    }

    #[test]
    fn picks_1080p_with_aac_over_720p() {
        let m = manifest(vec![
            video("avc1.4d401f", 720, 2_500_000, "v720"),
            video("avc1.640028", 1080, 4_400_000, "v1080"),
            audio("audio/mp4", "mp4a.40.2", 128_000, "a128"),
        ]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "v1080");
        assert_eq!(s.audio_url(), Some("a128"));
        assert_eq!(s.label(), "1080p");
    }

    #[test]
    fn vp9_excluded_regardless_of_resolution() {
        let m = manifest(vec![
            video("vp9", 1440, 9_000_000, "vp9-1440"),
            video("av01.0.08M.08", 2160, 12_000_000, "av1-2160"),
            video("avc1.4d401f", 720, 2_500_000, "h264-720"),
            audio("audio/mp4", "mp4a.40.2", 128_000, "a128"),
        ]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "h264-720");
        assert_eq!(s.label(), "720p");
    }

    #[test]
    fn opus_only_audio_yields_video_only() {
        let m = manifest(vec![
            video("avc1.640028", 1080, 4_400_000, "v1080"),
            audio("audio/webm", "opus", 160_000, "opus160"),
            audio("audio/webm", "opus", 70_000, "opus70"),
        ]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "v1080");
        assert_eq!(s.audio_url(), None);
        assert_eq!(s.label(), "1080p (no audio)");
    }

    #[test]
    fn higher_bitrate_breaks_height_tie() {
        let m = manifest(vec![
            video("avc1.640028", 1080, 3_000_000, "low"),
            video("avc1.640028", 1080, 5_000_000, "high"),
        ]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "high");
    }

    #[test]
    fn best_audio_is_highest_bitrate_aac() {
        let m = manifest(vec![
            video("avc1.640028", 720, 2_000_000, "v"),
            audio("audio/mp4", "mp4a.40.5", 48_000, "a48"),
            audio("audio/mp4", "mp4a.40.2", 128_000, "a128"),
            audio("audio/webm", "opus", 256_000, "opus"),
        ]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.audio_url(), Some("a128"));
    }

    #[test]
    fn falls_back_to_combined_format() {
        let m = manifest(vec![
            video("vp9", 1080, 4_000_000, "vp9"),
            combined(360, "c360"),
        ]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "c360");
        assert_eq!(s.audio_url(), None);
        assert_eq!(s.label(), "360p");
    }

    #[test]
    fn combined_picks_tallest() {
        let m = manifest(vec![combined(360, "c360"), combined(720, "c720")]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "c720");
    }

    #[test]
    fn formats_without_url_are_never_selected() {
        let ciphered = CandidateFormat::new(FormatKind::VideoOnly, "video/mp4; codecs=\"avc1.640028\"")
            .with_size(1920, 1080);
        let m = manifest(vec![ciphered, combined(360, "c360")]);
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(s.video_url(), "c360");
    }

    #[test]
    fn hls_preferred_unconditionally() {
        let m = manifest(vec![video("avc1.640028", 1080, 4_400_000, "v1080")])
            .with_hls_manifest_url("https://manifest.example/index.m3u8");
        let s = select_format(&m, &CodecPolicy::default()).unwrap();
        assert_eq!(
            s,
            Selection::Hls {
                url: "https://manifest.example/index.m3u8".into()
            }
        );
        assert_eq!(s.label(), "HLS");
    }

    #[test]
    fn not_ok_status_short_circuits() {
        let m = StreamingManifest::new(
            Playability::not_ok("LOGIN_REQUIRED", None),
            vec![video("avc1.640028", 1080, 4_400_000, "v1080")],
        )
        .with_hls_manifest_url("https://manifest.example/index.m3u8");
        let err = select_format(&m, &CodecPolicy::default()).unwrap_err();
        assert!(matches!(err, SelectError::NotPlayable { ref status, .. } if status == "LOGIN_REQUIRED"));
    }

    #[test]
    fn nothing_usable_is_no_compatible_codec() {
        let m = manifest(vec![
            video("vp9", 1080, 4_000_000, "vp9"),
            audio("audio/webm", "opus", 160_000, "opus"),
        ]);
        assert_eq!(
            select_format(&m, &CodecPolicy::default()),
            Err(SelectError::NoCompatibleCodec)
        );
        assert_eq!(
            select_format(&manifest(vec![]), &CodecPolicy::default()),
            Err(SelectError::NoCompatibleCodec)
        );
    }

    #[test]
    fn custom_policy_can_admit_vp9() {
        let policy = CodecPolicy::new(vec!["VP9".into()], vec!["opus".into()]);
        let m = manifest(vec![
            video("vp9", 1440, 9_000_000, "vp9-1440"),
            audio("audio/webm", "opus", 160_000, "opus"),
        ]);
        let s = select_format(&m, &policy).unwrap();
        assert_eq!(s.video_url(), "vp9-1440");
        assert_eq!(s.audio_url(), Some("opus"));
    }

    #[test]
    fn without_audio_relabels() {
        let s = Selection::Direct {
            video_url: "v".into(),
            audio_url: Some("a".into()),
            height: Some(1080),
            embedded_audio: false,
        };
        assert_eq!(s.clone().without_audio().label(), "1080p (no audio)");
        assert_eq!(s.label(), "1080p");
    }
}
