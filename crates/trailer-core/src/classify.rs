//! Maps what went wrong across all strategies to one error the caller can act on.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::StrategyFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("This video is unavailable")]
    VideoUnavailable,
    #[error("This video is age-restricted")]
    AgeRestricted,
    #[error("This video requires signing in")]
    LoginRequired,
    #[error("No stream in a playable format was offered")]
    NoCompatibleCodec,
    #[error("Every stream found was unreachable")]
    AllStreamsBroken,
    #[error("Could not reach the video platform")]
    NetworkError,
}

impl ExtractionError {
    /// Whether trying again later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllStreamsBroken | Self::NetworkError)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::AgeRestricted => 5,
            Self::LoginRequired => 4,
            Self::VideoUnavailable => 3,
            Self::NoCompatibleCodec => 2,
            Self::NetworkError => 1,
            Self::AllStreamsBroken => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VideoUnavailable => "video_unavailable",
            Self::AgeRestricted => "age_restricted",
            Self::LoginRequired => "login_required",
            Self::NoCompatibleCodec => "no_compatible_codec",
            Self::AllStreamsBroken => "all_streams_broken",
            Self::NetworkError => "network_error",
        }
    }
}

/// Why one strategy attempt did not produce a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum FailureSignal {
    /// Timeout, connection failure or non-2xx reply.
    Transport { status: Option<u16> },
    /// The platform answered but said the video cannot be played.
    PlatformStatus {
        status: String,
        reason: Option<String>,
    },
    /// Manifest was playable but held nothing the player can decode.
    NoCompatibleCodec,
    /// The response had no manifest in it.
    NoData,
    /// The response could not be decoded.
    Malformed,
    /// The chosen stream did not answer the reachability probe.
    ProbeFailed,
}

impl FailureSignal {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { status: Some(s) } => write!(f, "transport (HTTP {s})"),
            Self::Transport { status: None } => write!(f, "transport"),
            Self::PlatformStatus { status, .. } => write!(f, "platform status {status}"),
            Self::NoCompatibleCodec => write!(f, "no compatible codec"),
            Self::NoData => write!(f, "no data"),
            Self::Malformed => write!(f, "malformed response"),
            Self::ProbeFailed => write!(f, "probe failed"),
        }
    }
}

impl From<&StrategyFailure> for FailureSignal {
    fn from(failure: &StrategyFailure) -> Self {
        match failure {
            StrategyFailure::Transport(e) => Self::Transport {
                status: e.status_code(),
            },
            StrategyFailure::TimedOut(_) => Self::Transport { status: None },
            StrategyFailure::NoData => Self::NoData,
            StrategyFailure::Decode(_) | StrategyFailure::InvalidConfig(_) => Self::Malformed,
        }
    }
}

const AGE_HINTS: &[&str] = &[
    "confirm your age",
    "age-restricted",
    "age restricted",
    "inappropriate for some users",
];

/// Specific error for a platform playability status, if it names one.
pub fn classify_status(status: &str, reason: Option<&str>) -> Option<ExtractionError> {
    let mentions_age = reason
        .map(|r| r.to_ascii_lowercase())
        .is_some_and(|r| AGE_HINTS.iter().any(|hint| r.contains(hint)));

    match status.to_ascii_uppercase().as_str() {
        "AGE_CHECK_REQUIRED" | "AGE_VERIFICATION_REQUIRED" | "CONTENT_CHECK_REQUIRED" => {
            Some(ExtractionError::AgeRestricted)
        }
        "LOGIN_REQUIRED" if mentions_age => Some(ExtractionError::AgeRestricted),
        "LOGIN_REQUIRED" => Some(ExtractionError::LoginRequired),
        "ERROR" | "UNPLAYABLE" | "LIVE_STREAM_OFFLINE" => Some(ExtractionError::VideoUnavailable),
        _ => None,
    }
}

/// Classify the signals collected across an exhausted strategy chain.
///
/// The most specific error observed wins. `NetworkError` is reported only
/// when every attempt failed on transport; any other mix without a specific
/// signal is `AllStreamsBroken`.
pub fn classify(signals: &[FailureSignal]) -> ExtractionError {
    let strongest = signals
        .iter()
        .filter_map(|signal| match signal {
            FailureSignal::PlatformStatus { status, reason } => {
                classify_status(status, reason.as_deref())
            }
            FailureSignal::NoCompatibleCodec => Some(ExtractionError::NoCompatibleCodec),
            _ => None,
        })
        .max_by_key(ExtractionError::rank);

    if let Some(error) = strongest {
        return error;
    }

    if !signals.is_empty() && signals.iter().all(FailureSignal::is_transport) {
        ExtractionError::NetworkError
    } else {
        ExtractionError::AllStreamsBroken
    }
}
