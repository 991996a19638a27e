use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::classify::{ExtractionError, FailureSignal};
use crate::model::VideoId;

/// Where one resolution call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolutionState {
    NotStarted,
    TryingStrategy { index: usize, strategy: &'static str },
    Validating { index: usize },
    Succeeded,
    Failed { error: ExtractionError },
    Cancelled,
}

impl ResolutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Cancelled
        )
    }

    pub fn can_transition_to(&self, target: &ResolutionState) -> bool {
        use ResolutionState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, target) {
            (_, Cancelled) => true,
            (NotStarted, TryingStrategy { index: 0, .. }) => true,
            (NotStarted, Failed { .. }) => true,
            (TryingStrategy { index: from, .. }, Validating { index: to }) => from == to,
            (TryingStrategy { index: from, .. }, TryingStrategy { index: to, .. })
            | (Validating { index: from }, TryingStrategy { index: to, .. }) => *to == from + 1,
            (TryingStrategy { .. }, Failed { .. }) | (Validating { .. }, Failed { .. }) => true,
            (TryingStrategy { .. }, Succeeded) | (Validating { .. }, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::TryingStrategy { index, strategy } => {
                write!(f, "trying strategy #{index} ({strategy})")
            }
            Self::Validating { index } => write!(f, "validating result of strategy #{index}"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { error } => write!(f, "failed: {}", error.as_str()),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Resolved {
        quality_label: String,
        /// The audio track was dropped after failing its probe.
        audio_dropped: bool,
    },
    Failed { signal: FailureSignal },
    Cancelled,
}

/// One strategy's turn in the chain.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub strategy: &'static str,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
}

/// Trace of a single resolution call: every attempt and every state visited.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub request_id: Uuid,
    pub video_id: VideoId,
    pub attempts: Vec<AttemptRecord>,
    pub states: Vec<ResolutionState>,
}

impl ResolutionReport {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            video_id,
            attempts: Vec::new(),
            states: vec![ResolutionState::NotStarted],
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.states
            .last()
            .copied()
            .unwrap_or(ResolutionState::NotStarted)
    }

    pub(crate) fn transition(&mut self, next: ResolutionState) {
        debug_assert!(
            self.state().can_transition_to(&next),
            "illegal transition {} -> {next}",
            self.state()
        );
        self.states.push(next);
    }

    pub(crate) fn record(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    /// Failure signals in attempt order, as fed to the classifier.
    pub fn signals(&self) -> Vec<FailureSignal> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Failed { signal } => Some(signal.clone()),
                _ => None,
            })
            .collect()
    }
}
