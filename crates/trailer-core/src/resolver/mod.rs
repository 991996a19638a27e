pub mod state;

pub use state::{AttemptOutcome, AttemptRecord, ResolutionReport, ResolutionState};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::classify::{classify, ExtractionError, FailureSignal};
use crate::config::ResolverConfig;
use crate::model::{ResolvedStream, VideoId};
use crate::selector::{select_format, SelectError, Selection};
use crate::strategy::{default_strategies, Strategy, StrategyFailure};
use crate::transport::HttpTransport;
use crate::validator::StreamValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("Resolution was cancelled")]
    Cancelled,
}

impl ResolveError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn extraction(&self) -> Option<ExtractionError> {
        match self {
            Self::Extraction(e) => Some(*e),
            Self::Cancelled => None,
        }
    }
}

/// How one strategy's turn ended.
enum Step {
    Resolved {
        stream: ResolvedStream,
        audio_dropped: bool,
    },
    Failed(FailureSignal),
    Cancelled,
}

/// Turns a video identifier into a validated, playable stream.
///
/// Strategies run one after another in priority order. The first one whose
/// manifest is playable, yields a compatible format and passes the
/// reachability probe wins. When all of them fail, the signals they left
/// behind are classified into a single [`ExtractionError`].
///
/// The resolver holds no per-call state, so one instance can serve any number
/// of concurrent calls.
pub struct TrailerResolver {
    config: ResolverConfig,
    strategies: Vec<Box<dyn Strategy>>,
    validator: StreamValidator,
}

impl TrailerResolver {
    pub fn new(config: ResolverConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let strategies = default_strategies(&config, Arc::clone(&transport));
        let validator = StreamValidator::from_config(&config, transport);
        Self {
            config,
            strategies,
            validator,
        }
    }

    /// Replace the strategy chain. Order is priority order.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn Strategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Longest a call can take before it returns on its own.
    pub fn worst_case_latency(&self) -> Duration {
        self.config.worst_case_latency(self.strategies.len())
    }

    pub async fn resolve(
        &self,
        video_id: &VideoId,
        cancel: &CancellationToken,
    ) -> Result<ResolvedStream, ResolveError> {
        self.resolve_with_report(video_id, cancel).await.0
    }

    pub async fn resolve_with_report(
        &self,
        video_id: &VideoId,
        cancel: &CancellationToken,
    ) -> (Result<ResolvedStream, ResolveError>, ResolutionReport) {
        let mut report = ResolutionReport::new(video_id.clone());
        let span = info_span!(
            "resolve",
            request_id = %report.request_id,
            video_id = %video_id
        );
        let result = self
            .run_chain(video_id, cancel, &mut report)
            .instrument(span)
            .await;
        (result, report)
    }

    async fn run_chain(
        &self,
        video_id: &VideoId,
        cancel: &CancellationToken,
        report: &mut ResolutionReport,
    ) -> Result<ResolvedStream, ResolveError> {
        let started = Instant::now();

        for (index, strategy) in self.strategies.iter().enumerate() {
            if cancel.is_cancelled() {
                report.transition(ResolutionState::Cancelled);
                info!("Resolution cancelled");
                return Err(ResolveError::Cancelled);
            }

            report.transition(ResolutionState::TryingStrategy {
                index,
                strategy: strategy.name(),
            });
            let started_at = Utc::now();
            let clock = Instant::now();

            let step = self
                .attempt(index, strategy.as_ref(), video_id, cancel, report)
                .await;

            let outcome = match &step {
                Step::Resolved {
                    stream,
                    audio_dropped,
                } => AttemptOutcome::Resolved {
                    quality_label: stream.quality_label.clone(),
                    audio_dropped: *audio_dropped,
                },
                Step::Failed(signal) => AttemptOutcome::Failed {
                    signal: signal.clone(),
                },
                Step::Cancelled => AttemptOutcome::Cancelled,
            };
            report.record(AttemptRecord {
                strategy: strategy.name(),
                started_at,
                elapsed_ms: clock.elapsed().as_millis() as u64,
                outcome,
            });

            match step {
                Step::Resolved { stream, .. } => {
                    report.transition(ResolutionState::Succeeded);
                    info!(
                        strategy = strategy.name(),
                        quality = %stream.quality_label,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Stream resolved"
                    );
                    return Ok(stream);
                }
                Step::Cancelled => {
                    report.transition(ResolutionState::Cancelled);
                    info!(strategy = strategy.name(), "Resolution cancelled");
                    return Err(ResolveError::Cancelled);
                }
                Step::Failed(signal) => {
                    warn!(strategy = strategy.name(), signal = %signal, "Strategy failed, falling back");
                }
            }
        }

        let error = classify(&report.signals());
        report.transition(ResolutionState::Failed { error });
        warn!(
            error = error.as_str(),
            attempts = report.attempts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "All strategies exhausted"
        );
        Err(ResolveError::Extraction(error))
    }

    async fn attempt(
        &self,
        index: usize,
        strategy: &dyn Strategy,
        video_id: &VideoId,
        cancel: &CancellationToken,
        report: &mut ResolutionReport,
    ) -> Step {
        let timeout = self.config.content_timeout;
        let fetch = tokio::time::timeout(timeout, strategy.attempt(video_id));
        let manifest = match until_cancelled(cancel, fetch).await {
            None => return Step::Cancelled,
            Some(Err(_)) => {
                return Step::Failed(FailureSignal::from(&StrategyFailure::TimedOut(timeout)))
            }
            Some(Ok(Err(failure))) => {
                debug!(strategy = strategy.name(), error = %failure, "No manifest");
                return Step::Failed(FailureSignal::from(&failure));
            }
            Some(Ok(Ok(manifest))) => manifest,
        };

        let selection = match select_format(&manifest, &self.config.codecs) {
            Ok(selection) => selection,
            Err(SelectError::NotPlayable { status, reason }) => {
                debug!(strategy = strategy.name(), status = %status, reason = ?reason, "Manifest not playable");
                return Step::Failed(FailureSignal::PlatformStatus { status, reason });
            }
            Err(SelectError::NoCompatibleCodec) => {
                return Step::Failed(FailureSignal::NoCompatibleCodec);
            }
        };

        // HLS URLs are returned without a reachability check.
        let (selection, audio_dropped) = match selection {
            hls @ Selection::Hls { .. } => (hls, false),
            direct => {
                report.transition(ResolutionState::Validating { index });
                match self.validate(direct, cancel).await {
                    Some(Ok(validated)) => validated,
                    Some(Err(signal)) => return Step::Failed(signal),
                    None => return Step::Cancelled,
                }
            }
        };

        Step::Resolved {
            stream: ResolvedStream {
                video_url: selection.video_url().to_string(),
                audio_url: selection.audio_url().map(str::to_owned),
                quality_label: selection.label(),
                source: strategy.name().to_string(),
            },
            audio_dropped,
        }
    }

    /// Probe a direct selection. `None` means the call was cancelled.
    async fn validate(
        &self,
        selection: Selection,
        cancel: &CancellationToken,
    ) -> Option<Result<(Selection, bool), FailureSignal>> {
        if !until_cancelled(cancel, self.validator.probe(selection.video_url())).await? {
            return Some(Err(FailureSignal::ProbeFailed));
        }

        let audio_url = match selection.audio_url() {
            Some(url) if self.config.probe_audio => url.to_owned(),
            _ => return Some(Ok((selection, false))),
        };
        if until_cancelled(cancel, self.validator.probe(&audio_url)).await? {
            Some(Ok((selection, false)))
        } else {
            warn!(url = %audio_url, "Audio track unreachable, returning video only");
            Some(Ok((selection.without_audio(), true)))
        }
    }
}

/// Run `fut` unless `cancel` fires first. Cancellation wins ties.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReqwestTransport;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn resolver_is_shareable() {
        assert_send_sync::<TrailerResolver>();
    }

    #[test]
    fn default_chain_is_internal_api_then_watch_page() {
        let resolver = TrailerResolver::new(
            ResolverConfig::default(),
            Arc::new(ReqwestTransport::default()),
        );
        assert_eq!(resolver.strategy_names(), vec!["internal_api", "html_scrape"]);
        assert_eq!(resolver.worst_case_latency(), Duration::from_secs(70));
    }

    #[test]
    fn resolve_error_helpers() {
        let err = ResolveError::from(ExtractionError::AgeRestricted);
        assert_eq!(err.extraction(), Some(ExtractionError::AgeRestricted));
        assert!(!err.is_cancelled());
        assert!(ResolveError::Cancelled.is_cancelled());
        assert_eq!(err.to_string(), "This video is age-restricted");
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let resolver = TrailerResolver::new(
            ResolverConfig::default(),
            Arc::new(ReqwestTransport::default()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (result, report) = resolver
            .resolve_with_report(&VideoId::new_unchecked("abc"), &cancel)
            .await;
        assert_eq!(result, Err(ResolveError::Cancelled));
        assert!(report.attempts.is_empty());
        assert_eq!(report.state(), ResolutionState::Cancelled);
    }

    #[tokio::test]
    async fn empty_chain_fails_as_all_streams_broken() {
        let resolver = TrailerResolver::new(
            ResolverConfig::default(),
            Arc::new(ReqwestTransport::default()),
        )
        .with_strategies(Vec::new());
        let result = resolver
            .resolve(&VideoId::new_unchecked("abc"), &CancellationToken::new())
            .await;
        assert_eq!(
            result,
            Err(ResolveError::Extraction(ExtractionError::AllStreamsBroken))
        );
    }
}
