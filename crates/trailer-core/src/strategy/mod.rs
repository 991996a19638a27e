pub mod innertube;
pub mod watch_page;

pub use innertube::InternalApiStrategy;
pub use watch_page::{HtmlScrapeStrategy, Technique};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ResolverConfig;
use crate::model::{StreamingManifest, VideoId};
use crate::transport::{HttpTransport, TransportError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("No stream data found in the response")]
    NoData,
    #[error("Undecodable player response: {0}")]
    Decode(String),
    #[error("Strategy did not finish within {0:?}")]
    TimedOut(std::time::Duration),
    #[error("Invalid strategy configuration: {0}")]
    InvalidConfig(String),
}

/// One self-contained technique for obtaining a manifest for a video.
///
/// Strategies only fetch and decode; deciding whether the manifest is
/// playable, picking a format and probing it is the resolver's job.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short stable name used in logs and in `ResolvedStream::source`.
    fn name(&self) -> &'static str;

    async fn attempt(&self, video_id: &VideoId) -> Result<StreamingManifest, StrategyFailure>;
}

/// Build the default strategy chain: the internal player API first (cheaper
/// and less often blocked), then the public watch page.
pub fn default_strategies(
    config: &ResolverConfig,
    transport: Arc<dyn HttpTransport>,
) -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(InternalApiStrategy::from_config(config, Arc::clone(&transport))),
        Box::new(HtmlScrapeStrategy::from_config(config, transport)),
    ]
}
