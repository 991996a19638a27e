#![forbid(unsafe_code)]

pub mod classify;
pub mod config;
pub mod model;
pub mod resolver;
pub mod scan;
pub mod schema;
pub mod selector;
pub mod strategy;
pub mod transport;
pub mod validator;

pub use classify::{classify, ExtractionError, FailureSignal};
pub use config::{ClientIdentity, ResolverConfig};
pub use model::{
    CandidateFormat, FormatKind, InvalidVideoId, Playability, ResolvedStream, StreamingManifest,
    VideoId,
};
pub use resolver::{
    AttemptOutcome, AttemptRecord, ResolutionReport, ResolutionState, ResolveError,
    TrailerResolver,
};
pub use selector::{select_format, CodecPolicy, SelectError, Selection};
pub use strategy::{
    default_strategies, HtmlScrapeStrategy, InternalApiStrategy, Strategy, StrategyFailure,
};
pub use transport::{HttpTransport, ProbeMethod, ReqwestTransport, TransportError};
pub use validator::StreamValidator;

/// Re-exported so callers can build tokens without naming `tokio-util` themselves.
pub use tokio_util::sync::CancellationToken;
