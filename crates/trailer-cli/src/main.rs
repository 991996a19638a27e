mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use trailer_core::{
    ProbeMethod, ReqwestTransport, ResolutionReport, ResolveError, ResolvedStream,
    ResolverConfig, StreamValidator, TrailerResolver, VideoId,
};

use config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        // Called once by clap; the string lives for the whole process.
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Resolve trailer video identifiers into validated, playable stream URLs.
#[derive(Parser)]
#[command(name = "trailer-resolve", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one or more video identifiers concurrently.
    Resolve {
        /// Video identifiers to resolve.
        #[arg(required = true)]
        ids: Vec<String>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print one JSON object per identifier instead of styled text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Timeout for each player endpoint / watch page fetch. Overrides config file.
        #[arg(long)]
        content_timeout_ms: Option<u64>,

        /// Timeout for each reachability probe. Overrides config file.
        #[arg(long)]
        probe_timeout_ms: Option<u64>,

        /// Return the audio track without probing it.
        #[arg(long, default_value_t = false)]
        no_probe_audio: bool,
    },
    /// Check whether a single stream URL is reachable.
    Probe {
        /// Stream URL to probe.
        url: String,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Probe timeout in milliseconds. Overrides config file.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Request used for the probe. Overrides config file.
        #[arg(long, value_enum)]
        method: Option<ProbeArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProbeArg {
    Head,
    RangedGet,
}

impl From<ProbeArg> for ProbeMethod {
    fn from(arg: ProbeArg) -> Self {
        match arg {
            ProbeArg::Head => ProbeMethod::Head,
            ProbeArg::RangedGet => ProbeMethod::RangedGet,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            ids,
            config,
            json,
            content_timeout_ms,
            probe_timeout_ms,
            no_probe_audio,
        } => {
            let Some(mut resolver_config) = load_config(config.as_deref()) else {
                return ExitCode::FAILURE;
            };
            if let Some(ms) = content_timeout_ms {
                resolver_config = resolver_config.with_content_timeout(ms);
            }
            if let Some(ms) = probe_timeout_ms {
                resolver_config = resolver_config.with_probe_timeout(ms);
            }
            if no_probe_audio {
                resolver_config = resolver_config.with_probe_audio(false);
            }
            run_resolve(ids, resolver_config, json).await
        }
        Commands::Probe {
            url,
            config,
            timeout_ms,
            method,
        } => {
            let Some(mut resolver_config) = load_config(config.as_deref()) else {
                return ExitCode::FAILURE;
            };
            if let Some(ms) = timeout_ms {
                resolver_config = resolver_config.with_probe_timeout(ms);
            }
            if let Some(method) = method {
                resolver_config = resolver_config.with_probe_method(method.into());
            }
            run_probe(url, resolver_config).await
        }
    }
}

/// Load the optional config file and install the tracing subscriber it asks for.
fn load_config(path: Option<&std::path::Path>) -> Option<ResolverConfig> {
    let Some(path) = path else {
        init_tracing("pretty");
        return Some(ResolverConfig::default());
    };

    let app_config = match AppConfig::load(path) {
        Ok(c) => c,
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            return None;
        }
    };

    init_tracing(&app_config.output.log_format);
    tracing::info!(path = %path.display(), "Loaded config file");

    match app_config.resolver.to_resolver_config() {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::error!("{}", e);
            None
        }
    }
}

async fn run_resolve(ids: Vec<String>, config: ResolverConfig, json_output: bool) -> ExitCode {
    let transport = Arc::new(ReqwestTransport::from_config(&config));
    let resolver = Arc::new(TrailerResolver::new(config, transport));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, cancelling resolutions");
        trigger.cancel();
    });

    let multi = MultiProgress::new();
    if json_output {
        multi.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    } else {
        multi
            .println(format!(
                "{} {}  {}",
                style("trailer-resolve").bold(),
                style(env!("CARGO_PKG_VERSION")).dim(),
                style(format!(
                    "strategies: {}  content {}ms  probe {}ms",
                    resolver.strategy_names().join(" → "),
                    resolver.config().content_timeout.as_millis(),
                    resolver.config().probe_timeout.as_millis()
                ))
                .dim()
            ))
            .ok();
    }
    let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let tasks = ids.into_iter().map(|raw| {
        let resolver = Arc::clone(&resolver);
        let cancel = cancel.clone();
        let bar = multi.add(ProgressBar::new_spinner().with_style(spinner_style.clone()));
        bar.set_message(format!("{} {}", style(&raw).bold(), style("resolving...").dim()));
        bar.enable_steady_tick(Duration::from_millis(100));
        let multi = multi.clone();

        async move {
            let outcome = match VideoId::parse(&raw) {
                Ok(id) => {
                    let started = Instant::now();
                    let (result, report) = resolver.resolve_with_report(&id, &cancel).await;
                    Outcome::Resolved {
                        result,
                        report,
                        elapsed: started.elapsed(),
                    }
                }
                Err(e) => Outcome::Invalid(e.to_string()),
            };
            bar.finish_and_clear();

            let ok = outcome.is_ok();
            if json_output {
                println!("{}", outcome.to_json(&raw));
            } else {
                multi.println(outcome.render(&raw)).ok();
            }
            ok
        }
    });

    let results = join_all(tasks).await;
    let failed = results.iter().filter(|ok| !**ok).count();

    if cancel.is_cancelled() {
        ExitCode::from(130)
    } else if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

enum Outcome {
    Resolved {
        result: Result<ResolvedStream, ResolveError>,
        report: ResolutionReport,
        elapsed: Duration,
    },
    Invalid(String),
}

impl Outcome {
    fn is_ok(&self) -> bool {
        matches!(self, Self::Resolved { result: Ok(_), .. })
    }

    fn to_json(&self, raw: &str) -> serde_json::Value {
        match self {
            Self::Invalid(message) => json!({
                "video_id": raw,
                "ok": false,
                "error": "invalid_video_id",
                "message": message,
            }),
            Self::Resolved {
                result,
                report,
                elapsed,
            } => {
                let mut value = json!({
                    "video_id": raw,
                    "request_id": report.request_id,
                    "ok": result.is_ok(),
                    "elapsed_ms": elapsed.as_millis() as u64,
                    "attempts": report.attempts,
                });
                match result {
                    Ok(stream) => value["stream"] = json!(stream),
                    Err(ResolveError::Cancelled) => value["error"] = json!("cancelled"),
                    Err(ResolveError::Extraction(e)) => {
                        value["error"] = json!(e);
                        value["message"] = json!(e.to_string());
                        value["retryable"] = json!(e.is_retryable());
                    }
                }
                value
            }
        }
    }

    fn render(&self, raw: &str) -> String {
        match self {
            Self::Invalid(message) => format!(
                "{} {}  {}",
                style("✗").red().bold(),
                style(raw).bold(),
                style(message).red()
            ),
            Self::Resolved {
                result: Ok(stream),
                elapsed,
                ..
            } => {
                let mut lines = vec![format!(
                    "{} {}  {}  {}",
                    style("✓").green().bold(),
                    style(raw).bold(),
                    style(&stream.quality_label).green(),
                    style(format!("via {} in {}ms", stream.source, elapsed.as_millis())).dim()
                )];
                lines.push(format!("    {} {}", style("video:").dim(), stream.video_url));
                if let Some(audio) = &stream.audio_url {
                    lines.push(format!("    {} {}", style("audio:").dim(), audio));
                }
                lines.join("\n")
            }
            Self::Resolved {
                result: Err(ResolveError::Cancelled),
                ..
            } => format!(
                "{} {}  {}",
                style("-").yellow(),
                style(raw).bold(),
                style("cancelled").yellow()
            ),
            Self::Resolved {
                result: Err(ResolveError::Extraction(e)),
                report,
                ..
            } => {
                let mut lines = vec![format!(
                    "{} {}  {}  {}",
                    style("✗").red().bold(),
                    style(raw).bold(),
                    style(e.as_str()).red(),
                    e
                )];
                for attempt in &report.attempts {
                    lines.push(format!(
                        "    {} {:<12} {}ms",
                        style("tried").dim(),
                        attempt.strategy,
                        attempt.elapsed_ms
                    ));
                }
                lines.join("\n")
            }
        }
    }
}

async fn run_probe(url: String, config: ResolverConfig) -> ExitCode {
    let transport = Arc::new(ReqwestTransport::from_config(&config));
    let validator = StreamValidator::from_config(&config, transport);

    let started = Instant::now();
    let reachable = tokio::select! {
        reachable = validator.probe(&url) => Some(reachable),
        _ = shutdown_signal() => None,
    };

    let Some(reachable) = reachable else {
        println!("{}", style("Probe cancelled.").dim());
        return ExitCode::from(130);
    };

    if reachable {
        println!(
            "{} {}  {}",
            style("✓").green().bold(),
            url,
            style(format!("reachable in {}ms", started.elapsed().as_millis())).dim()
        );
        ExitCode::SUCCESS
    } else {
        println!(
            "{} {}  {}",
            style("✗").red().bold(),
            url,
            style(format!(
                "unreachable ({:?}, timeout {}ms)",
                config.probe_method,
                validator.timeout().as_millis()
            ))
            .red()
        );
        ExitCode::FAILURE
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
