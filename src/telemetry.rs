use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    cnfg::LogFormat,
    pipeline::{Outcome, StageEvent, StageObserver},
};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

/// Turns render stage events into log records inside the current request span.
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn record(&self, event: StageEvent) {
        let stage = event.stage.as_str();
        let elapsed_ms = event.elapsed.as_millis() as u64;

        match &event.outcome {
            Outcome::Ok => tracing::info!(stage, elapsed_ms, "render stage finished"),
            Outcome::Failed(reason) if event.stage.is_cleanup() => {
                tracing::warn!(stage, elapsed_ms, %reason, "render cleanup failed")
            }
            Outcome::Failed(reason) => {
                tracing::error!(stage, elapsed_ms, %reason, "render stage failed")
            }
        }
    }
}
