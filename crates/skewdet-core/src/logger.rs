//! Minimal stderr logger for the `skewdet-*` crates.
//!
//! Lines look like `[  0.123s DEBUG skewdet_nms] kept 4 of 9 candidates`.
//! Install once with [`init_with_level`]; with the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` instead.
//!
//! The level applies to the `skewdet*` crates; records from other crates
//! pass only at `warn` and above.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`init_tracing`] before `RUST_LOG`.
pub const LOG_ENV: &str = "SKEWDET_LOG";

#[cfg(feature = "tracing")]
const DEFAULT_DIRECTIVES: &str = "warn,skewdet=info";

struct EngineLogger {
    level: LevelFilter,
    started: Instant,
}

fn crate_of(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

fn is_engine_target(target: &str) -> bool {
    crate_of(target).starts_with("skewdet")
}

impl Log for EngineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let max = if is_engine_target(metadata.target()) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        };
        metadata.level() <= max
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            crate_of(record.target()),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<EngineLogger> = OnceLock::new();

/// Install the logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| EngineLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

#[cfg(feature = "tracing")]
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install a `tracing` subscriber filtered by `SKEWDET_LOG`, then
/// `RUST_LOG`, defaulting to `info` for the engine crates and `warn`
/// elsewhere.
///
/// Span close events carry the timing of the instrumented hot paths
/// (`skew_iou_matrix`, `build_targets`, `compute_loss`, `post_process`).
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) -> bool {
    let builder = fmt()
        .with_env_filter(env_filter())
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);
    let installed = if json {
        builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .finish()
            .try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .compact()
            .finish()
            .try_init()
    };
    installed.is_ok()
}
