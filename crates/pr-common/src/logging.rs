use std::panic;
use std::sync::OnceLock;

use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::run_id;

const LOG_DIR_ENV: &str = "PR_LOG_DIR";
const LOG_FORMAT_ENV: &str = "PR_LOG_FORMAT";
const BACKTRACE_ENV: &str = "PR_LOG_INCLUDE_BACKTRACE";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Line layout of the fmt layer, picked with `PR_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            _ => LogFormat::Full,
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Root span for a recommender process. Everything instrumented under it
/// (request handling, workers) carries `app` and `run_id` on each line.
pub fn process_span(app_name: &'static str) -> Span {
    tracing::info_span!("recommender", app = app_name, run_id = run_id::get())
}

/// Log panics through `tracing`, tagged with the process run id. Installed once.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();
        let include_backtrace = std::env::var(BACKTRACE_ENV)
            .map(|value| flag_enabled(&value))
            .unwrap_or(false);

        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()));
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());

            tracing::error!(
                app = app_name,
                run_id = run_id::get(),
                thread = thread.name().unwrap_or("unnamed"),
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %message,
                "worker or handler panicked"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

fn rotating_file_writer(app_name: &'static str) -> Option<std::io::Result<BoxMakeWriter>> {
    let dir = std::path::PathBuf::from(std::env::var_os(LOG_DIR_ENV)?);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        return Some(Err(err));
    }

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(Ok(BoxMakeWriter::new(non_blocking)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` filters (default `info`), `PR_LOG_FORMAT=compact` shortens
/// lines, and `PR_LOG_DIR` sends output to `<dir>/<app>.log` rotated daily
/// with ANSI colours off. Later calls are no-ops.
pub fn init_tracing_subscriber(app_name: &'static str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());

    let mut dir_error = None;
    let (writer, ansi) = match rotating_file_writer(app_name) {
        Some(Ok(writer)) => (writer, false),
        Some(Err(err)) => {
            dir_error = Some(err);
            (BoxMakeWriter::new(std::io::stdout), true)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    let layer = match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();

    if let Some(err) = dir_error {
        tracing::warn!(error = %err, "failed to create {LOG_DIR_ENV}; logging to stdout");
    }
}
