//! Log output for the `sitefront` binary.
//!
//! The deploy pipeline tees the deployment CLI's output to stdout, so every
//! log line is written to stderr. `sitefront deploy 2>deploy.log` then keeps
//! the CLI transcript and the pipeline's own records apart, and `--json`
//! reports printed on stdout stay machine-readable.

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines, ANSI colour when stderr is a terminal.
    Text,
    /// Newline-delimited JSON for CI log collectors.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// `RUST_LOG` wins over `level` when it parses.
fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn stderr_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    }
}

/// Install the global subscriber.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let installed = tracing_subscriber::registry()
        .with(filter(level))
        .with(stderr_layer(LogFormat::from_json_flag(json)))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %level, json, "Logging to stderr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_flag_selects_format() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Text);
    }

    #[test]
    fn test_second_init_is_ignored() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
