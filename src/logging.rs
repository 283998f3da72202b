use atty;
use tracing_subscriber;
use tracing_subscriber::filter::EnvFilter;
use crate::config::LogFormat;

/// Installs the global subscriber; returns false if one was already set.
pub fn init(format: LogFormat) -> bool {
    match format {
        LogFormat::Text => init_text(),
        LogFormat::Json => init_json(),
    }
}

fn init_text() -> bool {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}

fn init_json() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}
