//! Tracing initialization.
//!
//! Logs go to stderr: stdout carries the MCP transport. `RUST_LOG` filters,
//! and `DOXYSEARCH_LOG_FORMAT=json` switches to one JSON object per line.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Selects the log line format.
pub const LOG_FORMAT_ENV: &str = "DOXYSEARCH_LOG_FORMAT";

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Format named by `value`; anything but `json` is compact.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }

    fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

/// Initialize tracing. Safe to call multiple times.
pub fn init() {
    INIT.call_once(|| {
        let is_test =
            std::env::var("NEXTEST").is_ok() || std::env::var("CARGO_TARGET_TMPDIR").is_ok();
        let filter = EnvFilter::from_default_env().add_directive(
            if is_test {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            }
            .into(),
        );

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_target(true)
            .with_span_events(FmtSpan::NONE);

        let result = if is_test {
            builder.compact().with_test_writer().try_init()
        } else {
            match LogFormat::from_env() {
                LogFormat::Json => builder.json().with_writer(std::io::stderr).try_init(),
                LogFormat::Compact => builder.compact().with_writer(std::io::stderr).try_init(),
            }
        };
        if let Err(e) = result {
            eprintln!("Failed to initialize tracing: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use rstest::rstest;

    #[test]
    fn init_installs_a_global_subscriber() {
        init();
        init();
        check!(tracing::dispatcher::has_been_set());
    }

    #[rstest]
    #[case(Some("json"), LogFormat::Json)]
    #[case(Some(" JSON "), LogFormat::Json)]
    #[case(Some("compact"), LogFormat::Compact)]
    #[case(Some(""), LogFormat::Compact)]
    #[case(None, LogFormat::Compact)]
    fn parses_log_format(#[case] value: Option<&str>, #[case] expected: LogFormat) {
        check!(LogFormat::parse(value) == expected);
    }
}
