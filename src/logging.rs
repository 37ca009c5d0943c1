//! Tracing subscriber setup.
//!
//! Logs go to stderr so answers and tables on stdout stay clean.

use crate::error::{RagError, Result};
use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither a level nor `RUST_LOG` is given.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,lopdf=error";

/// Install the global subscriber.
///
/// `log_level` takes precedence over `RUST_LOG`. Color is off when
/// `no_color` is set, `NO_COLOR` is present, or stderr is not a terminal.
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> Result<()> {
    let env_filter = build_filter(log_level, std::env::var("RUST_LOG").ok().as_deref())?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && supports_color());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| RagError::Config(format!("Failed to init logging: {}", e)))
}

fn build_filter(log_level: Option<&str>, rust_log: Option<&str>) -> Result<EnvFilter> {
    let directives = log_level.or(rust_log).unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives)
        .map_err(|e| RagError::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn supports_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        let filter = build_filter(Some("debug"), Some("error")).unwrap();
        assert_eq!(filter.to_string(), "debug");

        let filter = build_filter(None, Some("finrag=trace")).unwrap();
        assert_eq!(filter.to_string(), "finrag=trace");

        assert!(build_filter(None, None).is_ok());
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let err = build_filter(Some("finrag=notalevel"), None).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
