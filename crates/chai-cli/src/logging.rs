//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate to keep library crates lightweight.
//! Library crates only emit `tracing` events.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Targets that follow the verbosity flag; everything else stays at WARN.
const CHAI_TARGETS: [&str; 2] = ["chai_cli", "chai_core"];

/// Initialize the tracing subscriber.
///
/// # Arguments
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - If true, output JSON lines to stderr
///
/// `RUST_LOG` replaces the default filter unless `-v` was given.
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) if verbosity == 0 => filter,
        _ => default_filter(level),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    // A second init (tests) keeps the first subscriber.
    let _ = if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}

fn default_filter(level: Level) -> EnvFilter {
    let directives: Vec<String> = std::iter::once("warn".to_string())
        .chain(CHAI_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect();
    EnvFilter::new(directives.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_raises_chai_targets_only() {
        let rendered = default_filter(Level::DEBUG).to_string().to_ascii_lowercase();
        assert!(rendered.contains("chai_core=debug"));
        assert!(rendered.contains("chai_cli=debug"));
        assert!(rendered.contains("warn"));
    }
}
