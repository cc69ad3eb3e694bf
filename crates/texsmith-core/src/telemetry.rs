//! Log setup for the texsmith binaries.
//!
//! Events go to stderr; stdout carries command output only. Without
//! `RUST_LOG`, texsmith's own crates log at the requested level and every
//! other crate (the HTTP stack included) at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level.
const OWN_TARGETS: &[&str] = &["texsmith_core", "texsmith"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in OWN_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber, text or newline-delimited JSON. Only the
/// first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_ok() {
        tracing::debug!(json, level = %level, "tracing initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_dependencies() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,texsmith_core=debug,texsmith=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_repeated_init_is_a_no_op() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging after second init");
    }
}
