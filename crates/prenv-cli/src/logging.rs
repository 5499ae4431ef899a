//! Log output for the `prenv` binary. Logs always go to stderr; stdout
//! carries only the run summary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const PRENV_TARGETS: [&str; 4] = ["prenv", "prenv_core", "prenv_state", "prenv_github"];

/// prenv's own crates at `level`, everything else (reqwest, hyper) at warn.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(PRENV_TARGETS.iter().map(|t| format!("{t}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` overrides `level`; only the
/// first call in a process has any effect.
pub fn init(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_quieter_than_prenv() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,prenv=debug,prenv_core=debug,prenv_state=debug,prenv_github=debug"
        );
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false, Level::DEBUG);
        init(true, Level::INFO);
        tracing::info!("still logging");
    }
}
