//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `cfg.level` when set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes; this makes
/// it safe to call from every test.
#[must_use = "returns whether this call installed the subscriber"]
pub fn init_logging(cfg: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if cfg.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_no_op() {
        let cfg = LoggingConfig::default();
        let _first = init_logging(&cfg);
        assert!(!init_logging(&cfg));
        tracing::info!(component = "logging", "subscriber ready");
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let cfg = LoggingConfig {
            level: "not a [valid directive".to_owned(),
            json: true,
        };
        let _installed = init_logging(&cfg);
    }
}
