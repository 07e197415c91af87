//! Startup helpers shared by the binaries.

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use policybot_core::config::{Config, Settings};

/// `RUST_LOG` wins over `logging.filter`. Logs go to stderr so answers on
/// stdout stay clean.
pub fn init_logging(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stderr_layer = tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry().with(env_filter).with(stderr_layer).try_init();
}

/// Layered settings for `env`, or for `RUST_ENV` when none is given.
pub fn load_settings(env: Option<&str>) -> anyhow::Result<Settings> {
    let config = match env {
        Some(env) => Config::load_for_env(env),
        None => Config::load(),
    }
    .context("loading configuration")?;
    config.settings()
}
