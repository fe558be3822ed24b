use crate::safe_display::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    pub json: bool,
    pub default_filter: String,
}

impl TracingConfig {
    /// Matches the teacher's `TracingConfig::local_dev(service_name)` default
    /// used by every `*ServiceConfig::default()` in `cloud-service`.
    pub fn local_dev(service_name: &str) -> Self {
        Self {
            json: false,
            default_filter: format!("warn,{service_name}=debug,forge_core=debug,forge_compiler=debug"),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::local_dev("forge-core")
    }
}

impl SafeDisplay for TracingConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "json: {}", self.json);
        let _ = writeln!(&mut result, "filter: {}", self.default_filter);
        result
    }
}

/// Installs a global `tracing` subscriber honoring `RUST_LOG` if set, else
/// falling back to `config.default_filter`. Grounded on the call site in
/// `cloud-component-service/src/server.rs`
/// (`init_tracing_with_default_env_filter(&config.tracing)`); the function's
/// own implementation isn't in the retrieved source, so this is a direct
/// `tracing-subscriber` equivalent.
pub fn init_tracing_with_default_env_filter(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter.clone()));

    let registry = Registry::default().with(filter);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
