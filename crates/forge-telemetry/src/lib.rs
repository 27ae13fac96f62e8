use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "forge_store" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON-formatted log lines (plain compact format otherwise).
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_target(true)
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_target(true)
            .with_env_filter(env_filter)
            .init();
    }
}

/// Build the default filter directive from the config.
fn filter_directive(config: &TelemetryConfig) -> String {
    let mut directive = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        directive.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directive
}
