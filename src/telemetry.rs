//! Logging setup for hosts embedding depot

use crate::config::schema::GeneralConfig;
use tracing_subscriber::EnvFilter;

/// Install a global tracing subscriber.
///
/// `RUST_LOG` wins over `general.log_level`. Output is JSON lines when
/// `general.log_format` is `"json"`, plain text otherwise. Returns `false`
/// if a subscriber was already installed.
pub fn init(general: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&general.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if general.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

fn default_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => format!("depot={}", level),
        _ => "depot=info".to_string(),
    }
}
