//! Tracing setup.
//!
//! Pretty output is the default since this runs under cloud-init and the
//! transcript lands in the boot log; json is available for fleets that ship
//! boot logs to a collector.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init(log_format: &str, log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match normalize_log_format(log_format) {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339()),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
    }

    tracing::debug!(
        log_format = log_format,
        log_level = log_level,
        "Logging system initialized"
    );
}

fn normalize_log_format(format: &str) -> &'static str {
    match format.to_lowercase().as_str() {
        "json" => "json",
        "pretty" | "compact" | "text" => "pretty",
        other => {
            eprintln!(
                "WARN: Invalid log format '{}', defaulting to 'pretty'. Valid options: json, pretty",
                other
            );
            "pretty"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_log_format() {
        assert_eq!(normalize_log_format("json"), "json");
        assert_eq!(normalize_log_format("JSON"), "json");
        assert_eq!(normalize_log_format("pretty"), "pretty");
        assert_eq!(normalize_log_format("text"), "pretty");
        assert_eq!(normalize_log_format("bogus"), "pretty");
    }
}
