//! # Structured Logging Module
//!
//! Environment-aware structured logging that writes human-readable output to the
//! console and JSON records to a per-process file under `log/`.

use chrono::Utc;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber, and an
/// already-installed global subscriber is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        let file_layer = match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let pid = process::id();
                let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
                let file_appender = tracing_appender::rolling::never(
                    &log_dir,
                    format!("{environment}.{pid}.{timestamp}.log"),
                );
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // The guard flushes on drop; logging lives for the whole process.
                std::mem::forget(guard);
                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(build_filter(&log_level)),
                )
            }
            Err(e) => {
                eprintln!("log directory unavailable, console logging only: {e}");
                None
            }
        };

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(build_filter(&log_level)),
            )
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            "Structured logging initialized"
        );
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SCHEDULER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for plan-level operations (interrupt, proceed, rebuild)
pub fn log_plan_operation(operation: &str, plan: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        plan = %plan,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "PLAN_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    step_id: &str,
    step_name: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        step_id = %step_id,
        step_name = %step_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "STEP_OPERATION"
    );
}

/// Log structured data for offer handling (accept, decline, queue overflow)
pub fn log_offer_operation(operation: &str, offer_count: usize, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        offer_count = offer_count,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "OFFER_OPERATION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_by_environment() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_structured_helpers_do_not_panic_without_subscriber() {
        log_plan_operation("interrupt", "deploy", "WAITING", None);
        log_step_operation("restart", "id", "hello-0:[server]", "PENDING", Some("operator"));
        log_offer_operation("decline_short", 3, None);
    }
}
