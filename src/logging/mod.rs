/*!
 * Logging Module
 * Console plus daily rolling files, configured from AppConfig
 */
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::AppConfig;

/// Filter used when `RUST_LOG` is not set.
fn default_directive(config: &AppConfig) -> String {
    let level = config.log_level.clone().unwrap_or_else(|| {
        if config.is_production() {
            "info".to_string()
        } else {
            "debug".to_string()
        }
    });
    format!("bloghub={level},tower_http=info,sqlx=warn")
}

/// Initialize the logging system. The returned guards flush the background
/// writers when dropped and must live as long as the process.
pub fn init(config: &AppConfig) -> Vec<WorkerGuard> {
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {}: {}", config.log_dir, e);
    }

    // All events
    let (file_writer, file_guard) = non_blocking(rolling::daily(&config.log_dir, "app.log"));
    // Errors only
    let (error_writer, error_guard) = non_blocking(rolling::daily(&config.log_dir, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.is_production() {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .compact();

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    }

    tracing::info!(
        "Logging initialized for {} environment (files in {})",
        config.environment,
        config.log_dir
    );

    vec![file_guard, error_guard, console_guard]
}

/// Console-only logging for the seed binaries.
pub fn init_cli() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bloghub=info,sqlx=warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_follows_environment() {
        let dev = AppConfig::default();
        assert_eq!(default_directive(&dev), "bloghub=debug,tower_http=info,sqlx=warn");

        let prod = AppConfig {
            environment: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(default_directive(&prod).starts_with("bloghub=info"));
    }

    #[test]
    fn test_init_creates_log_dir_and_returns_guards() {
        let dir = std::env::temp_dir().join(format!("bloghub-logs-{}", uuid::Uuid::new_v4()));
        let config = AppConfig {
            log_dir: dir.to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let guards = init(&config);
        assert_eq!(guards.len(), 3);
        assert!(dir.is_dir());
        tracing::error!("logging smoke test");
        drop(guards);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_explicit_level_wins() {
        let config = AppConfig {
            log_level: Some("warn".to_string()),
            ..AppConfig::default()
        };
        assert!(default_directive(&config).starts_with("bloghub=warn,"));
    }
}
