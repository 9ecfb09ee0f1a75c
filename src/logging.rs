//! Logging configuration.
//!
//! Sets up tracing-based logging. The CLI logs to stderr by default; a log
//! directory switches to a daily rolling file, and on Linux the systemd
//! journal can be used instead.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log records go.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    #[default]
    Stderr,
    File(PathBuf),
    Journald,
}

/// Initialize the logging system.
///
/// Log level can be controlled via the `CONTEXTSEARCH_LOG` environment variable:
/// - `CONTEXTSEARCH_LOG=debug` for every query, URL and dropped candidate
/// - `CONTEXTSEARCH_LOG=info` for pipeline summaries
/// - `CONTEXTSEARCH_LOG=warn` for failed sub-queries (default)
pub fn init(target: LogTarget) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("CONTEXTSEARCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match target {
        LogTarget::Journald => {
            #[cfg(target_os = "linux")]
            {
                if let Ok(journald_layer) = tracing_journald::layer() {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(journald_layer)
                        .try_init()?;

                    tracing::info!("Logging initialized with journald backend");
                    return Ok(());
                }
            }

            // No journal available, keep the records visible
            init_stderr(env_filter)
        }
        LogTarget::File(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = tracing_appender::rolling::daily(&log_dir, "contextsearch.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the writer alive for the life of the process
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()?;

            tracing::info!("Logging initialized with file backend at {:?}", log_dir);
            Ok(())
        }
        LogTarget::Stderr => init_stderr(env_filter),
    }
}

fn init_stderr(env_filter: EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
