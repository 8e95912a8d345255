//! Logging setup shared by every tool.
//!
//! Backends, in order of preference: the systemd journal (Linux, when
//! `[logging] journald = true`), daily rolling files under `[logging] dir`,
//! and finally stderr.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "IGPUBLISH_LOG";

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global subscriber. Call once, at startup.
///
/// The filter comes from `IGPUBLISH_LOG` (e.g. `IGPUBLISH_LOG=warn` or
/// `IGPUBLISH_LOG=instagram_publish::lookup=debug`), default `info`.
/// `verbose` overrides it with `debug`.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let env_filter = env_filter(verbose);

    #[cfg(target_os = "linux")]
    {
        if config.journald {
            match tracing_journald::layer() {
                Ok(journald_layer) => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(journald_layer)
                        .init();

                    tracing::info!("Logging initialized with journald backend");
                    return Ok(());
                }
                Err(e) => eprintln!("journald unavailable ({}), falling back", e),
            }
        }
    }

    if let Some(log_dir) = &config.dir {
        std::fs::create_dir_all(log_dir)?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "instagram-publish.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Dropping the guard stops the writer thread
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        tracing::info!("Logging initialized with file backend at {:?}", log_dir);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
