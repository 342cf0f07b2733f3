//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Tracing subscriber setup for the fleet daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

pub const LOG_ENV: &str = "PMFLEET_LOG";
pub const DEFAULT_DIRECTIVE: &str = "info";

static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Where the active filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveSource {
    Pmfleet,
    RustLog,
    Default,
}

/// Filter directive chosen at startup, plus any candidate that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveChoice {
    pub directive: String,
    pub source: DirectiveSource,
    pub rejected: Vec<(DirectiveSource, String)>,
}

/// First parsable, non-blank directive out of `PMFLEET_LOG` then `RUST_LOG`,
/// else [`DEFAULT_DIRECTIVE`].
pub fn choose_directive(pmfleet: Option<&str>, rust_log: Option<&str>) -> DirectiveChoice {
    let mut rejected = Vec::new();
    let candidates = [
        (DirectiveSource::Pmfleet, pmfleet),
        (DirectiveSource::RustLog, rust_log),
    ];
    for (source, raw) in candidates {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            continue;
        };
        if EnvFilter::try_new(raw).is_ok() {
            return DirectiveChoice {
                directive: raw.to_owned(),
                source,
                rejected,
            };
        }
        rejected.push((source, raw.to_owned()));
    }
    DirectiveChoice {
        directive: DEFAULT_DIRECTIVE.to_owned(),
        source: DirectiveSource::Default,
        rejected,
    }
}

/// `<prefix>.log`, where the prefix defaults to the service name.
pub fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    format!("{prefix}.log")
}

/// Install the global subscriber: stdout in `config.format` and a daily
/// JSON file under `config.directory`. A second call keeps the first
/// subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;

    let choice = choose_directive(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    );
    let filter = EnvFilter::try_new(&choice.directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let file_appender = daily(&config.directory, log_file_name(service_name, config));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set((file_guard, stdout_guard));

    let timer = fmt::time::UtcTime::rfc_3339();
    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(timer.clone())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(timer.clone())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .with_timer(timer)
        .json()
        .with_writer(file_writer)
        .boxed();

    if tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        return Ok(());
    }

    for (source, directive) in &choice.rejected {
        warn!(?source, %directive, "ignoring unparsable log directive");
    }
    info!(
        service = %service_name,
        directive = %choice.directive,
        source = ?choice.source,
        log_dir = %config.directory.display(),
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmfleet_directive_wins_over_rust_log() {
        let choice = choose_directive(Some("debug,pmfleet_sim=trace"), Some("warn"));
        assert_eq!(choice.directive, "debug,pmfleet_sim=trace");
        assert_eq!(choice.source, DirectiveSource::Pmfleet);
        assert!(choice.rejected.is_empty());
    }

    #[test]
    fn blank_and_invalid_directives_fall_through() {
        let choice = choose_directive(Some("   "), Some("pmfleet_meter=loud"));
        assert_eq!(choice.directive, DEFAULT_DIRECTIVE);
        assert_eq!(choice.source, DirectiveSource::Default);
        assert_eq!(
            choice.rejected,
            vec![(DirectiveSource::RustLog, "pmfleet_meter=loud".to_owned())]
        );

        let choice = choose_directive(Some("pmfleet_meter=loud"), Some("warn"));
        assert_eq!(choice.source, DirectiveSource::RustLog);
        assert_eq!(choice.rejected.len(), 1);
    }

    #[test]
    fn file_name_uses_prefix_or_service() {
        let mut config = LoggingConfig::default();
        assert_eq!(log_file_name("pmfleetd", &config), "pmfleetd.log");
        config.file_prefix = Some("site-a".into());
        assert_eq!(log_file_name("pmfleetd", &config), "site-a.log");
    }
}
