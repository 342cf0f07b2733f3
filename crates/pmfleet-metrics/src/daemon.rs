//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Process-level metrics for the fleet daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounter, IntGaugeVec, Opts};

use crate::{registered, SharedRegistry};

/// What the daemon knows once its configuration is loaded.
#[derive(Debug, Clone, Copy)]
pub struct StartupReport<'a> {
    pub version: &'a str,
    pub profile: &'a str,
    pub config_load: Duration,
    pub devices_configured: usize,
    /// Devices with an address, port and unit id.
    pub devices_connectable: usize,
}

#[derive(Clone, Debug)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
    configured_devices: IntGaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 12)
            .context("failed to construct config load buckets")?;
        Ok(Self {
            starts_total: registered(
                &registry,
                IntCounter::new("pmfleetd_starts_total", "Daemon starts")?,
            )?,
            config_load_seconds: registered(
                &registry,
                Histogram::with_opts(
                    HistogramOpts::new(
                        "pmfleetd_config_load_seconds",
                        "Time to read, parse and validate the fleet configuration",
                    )
                    .buckets(buckets),
                )?,
            )?,
            build_info: registered(
                &registry,
                GaugeVec::new(
                    Opts::new("pmfleetd_build_info", "Version and build profile, always 1"),
                    &["version", "profile"],
                )?,
            )?,
            configured_devices: registered(
                &registry,
                IntGaugeVec::new(
                    Opts::new(
                        "pmfleetd_configured_devices",
                        "Configured power meters by whether they can be connected",
                    ),
                    &["state"],
                )?,
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Count one start and publish what it loaded.
    pub fn record_start(&self, report: StartupReport<'_>) {
        self.starts_total.inc();
        self.config_load_seconds
            .observe(report.config_load.as_secs_f64());
        self.build_info.reset();
        self.build_info
            .with_label_values(&[report.version, report.profile])
            .set(1.0);
        let skipped = report
            .devices_configured
            .saturating_sub(report.devices_connectable);
        self.configured_devices
            .with_label_values(&["connectable"])
            .set(report.devices_connectable as i64);
        self.configured_devices
            .with_label_values(&["skipped"])
            .set(skipped as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{new_registry, render};

    fn report() -> StartupReport<'static> {
        StartupReport {
            version: "0.1.0",
            profile: "debug",
            config_load: Duration::from_millis(2),
            devices_configured: 4,
            devices_connectable: 3,
        }
    }

    #[test]
    fn start_publishes_build_and_device_counts() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.record_start(report());

        let text = render(&registry).unwrap();
        assert!(text.contains("pmfleetd_starts_total 1"));
        assert!(text.contains("pmfleetd_config_load_seconds_count 1"));
        assert!(text.contains("version=\"0.1.0\""));
        assert!(text.contains("pmfleetd_configured_devices{state=\"connectable\"} 3"));
        assert!(text.contains("pmfleetd_configured_devices{state=\"skipped\"} 1"));
    }

    #[test]
    fn build_info_keeps_a_single_series() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.record_start(report());
        metrics.record_start(StartupReport {
            version: "0.2.0",
            ..report()
        });

        let text = render(&registry).unwrap();
        assert!(text.contains("pmfleetd_starts_total 2"));
        assert!(!text.contains("version=\"0.1.0\""));
        assert!(text.contains("version=\"0.2.0\""));
    }

    #[test]
    fn double_registration_fails() {
        let registry = new_registry();
        DaemonMetrics::new(registry.clone()).unwrap();
        assert!(DaemonMetrics::new(registry).is_err());
    }
}
