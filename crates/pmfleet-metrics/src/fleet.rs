//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device poll metrics and published fleet aggregates."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts};

use crate::{registered, SharedRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ok,
    Error,
}

impl PollOutcome {
    fn label(self) -> &'static str {
        match self {
            PollOutcome::Ok => "ok",
            PollOutcome::Error => "error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FleetMetrics {
    registry: SharedRegistry,
    devices_total: IntGauge,
    polls_total: IntCounterVec,
    poll_seconds: Histogram,
    power_w: GaugeVec,
    power_w_last15m_avg: GaugeVec,
    fleet_metric: GaugeVec,
}

impl FleetMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let poll_buckets = prometheus::exponential_buckets(0.001, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let per_device = |name: &str, help: &str| GaugeVec::new(Opts::new(name, help), &["device"]);

        Ok(Self {
            devices_total: registered(
                &registry,
                IntGauge::new("pmfleet_devices_total", "Number of power meters being polled")?,
            )?,
            polls_total: registered(
                &registry,
                IntCounterVec::new(
                    Opts::new("pmfleet_polls_total", "Poll cycles by device and outcome"),
                    &["device", "outcome"],
                )?,
            )?,
            poll_seconds: registered(
                &registry,
                Histogram::with_opts(
                    HistogramOpts::new("pmfleet_poll_seconds", "Duration of one poll cycle")
                        .buckets(poll_buckets),
                )?,
            )?,
            power_w: registered(
                &registry,
                per_device("pmfleet_power_w", "Latest real import power per device")?,
            )?,
            power_w_last15m_avg: registered(
                &registry,
                per_device(
                    "pmfleet_power_w_last15m_avg",
                    "Trailing fifteen-minute average real import power per device",
                )?,
            )?,
            fleet_metric: registered(
                &registry,
                GaugeVec::new(
                    Opts::new(
                        "pmfleet_fleet_metric",
                        "Fleet aggregates by operator, group and statistic",
                    ),
                    &["operator", "group", "stat"],
                )?,
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn set_device_count(&self, count: usize) {
        self.devices_total.set(count as i64);
    }

    pub fn record_poll(&self, device: &str, outcome: PollOutcome, seconds: f64) {
        self.polls_total
            .with_label_values(&[device, outcome.label()])
            .inc();
        self.poll_seconds.observe(seconds);
    }

    pub fn set_power(&self, device: &str, power_w: f64, last15m_avg_w: f64) {
        self.power_w.with_label_values(&[device]).set(power_w);
        self.power_w_last15m_avg
            .with_label_values(&[device])
            .set(last15m_avg_w);
    }

    /// Replace every published aggregate with `rows` of
    /// `(operator, group, stat, value)`.
    pub fn publish_fleet<'a, I>(&self, rows: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str, f64)>,
    {
        self.fleet_metric.reset();
        for (operator, group, stat, value) in rows {
            self.fleet_metric
                .with_label_values(&[operator, group, stat])
                .set(value);
        }
    }
}
