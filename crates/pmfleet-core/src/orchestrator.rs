//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use pmfleet_common::AppConfig;
use pmfleet_meter::PowerMeter;
use pmfleet_metrics::{FleetMetrics, PollOutcome, SharedRegistry};
use pmfleet_stats::{builtin_specs, default_classifier, OperatorOutput, SpecSet, SpecsTable};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::connector::{connect_meter, SharedConnector};
use crate::state::{EntryInfo, FleetEntry, FleetState};

/// One evaluation of the fleet spec set.
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub device_type: String,
    pub evaluated_at: DateTime<Utc>,
    pub devices: usize,
    pub metrics: IndexMap<String, OperatorOutput>,
}

/// Result of a single synchronous sweep over every device.
#[derive(Debug, Clone, Serialize)]
pub struct PollOnceReport {
    pub entries: Vec<FleetEntry>,
    pub fleet: FleetReport,
}

/// Primary orchestrator entrypoint.
pub struct FleetOrchestrator {
    config: Arc<AppConfig>,
    connector: SharedConnector,
    specs: Arc<SpecsTable>,
    metrics_registry: Option<SharedRegistry>,
}

impl std::fmt::Debug for FleetOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetOrchestrator")
            .field("devices", &self.config.devices.len())
            .field("device_type", &self.config.fleet.device_type)
            .field("metrics", &self.metrics_registry.is_some())
            .finish()
    }
}

impl FleetOrchestrator {
    pub fn new(
        config: AppConfig,
        connector: SharedConnector,
        metrics: Option<SharedRegistry>,
    ) -> Result<Self> {
        config
            .validate()
            .context("invalid fleet configuration")?;
        let specs = builtin_specs(default_classifier())?;
        Ok(Self {
            config: Arc::new(config),
            connector,
            specs,
            metrics_registry: metrics,
        })
    }

    /// Replace the built-in specs table.
    pub fn with_specs(mut self, specs: Arc<SpecsTable>) -> Self {
        self.specs = specs;
        self
    }

    fn spec_set(&self) -> Result<SpecSet> {
        let device_type = &self.config.fleet.device_type;
        self.specs
            .get(device_type)
            .cloned()
            .ok_or_else(|| {
                anyhow!("no aggregation specs registered for device type '{device_type}'")
            })
    }

    /// Connect every device, spawn its poll loop and the aggregation loop.
    pub async fn start(self) -> Result<FleetHandle> {
        let spec_set = self.spec_set()?;
        let metrics = match &self.metrics_registry {
            Some(registry) => Some(FleetMetrics::new(registry.clone())?),
            None => None,
        };
        let (shutdown_tx, _) = broadcast::channel(16);
        let state = FleetState::new();
        let device_tasks: Vec<_> = self
            .connect_fleet(&state)
            .into_iter()
            .map(|(device_id, meter, interval)| {
                spawn_device_loop(
                    device_id,
                    meter,
                    interval,
                    state.clone(),
                    metrics.clone(),
                    shutdown_tx.subscribe(),
                )
            })
            .collect();

        if let Some(metrics) = &metrics {
            metrics.set_device_count(device_tasks.len());
        }
        if device_tasks.is_empty() {
            warn!("no connectable devices configured");
        }

        let aggregator = Aggregator {
            device_type: self.config.fleet.device_type.clone(),
            spec_set: Arc::new(spec_set),
            state: state.clone(),
            latest: Arc::new(RwLock::new(None)),
            metrics,
        };
        let aggregation_task = spawn_aggregation_loop(
            aggregator.clone(),
            self.config.fleet.aggregation_interval,
            shutdown_tx.subscribe(),
        );

        info!(
            devices = device_tasks.len(),
            device_type = %self.config.fleet.device_type,
            "fleet orchestrator started"
        );

        Ok(FleetHandle {
            shutdown: shutdown_tx,
            device_tasks,
            aggregation_task,
            aggregator,
            config: self.config,
        })
    }

    /// Take one fresh snapshot from every device, close the clients and
    /// evaluate the spec set once.
    pub async fn poll_once(&self) -> Result<PollOnceReport> {
        let spec_set = self.spec_set()?;
        let state = FleetState::new();
        let meters = self.connect_fleet(&state);

        let polls = meters.into_iter().map(|(device_id, mut meter, _)| {
            let state = state.clone();
            async move {
                poll_device(&device_id, &mut meter, &state, None).await;
                meter.close().await;
            }
        });
        futures::future::join_all(polls).await;

        let aggregator = Aggregator {
            device_type: self.config.fleet.device_type.clone(),
            spec_set: Arc::new(spec_set),
            state: state.clone(),
            latest: Arc::new(RwLock::new(None)),
            metrics: None,
        };
        Ok(PollOnceReport {
            entries: state.entries(),
            fleet: aggregator.run(),
        })
    }

    /// Open every connectable device. A connector failure lands on that
    /// device's entry as `last.err`; the rest of the fleet still connects.
    fn connect_fleet(&self, state: &FleetState) -> Vec<(String, PowerMeter, Duration)> {
        let mut meters = Vec::new();
        for (device_id, device) in &self.config.devices {
            match connect_meter(self.connector.as_ref(), device_id, device) {
                Ok(Some(meter)) => {
                    state.register(device_id, EntryInfo::from(device));
                    meters.push((device_id.clone(), meter, device.collect_snaps_interval));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(device = %device_id, error = %err, "device connect failed; not polling it");
                    state.register(device_id, EntryInfo::from(device));
                    state.record_error(device_id, format!("{err:#}"));
                }
            }
        }
        meters
    }
}

/// Handle returned from [`FleetOrchestrator::start`].
#[derive(Debug)]
pub struct FleetHandle {
    shutdown: broadcast::Sender<()>,
    device_tasks: Vec<JoinHandle<()>>,
    aggregation_task: JoinHandle<()>,
    aggregator: Aggregator,
    config: Arc<AppConfig>,
}

impl FleetHandle {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &FleetState {
        &self.aggregator.state
    }

    pub fn device_count(&self) -> usize {
        self.device_tasks.len()
    }

    /// Most recent aggregation result, if a pass has completed.
    pub fn latest_metrics(&self) -> Option<FleetReport> {
        self.aggregator.latest.read().clone()
    }

    /// Run an aggregation pass immediately and publish it.
    pub fn aggregate_now(&self) -> FleetReport {
        self.aggregator.run()
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        for task in self.device_tasks {
            if let Err(err) = task.await {
                error!(error = %err, "device task join error");
            }
        }
        if let Err(err) = self.aggregation_task.await {
            error!(error = %err, "aggregation task join error");
        }
        info!("fleet orchestrator shutdown complete");
        Ok(())
    }
}

#[derive(Clone)]
struct Aggregator {
    device_type: String,
    spec_set: Arc<SpecSet>,
    state: FleetState,
    latest: Arc<RwLock<Option<FleetReport>>>,
    metrics: Option<FleetMetrics>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("device_type", &self.device_type)
            .field("ops", &self.spec_set.len())
            .finish()
    }
}

impl Aggregator {
    fn run(&self) -> FleetReport {
        let entries = self.state.values();
        let report = FleetReport {
            device_type: self.device_type.clone(),
            evaluated_at: Utc::now(),
            devices: entries.len(),
            metrics: self.spec_set.evaluate(&entries),
        };
        if let Some(metrics) = &self.metrics {
            let rows: Vec<(&str, String, String, f64)> = report
                .metrics
                .iter()
                .flat_map(|(operator, output)| {
                    output
                        .rows()
                        .into_iter()
                        .map(move |(group, stat, value)| (operator.as_str(), group, stat, value))
                })
                .collect();
            metrics.publish_fleet(rows.iter().map(|(operator, group, stat, value)| {
                (*operator, group.as_str(), stat.as_str(), *value)
            }));
        }
        debug!(
            devices = report.devices,
            ops = report.metrics.len(),
            "fleet aggregation pass"
        );
        *self.latest.write() = Some(report.clone());
        report
    }
}

fn spawn_device_loop(
    device_id: String,
    mut meter: PowerMeter,
    interval: Duration,
    state: FleetState,
    metrics: Option<FleetMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(device = %device_id, "device loop shutdown");
                    break;
                }
                _ = ticker.tick() => {
                    poll_device(&device_id, &mut meter, &state, metrics.as_ref()).await;
                }
            }
        }
        meter.close().await;
    })
}

fn spawn_aggregation_loop(
    aggregator: Aggregator,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately, before any device has reported
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("aggregation loop shutdown");
                    break;
                }
                _ = ticker.tick() => {
                    aggregator.run();
                }
            }
        }
    })
}

async fn poll_device(
    device_id: &str,
    meter: &mut PowerMeter,
    state: &FleetState,
    metrics: Option<&FleetMetrics>,
) {
    let started = Instant::now();
    match meter.prep_snap(false).await {
        Ok(snap) => {
            state.record_snapshot(device_id, snap.to_value(), snap.timestamp);
            if let Some(metrics) = metrics {
                metrics.record_poll(device_id, PollOutcome::Ok, started.elapsed().as_secs_f64());
                metrics.set_power(device_id, snap.power_w, snap.historical_average_w);
            }
            debug!(
                device = device_id,
                power_w = snap.power_w,
                last15m_avg_w = snap.historical_average_w,
                "snapshot collected"
            );
        }
        Err(err) => {
            warn!(device = device_id, error = %err, "poll failed");
            state.record_error(device_id, err.to_string());
            if let Some(metrics) = metrics {
                let elapsed = started.elapsed().as_secs_f64();
                metrics.record_poll(device_id, PollOutcome::Error, elapsed);
            }
        }
    }
}
