//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Single power meter: read, decode, average and snapshot."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::decoder::{decode, RawRegisterBlock};
use crate::errors::{MeterError, Result};
use crate::profile::DeviceProfile;
use crate::rolling::RollingAverage;
use crate::snapshot::{default_tension, Snapshot, TensionFn};
use crate::transport::{read_ranges, ClientFactory, ClientOptions, RegisterTransport};

pub const DEFAULT_COLLECT_SNAPS_INTERVAL: Duration = Duration::from_millis(60_000);

/// Endpoint summary exposed to fleet entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeterInfo {
    pub address: String,
    pub port: u16,
    pub unit_id: u8,
}

pub struct PowerMeterBuilder {
    profile: DeviceProfile,
    options: ClientOptions,
    factory: Option<ClientFactory>,
    collect_snaps_interval: Duration,
    tension: TensionFn,
}

impl PowerMeterBuilder {
    pub fn client_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&ClientOptions) -> Box<dyn RegisterTransport> + Send + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn collect_snaps_interval(mut self, interval: Duration) -> Self {
        self.collect_snaps_interval = interval;
        self
    }

    pub fn tension(mut self, tension: TensionFn) -> Self {
        self.tension = tension;
        self
    }

    pub fn build(self) -> Result<PowerMeter> {
        let factory = self.factory.ok_or(MeterError::NoClient)?;
        let history = RollingAverage::fifteen_minutes(self.collect_snaps_interval)?;
        let client = factory(&self.options);
        debug!(
            address = %self.options.address,
            port = self.options.port,
            unit_id = self.options.unit_id,
            slots = history.capacity(),
            "power meter ready"
        );
        Ok(PowerMeter {
            profile: self.profile,
            options: self.options,
            client,
            history,
            cache: None,
            tension: self.tension,
        })
    }
}

/// Owns one device's client, cached block and rolling history.
pub struct PowerMeter {
    profile: DeviceProfile,
    options: ClientOptions,
    client: Box<dyn RegisterTransport>,
    history: RollingAverage,
    cache: Option<RawRegisterBlock>,
    tension: TensionFn,
}

impl std::fmt::Debug for PowerMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerMeter")
            .field("thing_type", &self.profile.thing_type)
            .field("options", &self.options)
            .field("history", &self.history)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl PowerMeter {
    pub fn builder(profile: DeviceProfile, options: ClientOptions) -> PowerMeterBuilder {
        PowerMeterBuilder {
            profile,
            options,
            factory: None,
            collect_snaps_interval: DEFAULT_COLLECT_SNAPS_INTERVAL,
            tension: default_tension(),
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn history(&self) -> &RollingAverage {
        &self.history
    }

    /// Read every profile range under the configured timeout and cache the block.
    pub async fn read_values(&mut self) -> Result<RawRegisterBlock> {
        let block = read_ranges(
            self.client.as_ref(),
            &self.profile.ranges,
            self.options.timeout,
        )
        .await?;
        self.cache = Some(block.clone());
        Ok(block)
    }

    /// Produce a snapshot from a fresh read, or from the cached block when
    /// `read_from_cache` is set.
    #[instrument(skip(self), fields(address = %self.options.address, unit_id = self.options.unit_id))]
    pub async fn prep_snap(&mut self, read_from_cache: bool) -> Result<Snapshot> {
        let block = if read_from_cache {
            self.cache.clone()
        } else {
            Some(self.read_values().await?)
        };
        let values = decode(&self.profile, block.as_ref().map(RawRegisterBlock::as_bytes))?;
        Ok(Snapshot::assemble(
            &self.profile,
            values,
            &mut self.history,
            &self.tension,
        ))
    }

    pub async fn close(&self) {
        self.client.close().await;
    }

    pub fn select_info(&self) -> MeterInfo {
        MeterInfo {
            address: self.options.address.clone(),
            port: self.options.port,
            unit_id: self.options.unit_id,
        }
    }
}
