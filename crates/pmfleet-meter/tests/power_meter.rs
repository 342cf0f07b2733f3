//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Power meter polling against scripted register transports."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pmfleet_meter::{
    ClientOptions, DeviceProfile, MeterError, PowerMeter, RegisterTransport, TransportError,
};

#[derive(Clone, Default)]
struct ScriptedTransport {
    /// Raw code served for the real-import-power register.
    power_code: Arc<Mutex<i16>>,
    reads: Arc<Mutex<usize>>,
    delay: Option<Duration>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn read_holding_registers(
        &self,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes, TransportError> {
        *self.reads.lock() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut words = vec![0u8; usize::from(quantity) * 2];
        if address == 272 {
            // register 276 sits at word 4 of the second window
            let code = *self.power_code.lock();
            words[8..10].copy_from_slice(&code.to_be_bytes());
        }
        Ok(Bytes::from(words))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn options(timeout: Duration) -> ClientOptions {
    ClientOptions {
        address: "127.0.0.1".into(),
        port: 502,
        unit_id: 1,
        timeout,
    }
}

fn meter_with(transport: ScriptedTransport, timeout: Duration) -> PowerMeter {
    PowerMeter::builder(DeviceProfile::pm180(), options(timeout))
        .client_factory(move |_| Box::new(transport) as Box<dyn RegisterTransport>)
        .build()
        .expect("meter")
}

#[test]
fn building_without_factory_fails() {
    let err = PowerMeter::builder(DeviceProfile::pm180(), options(Duration::from_secs(1)))
        .build()
        .unwrap_err();
    assert!(matches!(err, MeterError::NoClient));
    assert!(err.to_string().starts_with("ERR_NO_CLIENT"));
}

#[test]
fn zero_interval_is_rejected_at_build() {
    let err = PowerMeter::builder(DeviceProfile::pm180(), options(Duration::from_secs(1)))
        .client_factory(|_| Box::new(ScriptedTransport::default()) as Box<dyn RegisterTransport>)
        .collect_snaps_interval(Duration::ZERO)
        .build()
        .unwrap_err();
    assert!(matches!(err, MeterError::InvalidSampleInterval));
}

#[test]
fn history_capacity_follows_interval() {
    let meter = PowerMeter::builder(DeviceProfile::pm180(), options(Duration::from_secs(1)))
        .client_factory(|_| Box::new(ScriptedTransport::default()) as Box<dyn RegisterTransport>)
        .collect_snaps_interval(Duration::from_secs(30))
        .build()
        .unwrap();
    assert_eq!(meter.history().capacity(), 30);
}

#[tokio::test]
async fn cache_read_before_any_poll_is_invalid() {
    let mut meter = meter_with(ScriptedTransport::default(), Duration::from_secs(1));
    let err = meter.prep_snap(true).await.unwrap_err();
    assert!(matches!(err, MeterError::DataInvalid));
}

#[tokio::test]
async fn fresh_and_cached_snaps_share_one_read() {
    let transport = ScriptedTransport::default();
    *transport.power_code.lock() = 5000;
    let reads = transport.reads.clone();
    let mut meter = meter_with(transport, Duration::from_secs(1));

    let fresh = meter.prep_snap(false).await.unwrap();
    assert_eq!(*reads.lock(), 3);
    assert!(fresh.power_w > 0.0);
    assert_eq!(fresh.historical_average_w, fresh.power_w);

    let cached = meter.prep_snap(true).await.unwrap();
    assert_eq!(*reads.lock(), 3);
    assert_eq!(cached.power_w, fresh.power_w);
    assert_eq!(meter.history().occupied(), 2);
}

#[tokio::test]
async fn history_averages_across_polls() {
    let transport = ScriptedTransport::default();
    let code = transport.power_code.clone();
    let mut meter = meter_with(transport, Duration::from_secs(1));

    *code.lock() = 5000;
    let first = meter.prep_snap(false).await.unwrap();
    *code.lock() = -1;
    let second = meter.prep_snap(false).await.unwrap();

    assert_eq!(second.power_w, 0.0);
    assert_eq!(second.historical_average_w, first.power_w / 2.0);
}

#[tokio::test(start_paused = true)]
async fn slow_transport_times_out_without_snapshot() {
    let transport = ScriptedTransport {
        delay: Some(Duration::from_millis(300)),
        ..ScriptedTransport::default()
    };
    let mut meter = meter_with(transport, Duration::from_millis(500));
    let err = meter.prep_snap(false).await.unwrap_err();
    match err {
        MeterError::Transport(TransportError::Timeout { after }) => {
            assert_eq!(after, Duration::from_millis(500));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(meter.history().occupied(), 0);
    assert!(matches!(
        meter.prep_snap(true).await.unwrap_err(),
        MeterError::DataInvalid
    ));
}

#[tokio::test]
async fn close_reaches_the_transport_and_info_is_exposed() {
    let transport = ScriptedTransport::default();
    let closed = transport.closed.clone();
    let meter = meter_with(transport, Duration::from_secs(1));

    let info = meter.select_info();
    assert_eq!(info.address, "127.0.0.1");
    assert_eq!(info.port, 502);
    assert_eq!(info.unit_id, 1);

    meter.close().await;
    assert!(closed.load(Ordering::SeqCst));
}
