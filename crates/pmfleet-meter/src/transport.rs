//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Byte-source seam between the meter and its Modbus client."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::time::timeout;

use crate::decoder::RawRegisterBlock;
use crate::errors::TransportError;
use crate::profile::RegisterRange;

/// Endpoint details handed to a client factory when a meter is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientOptions {
    pub address: String,
    pub port: u16,
    pub unit_id: u8,
    #[serde(skip)]
    pub timeout: Duration,
}

/// Reads holding registers from a device. Connection management, framing
/// and retries belong to the implementor.
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    /// Read `quantity` registers starting at `address` as big-endian bytes.
    async fn read_holding_registers(
        &self,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes, TransportError>;

    /// Release the underlying connection.
    async fn close(&self) {}
}

/// Builds a transport for one meter.
pub type ClientFactory = Box<dyn FnOnce(&ClientOptions) -> Box<dyn RegisterTransport> + Send>;

/// Read each range in order and concatenate the results, failing with
/// [`TransportError::Timeout`] when the whole series exceeds `limit`.
pub async fn read_ranges(
    transport: &dyn RegisterTransport,
    ranges: &[RegisterRange],
    limit: Duration,
) -> Result<RawRegisterBlock, TransportError> {
    let series = async {
        let mut parts = Vec::with_capacity(ranges.len());
        for range in ranges {
            let part = transport
                .read_holding_registers(range.start, range.quantity)
                .await?;
            parts.push(part);
        }
        Ok::<_, TransportError>(RawRegisterBlock::concat(parts))
    };
    match timeout(limit, series).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout { after: limit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Arc<Mutex<Vec<(u16, u16)>>>,
        delay: Option<Duration>,
        fail_at: Option<u16>,
    }

    #[async_trait]
    impl RegisterTransport for RecordingTransport {
        async fn read_holding_registers(
            &self,
            address: u16,
            quantity: u16,
        ) -> Result<Bytes, TransportError> {
            self.requests.lock().push((address, quantity));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_at == Some(address) {
                return Err(TransportError::Io("connection reset".into()));
            }
            let byte = (address & 0xff) as u8;
            Ok(Bytes::from(vec![byte; usize::from(quantity) * 2]))
        }
    }

    const RANGES: [RegisterRange; 3] = [
        RegisterRange::new(257, 6),
        RegisterRange::new(272, 7),
        RegisterRange::new(296, 6),
    ];

    #[tokio::test]
    async fn reads_ranges_in_order_and_concatenates() {
        let transport = RecordingTransport::default();
        let block = read_ranges(&transport, &RANGES, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(block.len(), 38);
        assert_eq!(block.as_bytes()[0], 1);
        assert_eq!(block.as_bytes()[12], 16);
        assert_eq!(block.as_bytes()[26], 40);
        assert_eq!(
            *transport.requests.lock(),
            vec![(257, 6), (272, 7), (296, 6)]
        );
    }

    #[tokio::test]
    async fn stops_at_first_failing_range() {
        let transport = RecordingTransport {
            fail_at: Some(272),
            ..RecordingTransport::default()
        };
        let err = read_ranges(&transport, &RANGES, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Io("connection reset".into()));
        assert_eq!(transport.requests.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_series_times_out() {
        let transport = RecordingTransport {
            delay: Some(Duration::from_millis(400)),
            ..RecordingTransport::default()
        };
        let err = read_ranges(&transport, &RANGES, Duration::from_millis(1000))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Timeout {
                after: Duration::from_millis(1000)
            }
        );
    }
}
