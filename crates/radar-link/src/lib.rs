pub mod acquire;
pub mod clock;
pub mod connection;
pub mod doctor;
pub mod link;
pub mod ports;
pub mod probe;
pub mod shutdown;
pub mod state;
pub mod throttle;
pub mod tick;

use std::sync::Arc;
use std::time::Duration;

use radar_proto::FrameParser;
use serde::Deserialize;

pub use acquire::{AcquireStep, AcquisitionLoop};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{ConnectionManager, LinkHandle, LostCause, PortSlot};
pub use link::{PortOpener, ReadError, SerialLink, SerialSettings, SystemOpener};
pub use ports::{PortDescriptor, PortEnumerator, SystemPorts};
pub use probe::{PortProbe, ProbeError, ProbeOutcome, ProbePass, ProbeReport, ProbeTiming};
pub use shutdown::Shutdown;
pub use state::{ConnectionState, DataActivity, RadarSnapshot, RadarState, SharedState};
pub use tick::{Renderer, TickLoop};

pub const DEFAULT_BAUD: u32 = 9600;
pub const DATA_TIMEOUT_MS: u64 = 1000;
pub const RECONNECT_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Pin one system port (e.g. "COM5", "/dev/rfcomm0") instead of enumerating.
    pub port: Option<String>,
    pub baud: u32,
    pub read_timeout_ms: u64,

    /// Probe timings: settle after closing the previous port, stabilize after
    /// open, then `liveness_polls` checks `liveness_poll_ms` apart.
    pub settle_ms: u64,
    pub stabilize_ms: u64,
    pub liveness_polls: u32,
    pub liveness_poll_ms: u64,

    pub reconnect_interval_ms: u64,
    /// A connected link with no reading for this long is declared lost.
    pub data_timeout_ms: u64,
    pub acquire_poll_ms: u64,

    /// Drop a record that grows past this many bytes without a delimiter.
    /// Unset means no cap.
    pub max_frame_len: Option<usize>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD,
            read_timeout_ms: 1000,
            settle_ms: 500,
            stabilize_ms: 1000,
            liveness_polls: 30,
            liveness_poll_ms: 100,
            reconnect_interval_ms: RECONNECT_INTERVAL_MS,
            data_timeout_ms: DATA_TIMEOUT_MS,
            acquire_poll_ms: 10,
            max_frame_len: None,
        }
    }
}

impl LinkConfig {
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings { baud: self.baud, read_timeout: Duration::from_millis(self.read_timeout_ms) }
    }

    pub fn probe_timing(&self) -> ProbeTiming {
        ProbeTiming {
            settle: Duration::from_millis(self.settle_ms),
            stabilize: Duration::from_millis(self.stabilize_ms),
            liveness_polls: self.liveness_polls,
            liveness_poll: Duration::from_millis(self.liveness_poll_ms),
        }
    }

    pub fn parser(&self) -> FrameParser {
        match self.max_frame_len {
            Some(max) => FrameParser::with_max_len(max),
            None => FrameParser::new(),
        }
    }

    /// Connection manager over the given port source, with a fresh state and slot.
    pub fn manager(
        &self,
        enumerator: Box<dyn PortEnumerator>,
        opener: Box<dyn PortOpener>,
        clock: Arc<dyn Clock>,
    ) -> ConnectionManager {
        let probe = PortProbe::new(opener, self.serial_settings(), self.probe_timing(), clock.clone());
        ConnectionManager::new(enumerator, probe, LinkHandle::default(), clock, self.reconnect_interval_ms)
    }

    /// Acquisition loop reading from `link`.
    pub fn acquisition(&self, link: LinkHandle, clock: Arc<dyn Clock>, shutdown: Shutdown) -> AcquisitionLoop {
        AcquisitionLoop::new(link, self.parser(), clock, Duration::from_millis(self.acquire_poll_ms), shutdown)
    }
}
