use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::connection::PortSlot;
use crate::link::{PortOpener, SerialLink, SerialSettings};
use crate::ports::PortDescriptor;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("open {port} failed: {reason}")]
    OpenFailed { port: String, reason: String },
    #[error("no data from {port} within {waited_ms}ms")]
    NoData { port: String, waited_ms: u64 },
}

impl ProbeError {
    pub fn outcome(&self) -> ProbeOutcome {
        match self {
            ProbeError::OpenFailed { .. } => ProbeOutcome::OpenFailed,
            ProbeError::NoData { .. } => ProbeOutcome::NoData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Live,
    OpenFailed,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePass {
    Bluetooth,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub port: String,
    pub description: String,
    pub pass: ProbePass,
    pub outcome: ProbeOutcome,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTiming {
    /// Wait after closing the previous port before opening another.
    pub settle: Duration,
    /// Wait after open before trusting the port.
    pub stabilize: Duration,
    pub liveness_polls: u32,
    pub liveness_poll: Duration,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            stabilize: Duration::from_millis(1000),
            liveness_polls: 30,
            liveness_poll: Duration::from_millis(100),
        }
    }
}

/// Opens one candidate and decides whether a device is actually talking on it.
pub struct PortProbe {
    opener: Box<dyn PortOpener>,
    settings: SerialSettings,
    timing: ProbeTiming,
    clock: Arc<dyn Clock>,
}

impl PortProbe {
    pub fn new(
        opener: Box<dyn PortOpener>,
        settings: SerialSettings,
        timing: ProbeTiming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { opener, settings, timing, clock }
    }

    /// On success the returned link is open and has pending bytes; it is the
    /// caller's to install. On failure nothing is left open.
    ///
    /// Any byte counts as proof of life, parsed or not.
    pub fn try_connect(&self, slot: &PortSlot, port: &PortDescriptor) -> Result<Box<dyn SerialLink>, ProbeError> {
        if slot.close() {
            self.clock.sleep(self.timing.settle);
        }

        let mut link = self.opener.open(port, &self.settings).map_err(|e| ProbeError::OpenFailed {
            port: port.system_name.clone(),
            reason: e.to_string(),
        })?;

        self.clock.sleep(self.timing.stabilize);
        link.discard_input().map_err(|e| ProbeError::OpenFailed {
            port: port.system_name.clone(),
            reason: format!("discard stale input: {}", e),
        })?;

        let start = self.clock.now_ms();
        for _ in 0..self.timing.liveness_polls {
            match link.bytes_available() {
                Ok(n) if n > 0 => {
                    debug!("probe: {} has {} byte(s) pending", port.system_name, n);
                    return Ok(link);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("probe: {} poll failed: {}", port.system_name, e);
                    break;
                }
            }
            self.clock.sleep(self.timing.liveness_poll);
        }

        Err(ProbeError::NoData {
            port: port.system_name.clone(),
            waited_ms: self.clock.now_ms().saturating_sub(start),
        })
    }
}
