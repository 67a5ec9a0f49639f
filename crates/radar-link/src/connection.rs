use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::link::SerialLink;
use crate::ports::{list_or_empty, PortDescriptor, PortEnumerator};
use crate::probe::{PortProbe, ProbeOutcome, ProbePass, ProbeReport};
use crate::shutdown::Shutdown;
use crate::state::{ConnectionState, SharedState};
use crate::throttle::RetryThrottle;

#[derive(Default)]
struct SlotInner {
    link: Option<Box<dyn SerialLink>>,
    generation: u64,
}

/// Holder of the single open port.
///
/// Only the connection manager installs or closes; the acquisition loop
/// borrows the link for the duration of one read. Closing drops the handle.
#[derive(Clone, Default)]
pub struct PortSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl PortSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the generation assigned to `link`.
    pub(crate) fn install(&self, link: Box<dyn SerialLink>) -> u64 {
        let mut slot = self.inner.lock();
        if let Some(old) = slot.link.take() {
            warn!("link: replacing {} that was still open", old.name());
        }
        slot.generation += 1;
        slot.link = Some(link);
        slot.generation
    }

    /// Close the open port, if any. Returns whether one was open.
    pub(crate) fn close(&self) -> bool {
        let old = self.inner.lock().link.take();
        match old {
            Some(link) => {
                debug!("link: closing {}", link.name());
                drop(link);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().link.is_some()
    }

    /// Run `f` against the open link and its generation. `None` when closed.
    pub fn with_link<R>(&self, f: impl FnOnce(u64, &mut dyn SerialLink) -> R) -> Option<R> {
        let mut slot = self.inner.lock();
        let generation = slot.generation;
        slot.link.as_mut().map(|link| f(generation, link.as_mut()))
    }
}

impl fmt::Debug for PortSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.lock();
        f.debug_struct("PortSlot")
            .field("open", &slot.link.as_ref().map(|l| l.name().to_string()))
            .field("generation", &slot.generation)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostCause {
    StreamEnded,
    ReadFailed,
    Silent,
}

impl fmt::Display for LostCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LostCause::StreamEnded => write!(f, "stream ended"),
            LostCause::ReadFailed => write!(f, "read failed"),
            LostCause::Silent => write!(f, "no data received"),
        }
    }
}

/// The shared half of the connection: state plus port slot. Cheap to clone;
/// the acquisition loop holds one to read and to report a lost link.
#[derive(Debug, Clone, Default)]
pub struct LinkHandle {
    state: SharedState,
    slot: PortSlot,
}

impl LinkHandle {
    pub fn new(state: SharedState, slot: PortSlot) -> Self {
        Self { state, slot }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn slot(&self) -> &PortSlot {
        &self.slot
    }

    /// `Connected -> Disconnected` and close the port. No-op otherwise.
    /// Does not schedule a retry; the tick loop's interval governs that.
    pub fn report_lost(&self, cause: LostCause) -> bool {
        let Some(port) = self.state.drop_connected() else {
            return false;
        };
        self.slot.close();
        warn!("connection lost on {}: {}", port, cause);
        true
    }
}

/// Owns port lifecycle and candidate selection.
pub struct ConnectionManager {
    enumerator: Box<dyn PortEnumerator>,
    probe: PortProbe,
    link: LinkHandle,
    clock: Arc<dyn Clock>,
    throttle: RetryThrottle,
    last_reports: Vec<ProbeReport>,
    attempts: u64,
    shutdown: Shutdown,
}

impl ConnectionManager {
    pub fn new(
        enumerator: Box<dyn PortEnumerator>,
        probe: PortProbe,
        link: LinkHandle,
        clock: Arc<dyn Clock>,
        reconnect_interval_ms: u64,
    ) -> Self {
        Self {
            enumerator,
            probe,
            link,
            clock,
            throttle: RetryThrottle::new(reconnect_interval_ms),
            last_reports: Vec::new(),
            attempts: 0,
            shutdown: Shutdown::new(),
        }
    }

    /// Abandon a selection between candidates once `shutdown` is triggered.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn link(&self) -> LinkHandle {
        self.link.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state.connection()
    }

    /// Reports from the most recent selection, in the order tried.
    pub fn last_reports(&self) -> &[ProbeReport] {
        &self.last_reports
    }

    /// Number of selections run so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Enumerate and probe: Bluetooth-serial candidates first, then the rest
    /// in enumeration order. Blocks for the duration of the probes.
    ///
    /// The fallback pass covers only the non-Bluetooth candidates; a Bluetooth
    /// port that failed the first pass is not probed again in the same attempt.
    pub fn connect(&mut self) -> ConnectionState {
        self.attempts += 1;
        self.last_reports.clear();
        self.link.state.set_connecting();

        let ports = list_or_empty(self.enumerator.as_ref());
        info!("searching for radar: {} candidate(s)", ports.len());
        for p in &ports {
            info!("  - {} ({})", p.system_name, p.description);
        }

        let (bluetooth, rest): (Vec<_>, Vec<_>) = ports.into_iter().partition(|p| p.is_bluetooth_serial());

        let chosen = self
            .select(&bluetooth, ProbePass::Bluetooth)
            .or_else(|| {
                if !rest.is_empty() {
                    info!("no bluetooth port connected, trying remaining ports");
                }
                self.select(&rest, ProbePass::Fallback)
            });

        let now = self.clock.now_ms();
        self.throttle.mark(now);

        match chosen {
            Some((port, link)) => {
                self.link.slot.install(link);
                self.link.state.set_connected(&port, now);
                info!("connected on {}", port);
                ConnectionState::Connected(port)
            }
            None if self.shutdown.is_triggered() => {
                self.link.state.set_disconnected();
                self.link.slot.close();
                info!("port search abandoned: shutting down");
                ConnectionState::Disconnected
            }
            None => {
                self.link.state.set_disconnected();
                self.link.slot.close();
                warn!(
                    "no live port found ({} probed); check the bridge is paired, powered and not held by another program",
                    self.last_reports.len()
                );
                ConnectionState::Disconnected
            }
        }
    }

    fn select(&mut self, candidates: &[PortDescriptor], pass: ProbePass) -> Option<(String, Box<dyn SerialLink>)> {
        for port in candidates {
            if self.shutdown.is_triggered() {
                return None;
            }
            debug!("probe: trying {} ({:?} pass)", port.system_name, pass);
            let start = self.clock.now_ms();
            let result = self.probe.try_connect(&self.link.slot, port);
            let elapsed_ms = self.clock.now_ms().saturating_sub(start);

            let (outcome, note) = match &result {
                Ok(_) => (ProbeOutcome::Live, "data detected".to_string()),
                Err(e) => {
                    warn!("probe failed: {}", e);
                    (e.outcome(), e.to_string())
                }
            };
            self.last_reports.push(ProbeReport {
                port: port.system_name.clone(),
                description: port.description.clone(),
                pass,
                outcome,
                elapsed_ms,
                note,
            });

            if let Ok(link) = result {
                return Some((port.system_name.clone(), link));
            }
        }
        None
    }

    /// While disconnected, run [`connect`](Self::connect) at most once per
    /// reconnect interval. Returns whether an attempt was made.
    pub fn retry_if_due(&mut self, now_ms: u64) -> bool {
        if self.link.state.connection() != ConnectionState::Disconnected {
            return false;
        }
        if !self.throttle.is_due(now_ms) {
            return false;
        }
        info!("attempting reconnection");
        self.connect();
        true
    }

    pub fn report_lost(&self, cause: LostCause) -> bool {
        self.link.report_lost(cause)
    }

    /// Final close at process exit.
    pub fn shutdown(&mut self) {
        self.link.state.set_disconnected();
        if self.link.slot.close() {
            info!("port closed");
        }
    }
}
