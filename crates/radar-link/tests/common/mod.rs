#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use radar_link::{
    Clock, ConnectionManager, LinkConfig, ManualClock, PortDescriptor, PortEnumerator, PortOpener, ReadError,
    SerialLink, SerialSettings, Shutdown,
};

/// What a scripted device does once opened.
#[derive(Debug, Default)]
pub struct Device {
    pub openable: bool,
    /// Keeps refilling its output with `chatter` whenever it runs dry.
    pub talking: bool,
    pub chatter: Vec<u8>,
    pub pending: Vec<u8>,
    pub ended: bool,
    pub opens: usize,
}

pub type DeviceHandle = Arc<Mutex<Device>>;

#[derive(Default)]
pub struct Counters {
    pub open_now: AtomicUsize,
    pub max_open: AtomicUsize,
    pub closes: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct Bench {
    pub devices: Arc<Mutex<HashMap<String, DeviceHandle>>>,
    pub ports: Arc<Mutex<Vec<PortDescriptor>>>,
    pub list_calls: Arc<AtomicUsize>,
    pub counters: Arc<Counters>,
}

impl Bench {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, name: &str, description: &str, device: Device) -> DeviceHandle {
        let handle = Arc::new(Mutex::new(device));
        self.devices.lock().insert(name.to_string(), handle.clone());
        self.ports.lock().push(PortDescriptor::new(name, description));
        handle
    }

    /// A port that opens and streams `90,45.` forever.
    pub fn live(&self, name: &str, description: &str) -> DeviceHandle {
        self.add(name, description, Device { openable: true, talking: true, chatter: b"90,45.".to_vec(), ..Device::default() })
    }

    /// A port that opens but never sends anything.
    pub fn quiet(&self, name: &str, description: &str) -> DeviceHandle {
        self.add(name, description, Device { openable: true, ..Device::default() })
    }

    /// A port the driver refuses to open.
    pub fn broken(&self, name: &str, description: &str) -> DeviceHandle {
        self.add(name, description, Device::default())
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn manager(&self, cfg: &LinkConfig, clock: Arc<dyn Clock>) -> ConnectionManager {
        cfg.manager(Box::new(self.clone()), Box::new(self.clone()), clock)
    }
}

impl PortEnumerator for Bench {
    fn list_ports(&self) -> anyhow::Result<Vec<PortDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ports.lock().clone())
    }
}

impl PortOpener for Bench {
    fn open(&self, port: &PortDescriptor, _settings: &SerialSettings) -> io::Result<Box<dyn SerialLink>> {
        let device = self
            .devices
            .lock()
            .get(&port.system_name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such port"))?;
        {
            let mut d = device.lock();
            if !d.openable {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"));
            }
            d.opens += 1;
        }
        let now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeLink { name: port.system_name.clone(), device, counters: self.counters.clone() }))
    }
}

pub struct FakeLink {
    name: String,
    device: DeviceHandle,
    counters: Arc<Counters>,
}

impl SerialLink for FakeLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> Result<usize, ReadError> {
        let mut d = self.device.lock();
        if d.ended {
            return Err(ReadError::StreamEnded);
        }
        if d.pending.is_empty() && d.talking {
            let chatter = d.chatter.clone();
            d.pending.extend_from_slice(&chatter);
        }
        Ok(d.pending.len())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let mut d = self.device.lock();
        if d.ended {
            return Err(ReadError::StreamEnded);
        }
        let n = buf.len().min(d.pending.len());
        buf[..n].copy_from_slice(&d.pending[..n]);
        d.pending.drain(..n);
        Ok(n)
    }

    fn discard_input(&mut self) -> Result<(), ReadError> {
        self.device.lock().pending.clear();
        Ok(())
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn manual_clock() -> (Arc<ManualClock>, Arc<dyn Clock>) {
    let clock = Arc::new(ManualClock::new(0));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (clock, dyn_clock)
}

/// Simulated clock that triggers `shutdown` once time reaches `at_ms`.
pub struct TripClock {
    pub inner: ManualClock,
    pub shutdown: Shutdown,
    pub at_ms: u64,
}

impl Clock for TripClock {
    fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    fn sleep(&self, d: Duration) {
        self.inner.sleep(d);
        if self.inner.now_ms() >= self.at_ms {
            self.shutdown.trigger();
        }
    }
}

pub fn trip_clock(shutdown: &Shutdown, at_ms: u64) -> (Arc<TripClock>, Arc<dyn Clock>) {
    let clock = Arc::new(TripClock { inner: ManualClock::new(0), shutdown: shutdown.clone(), at_ms });
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (clock, dyn_clock)
}
