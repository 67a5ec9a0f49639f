use std::io::{self, Read};
use std::time::Duration;

use thiserror::Error;
use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::ports::PortDescriptor;

#[derive(Debug, Error)]
pub enum ReadError {
    /// The device or bridge went away (EOF on the port).
    #[error("stream ended")]
    StreamEnded,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// An open byte source. Dropping it closes the underlying port.
pub trait SerialLink: Send {
    fn name(&self) -> &str;

    /// Bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize, ReadError>;

    /// Read into `buf`. `Ok(0)` means nothing arrived within the read timeout.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ReadError>;

    /// Throw away whatever the driver buffered before we attached.
    fn discard_input(&mut self) -> Result<(), ReadError>;
}

/// Line settings used for every candidate. 8N1 and no flow control are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud: u32,
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self { baud: 9600, read_timeout: Duration::from_millis(1000) }
    }
}

/// Opens a candidate. Implemented over the host serial driver, and by fakes in tests.
pub trait PortOpener: Send {
    fn open(&self, port: &PortDescriptor, settings: &SerialSettings) -> io::Result<Box<dyn SerialLink>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl PortOpener for SystemOpener {
    fn open(&self, port: &PortDescriptor, settings: &SerialSettings) -> io::Result<Box<dyn SerialLink>> {
        let inner = tokio_serial::new(port.system_name.as_str(), settings.baud)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()?;
        debug!("link: opened {} @ {}", port.system_name, settings.baud);
        Ok(Box::new(SerialPortLink { name: port.system_name.clone(), inner }))
    }
}

pub struct SerialPortLink {
    name: String,
    inner: Box<dyn SerialPort>,
}

impl SerialLink for SerialPortLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> Result<usize, ReadError> {
        Ok(self.inner.bytes_to_read().map_err(io::Error::from)? as usize)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        match self.inner.read(buf) {
            Ok(0) => Err(ReadError::StreamEnded),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Err(ReadError::StreamEnded),
            Err(e) => Err(ReadError::Io(e)),
        }
    }

    fn discard_input(&mut self) -> Result<(), ReadError> {
        self.inner.clear(ClearBuffer::Input).map_err(io::Error::from)?;
        Ok(())
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        debug!("link: closed {}", self.name);
    }
}
