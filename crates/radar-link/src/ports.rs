use anyhow::{Context, Result};
use serde::Serialize;
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::{debug, warn};

/// A serial endpoint the host offers, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub system_name: String,
    pub description: String,
}

impl PortDescriptor {
    pub fn new(system_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { system_name: system_name.into(), description: description.into() }
    }

    /// HC-05 style bridges show up as "Standard Serial over Bluetooth link" on
    /// Windows and similar elsewhere; both words must be present.
    pub fn is_bluetooth_serial(&self) -> bool {
        let d = self.description.to_lowercase();
        d.contains("bluetooth") && d.contains("serial")
    }
}

/// Source of connection candidates. Queried afresh on every connection attempt.
pub trait PortEnumerator: Send {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>>;
}

/// Enumerates the host's serial ports, or a single pinned port when configured.
#[derive(Debug, Clone, Default)]
pub struct SystemPorts {
    pinned: Option<String>,
}

impl SystemPorts {
    pub fn new(pinned: Option<String>) -> Self {
        Self { pinned }
    }
}

impl PortEnumerator for SystemPorts {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        if let Some(name) = &self.pinned {
            return Ok(vec![PortDescriptor::new(name.clone(), "Configured port")]);
        }
        let ports = tokio_serial::available_ports().context("enumerate serial ports")?;
        let out: Vec<PortDescriptor> = ports.iter().map(describe).collect();
        debug!("ports: {} candidate(s)", out.len());
        Ok(out)
    }
}

pub fn describe(info: &SerialPortInfo) -> PortDescriptor {
    let description = match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() { "USB Serial".to_string() } else { parts.join(" ") }
        }
        SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        SerialPortType::PciPort => "PCI Serial".to_string(),
        SerialPortType::Unknown => "Serial Port".to_string(),
    };
    PortDescriptor::new(info.port_name.clone(), description)
}

/// List candidates, treating an enumeration failure as "nothing available".
pub fn list_or_empty(enumerator: &dyn PortEnumerator) -> Vec<PortDescriptor> {
    match enumerator.list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("ports: enumeration failed: {:#}", e);
            Vec::new()
        }
    }
}
