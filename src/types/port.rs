//! Serial port descriptors reported by host enumeration.

use serde::Serialize;

/// A serial port found on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SerialPortDescriptor {
    /// Device path or name (e.g., "/dev/ttyACM0" or "COM6").
    #[serde(rename = "device")]
    pub name: String,
    /// USB vendor ID.
    #[serde(rename = "vid")]
    pub vendor_id: Option<u16>,
    /// USB product ID.
    #[serde(rename = "pid")]
    pub product_id: Option<u16>,
    /// Free-text description.
    pub description: Option<String>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
}

impl SerialPortDescriptor {
    /// Creates a descriptor with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl From<tokio_serial::SerialPortInfo> for SerialPortDescriptor {
    fn from(info: tokio_serial::SerialPortInfo) -> Self {
        match info.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vendor_id: Some(usb.vid),
                product_id: Some(usb.pid),
                description: usb.product,
                manufacturer: usb.manufacturer,
            },
            _ => Self::named(info.port_name),
        }
    }
}
