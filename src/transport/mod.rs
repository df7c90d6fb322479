//! Transport seams for device I/O.
//!
//! Sessions talk to the outside world only through these traits, so the
//! connection logic can run against the real serial ports, HTTP stack and
//! host interfaces, or against scripted fakes.

pub mod http;
pub mod interfaces;
pub mod serial;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::types::SerialPortDescriptor;

/// An open serial handle.
pub trait SerialLink: Send {
    /// Discards input that has been received but not read.
    fn clear_input(&mut self) -> Result<()>;

    /// Writes all of `data` and flushes it.
    fn write_all<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Reads every byte currently buffered, possibly none.
    fn read_available(&mut self) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>>;
}

/// Enumerates and opens serial ports.
pub trait PortProvider: Send + Sync {
    /// Lists the ports present on the host.
    fn available_ports(&self) -> Result<Vec<SerialPortDescriptor>>;

    /// Opens `port` at the given baud rate and timeout.
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>>;
}

pub use http::{HttpBackend, HttpReply, HttpRequest, ReqwestBackend};
pub use interfaces::{InterfaceSource, SystemInterfaces};
pub use serial::{NativePorts, NativeSerialLink};
