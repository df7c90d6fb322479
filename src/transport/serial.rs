//! Serial/USB transport over `tokio-serial`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::transport::{PortProvider, SerialLink};
use crate::types::SerialPortDescriptor;

/// Host serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePorts;

impl PortProvider for NativePorts {
    fn available_ports(&self) -> Result<Vec<SerialPortDescriptor>> {
        let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
        Ok(ports.into_iter().map(SerialPortDescriptor::from).collect())
    }

    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>> {
        let stream = tokio_serial::new(port, baud_rate)
            .timeout(timeout)
            .open_native_async()
            .map_err(Error::Serial)?;
        Ok(Box::new(NativeSerialLink { stream, timeout }))
    }
}

/// An open host serial port.
pub struct NativeSerialLink {
    stream: SerialStream,
    timeout: Duration,
}

impl SerialLink for NativeSerialLink {
    fn clear_input(&mut self) -> Result<()> {
        self.stream.clear(ClearBuffer::Input).map_err(Error::Serial)
    }

    fn write_all<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            tracing::trace!("writing {} bytes: {}", data.len(), hex::encode(data));
            self.stream.write_all(data).await.map_err(Error::Io)?;
            self.stream.flush().await.map_err(Error::Io)?;
            Ok(())
        })
    }

    fn read_available(&mut self) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
        Box::pin(async move {
            let pending = self.stream.bytes_to_read().map_err(Error::Serial)?;
            let pending = usize::try_from(pending).unwrap_or(usize::MAX);
            if pending == 0 {
                return Ok(Bytes::new());
            }

            let mut buf = vec![0u8; pending];
            match tokio::time::timeout(self.timeout, self.stream.read_exact(&mut buf)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "serial read timed out",
                    )));
                }
            }

            tracing::trace!("read {} bytes: {}", buf.len(), hex::encode(&buf));
            Ok(Bytes::from(buf))
        })
    }
}

/// Lists available serial ports with their metadata.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<SerialPortDescriptor>> {
    NativePorts.available_ports()
}
