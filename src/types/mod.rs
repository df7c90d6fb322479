//! Data types shared by the sessions and their callers.

pub mod api;
pub mod monitor;
pub mod port;
pub mod status;

pub use api::{ApiError, ApiErrorKind, ApiResult, CallerContext};
pub use monitor::{MonitorInfo, MonitorRaw};
pub use port::SerialPortDescriptor;
pub use status::{DeviceStatus, NetworkDiagnostics};
