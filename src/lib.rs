//! Sensor gateway core: drivers for heterogeneous sensors, the cooperative
//! sampling and upload cycle, binding persistence and the web API surface.
//!
//! The crate is `no_std` and never reads the clock itself; the run loop
//! passes "now" into every tick.

#![cfg_attr(not(test), no_std)]

pub mod api;
pub mod config;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod scheduler;
pub mod sensors;
pub mod storage;
pub mod upload;

pub use config::{ConfigError, GatewayConfig};
pub use scheduler::{Phase, SamplingScheduler, TickContext};
pub use sensors::manager::{DriverRegistry, RegistryError, MAX_DRIVERS};
pub use sensors::{BindError, BusAddress, DeviceRecord, Driver, SensorError};
pub use storage::{BlobFile, BlobStore, StorageError};
pub use upload::{HttpTransport, LinkStatus, UploadClient, UploadError};
