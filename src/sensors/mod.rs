pub mod address;
pub mod analog;
pub mod binding;
pub mod dht;
pub mod fixed;
pub mod manager;
pub mod onewire;
pub mod s0;
pub mod wifi;

use heapless::String;

use crate::scheduler::{Phase, TickContext};
use crate::storage::{BlobStore, StorageError};
pub use address::{AddressText, BusAddress};

/// Length of a bound id (textual UUID)
pub const UUID_LENGTH: usize = 36;

/// Main driver trait that every sensor class implements.
///
/// A driver owns the device records for its sensors and is addressed by
/// sensor index (`0..sensor_count()`). All methods are cheap and never
/// block; `tick` is the only place a driver talks to its hardware on a
/// schedule.
pub trait Driver {
    /// Stable lowercase identifier, also the route prefix
    fn name(&self) -> &'static str;

    /// Number of sensors currently known
    fn sensor_count(&self) -> usize;

    /// Resolve a textual address to a sensor index
    fn sensor_index(&self, address: &str) -> Option<usize>;

    /// Textual address of a sensor
    fn address(&self, index: usize) -> Option<AddressText>;

    /// Bound id of a sensor; `Some("")` if the sensor is not bound
    fn bound_id(&self, index: usize) -> Option<&str>;

    /// Bind (or with an empty id, erase) the external identifier and persist
    /// the table immediately. Nothing changes when this returns an error.
    fn bind(&mut self, index: usize, id: &str, store: &mut dyn BlobStore) -> Result<(), BindError>;

    /// Last sampled value, NaN if unknown
    fn value(&self, index: usize) -> f32;

    /// Emit driver-specific settings
    fn settings(&self, sink: &mut dyn DescribeSink);

    /// Advance the sampling cycle by one non-blocking step
    fn tick(&mut self, ctx: &mut TickContext<'_, '_>);

    /// Current phase of the sampling cycle
    fn phase(&self) -> Phase;

    /// Save the address to bound id table
    fn persist_bindings(&self, store: &mut dyn BlobStore) -> Result<(), StorageError>;

    /// Load the address to bound id table. `Ok(false)` if nothing was stored.
    fn restore_bindings(&mut self, store: &mut dyn BlobStore) -> Result<bool, StorageError>;

    /// Emit the summary of one sensor
    fn describe_sensor(&self, index: usize, sink: &mut dyn DescribeSink) {
        if let Some(address) = self.address(index) {
            sink.sensor(&address, self.bound_id(index).unwrap_or(""), self.value(index));
        }
    }

    /// Emit settings followed by one entry per sensor. Safe at any time.
    fn describe(&self, sink: &mut dyn DescribeSink) {
        self.settings(sink);
        for index in 0..self.sensor_count() {
            self.describe_sensor(index, sink);
        }
    }
}

/// Scalar setting reported in a driver summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting<'a> {
    Int(i64),
    Float(f32),
    Text(&'a str),
}

/// Receiver for driver summaries (status documents, bind responses)
pub trait DescribeSink {
    fn setting(&mut self, key: &str, value: Setting<'_>);
    fn sensor(&mut self, address: &str, bound_id: &str, value: f32);
}

/// External identifier tying a device to a remote data stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundId(String<UUID_LENGTH>);

impl BoundId {
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Accepts the empty id or exactly [`UUID_LENGTH`] characters
    pub fn parse(id: &str) -> Result<Self, BindError> {
        if !id.is_empty() && id.len() != UUID_LENGTH {
            return Err(BindError::InvalidLength);
        }
        let mut value = String::new();
        value.push_str(id).map_err(|_| BindError::InvalidLength)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity and last value of one physical sensor
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub address: BusAddress,
    bound_id: BoundId,
    pub value: f32,
}

impl DeviceRecord {
    pub const fn new(address: BusAddress) -> Self {
        Self {
            address,
            bound_id: BoundId::empty(),
            value: f32::NAN,
        }
    }

    /// Record for a driver without addressable identity
    pub const fn unaddressed() -> Self {
        Self::new(BusAddress::EMPTY)
    }

    pub fn bound_id(&self) -> &BoundId {
        &self.bound_id
    }

    /// Restore a previously persisted id without the single-write check
    pub(crate) fn restore_bound_id(&mut self, id: BoundId) {
        self.bound_id = id;
    }

    /// Set-once binding: a non-empty id may only replace an empty one and
    /// an empty id erases any binding.
    pub fn bind(&mut self, id: &str) -> Result<(), BindError> {
        if id.is_empty() {
            self.bound_id = BoundId::empty();
            return Ok(());
        }
        if !self.bound_id.is_empty() {
            return Err(BindError::AlreadyBound);
        }
        self.bound_id = BoundId::parse(id)?;
        Ok(())
    }

    /// Value worth uploading: bound and a valid reading
    pub fn upload_candidate(&self) -> Option<(&str, f32)> {
        if self.bound_id.is_empty() || !self.value.is_finite() {
            None
        } else {
            Some((self.bound_id.as_str(), self.value))
        }
    }
}

/// Errors reported by hardware capabilities while sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Device did not answer
    Disconnected,
    /// Communication error on the bus (CRC, timing)
    CommunicationError,
    /// Received data outside the plausible range
    InvalidData,
    /// Conversion still in progress
    NotReady,
}

/// Rejected bind requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    /// No sensor with that index
    UnknownSensor,
    /// Id is neither empty nor 36 characters
    InvalidLength,
    /// Sensor already carries a different id; erase it first
    AlreadyBound,
    /// Binding table could not be saved
    Storage(StorageError),
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SensorError::Disconnected => write!(f, "Sensor disconnected"),
            SensorError::CommunicationError => write!(f, "Communication error"),
            SensorError::InvalidData => write!(f, "Invalid data received"),
            SensorError::NotReady => write!(f, "Conversion not finished"),
        }
    }
}

impl core::fmt::Display for BindError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BindError::UnknownSensor => write!(f, "Unknown sensor"),
            BindError::InvalidLength => write!(f, "Id must be {} characters", UUID_LENGTH),
            BindError::AlreadyBound => write!(f, "Sensor already bound"),
            BindError::Storage(e) => write!(f, "Failed to save bindings: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "6836dac0-8f5c-11e5-8f8f-6d2b8d3ba4e1";
    const ID_B: &str = "a0a47f10-8f5c-11e5-b1d2-2f6b3e7d1c0a";

    #[test]
    fn test_new_record_has_no_reading() {
        let record = DeviceRecord::unaddressed();
        assert!(record.value.is_nan());
        assert!(record.bound_id().is_empty());
        assert!(record.upload_candidate().is_none());
    }

    #[test]
    fn test_bind_is_single_write() {
        let mut record = DeviceRecord::unaddressed();
        assert_eq!(record.bind(ID_A), Ok(()));
        assert_eq!(record.bind(ID_B), Err(BindError::AlreadyBound));
        assert_eq!(record.bound_id().as_str(), ID_A);
    }

    #[test]
    fn test_erase_then_rebind() {
        let mut record = DeviceRecord::unaddressed();
        record.bind(ID_A).unwrap();
        assert_eq!(record.bind(""), Ok(()));
        assert!(record.bound_id().is_empty());
        assert_eq!(record.bind(ID_B), Ok(()));
        assert_eq!(record.bound_id().as_str(), ID_B);
    }

    #[test]
    fn test_bind_rejects_wrong_length() {
        let mut record = DeviceRecord::unaddressed();
        assert_eq!(record.bind("too-short"), Err(BindError::InvalidLength));
        assert_eq!(record.bind(&ID_A[..35]), Err(BindError::InvalidLength));
        let long = "6836dac0-8f5c-11e5-8f8f-6d2b8d3ba4e1x";
        assert_eq!(record.bind(long), Err(BindError::InvalidLength));
        assert!(record.bound_id().is_empty());
    }

    #[test]
    fn test_erase_unbound_is_noop() {
        let mut record = DeviceRecord::unaddressed();
        assert_eq!(record.bind(""), Ok(()));
        assert!(record.bound_id().is_empty());
        assert_eq!(record.bind(ID_A), Ok(()));
    }

    #[test]
    fn test_upload_candidate_requires_value() {
        let mut record = DeviceRecord::unaddressed();
        record.bind(ID_A).unwrap();
        assert!(record.upload_candidate().is_none());
        record.value = 21.5;
        assert_eq!(record.upload_candidate(), Some((ID_A, 21.5)));
        record.value = f32::INFINITY;
        assert!(record.upload_candidate().is_none());
    }
}
