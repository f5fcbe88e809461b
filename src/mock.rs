//! In-memory stand-ins for the hardware capabilities, used by the unit and
//! integration tests.

use heapless::{String, Vec};

use crate::sensors::analog::AnalogInput;
use crate::sensors::dht::ClimateSensor;
use crate::sensors::onewire::TemperatureBus;
use crate::sensors::wifi::SignalStrength;
use crate::sensors::{BusAddress, SensorError};
use crate::upload::{HttpTransport, LinkStatus, TransportError, WifiMode, URI_CAPACITY};

/// Network link with directly settable state
#[derive(Debug, Clone)]
pub struct MockLink {
    pub mode: WifiMode,
    pub associated: bool,
    pub free_heap: usize,
    pub rssi: Option<i8>,
}

impl MockLink {
    /// Associated station with plenty of heap
    pub fn online() -> Self {
        Self {
            mode: WifiMode::Station,
            associated: true,
            free_heap: 32 * 1024,
            rssi: Some(-60),
        }
    }

    /// Only the configuration access point is up
    pub fn offline() -> Self {
        Self {
            mode: WifiMode::AccessPoint,
            associated: false,
            free_heap: 32 * 1024,
            rssi: None,
        }
    }
}

impl LinkStatus for MockLink {
    fn mode(&self) -> WifiMode {
        self.mode
    }

    fn is_associated(&self) -> bool {
        self.associated
    }

    fn free_heap(&self) -> usize {
        self.free_heap
    }
}

impl SignalStrength for MockLink {
    fn rssi(&mut self) -> Result<i8, SensorError> {
        self.rssi.ok_or(SensorError::Disconnected)
    }
}

/// Records every request URI; answers `status` unless `fail_with` is set
#[derive(Debug)]
pub struct MockTransport {
    pub requests: Vec<String<URI_CAPACITY>, 16>,
    pub status: u16,
    pub fail_with: Option<TransportError>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            status: 200,
            fail_with: None,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for MockTransport {
    fn post(&mut self, uri: &str) -> Result<u16, TransportError> {
        let mut request = String::new();
        request.push_str(uri).map_err(|_| TransportError::Io)?;
        let _ = self.requests.push(request);
        match self.fail_with {
            Some(e) => Err(e),
            None => Ok(self.status),
        }
    }
}

struct MockProbe {
    address: BusAddress,
    reading: Result<f32, SensorError>,
}

/// 1-Wire bus with a fixed device list in enumeration order
#[derive(Default)]
pub struct MockBus {
    devices: Vec<MockProbe, 16>,
    pub conversions: u32,
    pub resolution_set: u32,
    pub parasite: bool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, address: BusAddress, celsius: f32) {
        let _ = self.devices.push(MockProbe {
            address,
            reading: Ok(celsius),
        });
    }

    /// Change what a probe answers; unknown addresses are ignored
    pub fn set_reading(&mut self, address: BusAddress, reading: Result<f32, SensorError>) {
        if let Some(probe) = self.devices.iter_mut().find(|p| p.address == address) {
            probe.reading = reading;
        }
    }
}

impl TemperatureBus for MockBus {
    fn device_count(&mut self) -> usize {
        self.devices.len()
    }

    fn device_address(&mut self, index: usize) -> Option<BusAddress> {
        self.devices.get(index).map(|p| p.address)
    }

    fn set_resolution(&mut self, _address: &BusAddress, _bits: u8) {
        self.resolution_set += 1;
    }

    fn request_conversion(&mut self) {
        self.conversions += 1;
    }

    fn read_celsius(&mut self, address: &BusAddress) -> Result<f32, SensorError> {
        self.devices
            .iter()
            .find(|p| p.address.same_device(address))
            .map_or(Err(SensorError::Disconnected), |p| p.reading)
    }

    fn parasite_power(&mut self) -> bool {
        self.parasite
    }
}

pub struct MockClimate {
    pub temperature: Result<f32, SensorError>,
    pub humidity: Result<f32, SensorError>,
}

impl MockClimate {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature: Ok(temperature),
            humidity: Ok(humidity),
        }
    }
}

impl ClimateSensor for MockClimate {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.temperature
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        self.humidity
    }
}

pub struct MockAnalog {
    pub raw: Result<u16, SensorError>,
}

impl MockAnalog {
    pub fn new(raw: u16) -> Self {
        Self { raw: Ok(raw) }
    }
}

impl AnalogInput for MockAnalog {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        self.raw
    }
}
