//! DS18x20 temperature probes on a shared 1-Wire bus.
//!
//! Probes are identified by ROM code. The binding table is restored before
//! the bus is scanned so a probe keeps its slot (and its bound id) even if the
//! bus enumerates devices in a different order after a power cycle.

use embassy_time::Duration;
use heapless::Vec;
use log::{info, warn};

use super::address::ROM_LEN;
use super::binding::{bind_persisted, table_name, TableLayout};
use super::{AddressText, BindError, BusAddress, DescribeSink, DeviceRecord, Driver, SensorError, Setting};
use crate::scheduler::{Cycle, Phase, SamplingScheduler, TickContext};
use crate::storage::{BlobStore, StorageError};

/// Slots in the binding table
pub const MAX_SENSORS: usize = 10;

/// Conversion resolution in bits
pub const TEMPERATURE_PRECISION: u8 = 9;

pub const SLEEP_PERIOD: Duration = Duration::from_secs(10);

/// Worst-case conversion time at any resolution
pub const CONVERSION_WAIT: Duration = Duration::from_secs(1);

/// Reading reported by DS18x20 libraries for a probe that did not answer
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;

const NAME: &str = "1wire";

const LAYOUT: TableLayout = TableLayout {
    capacity: MAX_SENSORS,
    address_len: ROM_LEN,
};

/// Temperature probes on an enumerable bus
pub trait TemperatureBus {
    /// Number of devices found by the last bus search
    fn device_count(&mut self) -> usize;

    fn device_address(&mut self, index: usize) -> Option<BusAddress>;

    fn set_resolution(&mut self, address: &BusAddress, bits: u8);

    /// Start a conversion on all probes and return immediately
    fn request_conversion(&mut self);

    /// Read the last conversion result in degrees Celsius
    fn read_celsius(&mut self, address: &BusAddress) -> Result<f32, SensorError>;

    fn parasite_power(&mut self) -> bool {
        false
    }
}

pub struct OneWireDriver<B> {
    bus: B,
    devices: Vec<DeviceRecord, MAX_SENSORS>,
    scheduler: SamplingScheduler,
}

impl<B: TemperatureBus> OneWireDriver<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            devices: Vec::new(),
            scheduler: SamplingScheduler::new(SLEEP_PERIOD, Cycle::Converting(CONVERSION_WAIT)),
        }
    }

    pub fn with_sleep_period(mut self, period: Duration) -> Self {
        self.scheduler.set_sleep_period(period);
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Startup sequence: restore known probes, scan the bus, and save the
    /// table if the scan found new probes. Storage problems are logged; the
    /// driver keeps working with whatever it discovered.
    pub fn start(&mut self, store: &mut dyn BlobStore) -> usize {
        match self.restore_bindings(store) {
            Ok(true) => info!("[{}] restored {} devices", NAME, self.devices.len()),
            Ok(false) => {}
            Err(e) => warn!("[{}] failed to read config: {}", NAME, e),
        }

        let added = self.discover();
        if added > 0 {
            if let Err(e) = self.persist_bindings(store) {
                warn!("[{}] failed to save config: {}", NAME, e);
            }
        }

        info!(
            "[{}] parasite power: {}",
            NAME,
            if self.bus.parasite_power() { "on" } else { "off" }
        );
        self.devices.len()
    }

    /// Scan the bus and add a slot for every unknown probe. Returns the
    /// number of probes added. All readings are reset.
    pub fn discover(&mut self) -> usize {
        let count = self.bus.device_count();
        info!("[{}] found {} devices", NAME, count);

        let mut added = 0;
        for i in 0..count {
            let Some(address) = self.bus.device_address(i) else {
                continue;
            };

            if self.index_of(&address).is_some() {
                info!("[{}] device: {} (known)", NAME, address);
            } else {
                info!("[{}] device: {} (new)", NAME, address);
                if self.add_sensor(address).is_some() {
                    added += 1;
                }
            }
            self.bus.set_resolution(&address, TEMPERATURE_PRECISION);
        }

        for device in self.devices.iter_mut() {
            device.value = f32::NAN;
        }
        added
    }

    fn index_of(&self, address: &BusAddress) -> Option<usize> {
        self.devices.iter().position(|d| d.address.same_device(address))
    }

    fn add_sensor(&mut self, address: BusAddress) -> Option<usize> {
        if self.devices.push(DeviceRecord::new(address)).is_err() {
            warn!("[{}] too many devices, ignoring {}", NAME, address);
            return None;
        }
        Some(self.devices.len() - 1)
    }

    fn read_temperatures(&mut self) {
        for device in self.devices.iter_mut() {
            device.value = match self.bus.read_celsius(&device.address) {
                Ok(celsius) if celsius != DEVICE_DISCONNECTED_C => celsius,
                Ok(_) => {
                    warn!("[{}] device {} disconnected", NAME, device.address);
                    f32::NAN
                }
                Err(e) => {
                    warn!("[{}] device {}: {}", NAME, device.address, e);
                    f32::NAN
                }
            };
        }
    }
}

impl<B: TemperatureBus> Driver for OneWireDriver<B> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn sensor_count(&self) -> usize {
        self.devices.len()
    }

    fn sensor_index(&self, address: &str) -> Option<usize> {
        let address = BusAddress::parse(address).ok()?;
        self.index_of(&address)
    }

    fn address(&self, index: usize) -> Option<AddressText> {
        self.devices.get(index).map(|d| d.address.to_text())
    }

    fn bound_id(&self, index: usize) -> Option<&str> {
        self.devices.get(index).map(|d| d.bound_id().as_str())
    }

    fn bind(&mut self, index: usize, id: &str, store: &mut dyn BlobStore) -> Result<(), BindError> {
        bind_persisted(&LAYOUT, &table_name(NAME), &mut self.devices, index, id, store)
    }

    fn value(&self, index: usize) -> f32 {
        self.devices.get(index).map_or(f32::NAN, |d| d.value)
    }

    fn settings(&self, sink: &mut dyn DescribeSink) {
        sink.setting("interval", Setting::Int(self.scheduler.sleep_period().as_secs() as i64));
        sink.setting("resolution", Setting::Int(TEMPERATURE_PRECISION as i64));
    }

    fn tick(&mut self, ctx: &mut TickContext<'_, '_>) {
        match self.scheduler.poll(ctx.now, self.devices.len()) {
            Some(Phase::Acquiring) => self.bus.request_conversion(),
            Some(Phase::Reading) => {
                self.read_temperatures();
                self.scheduler.readings_stored(ctx.now);
            }
            _ => {}
        }
        ctx.upload(NAME, &mut self.scheduler, &self.devices);
    }

    fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    fn persist_bindings(&self, store: &mut dyn BlobStore) -> Result<(), StorageError> {
        info!("[{}] saving config", NAME);
        LAYOUT.persist(&table_name(NAME), &self.devices, store)
    }

    fn restore_bindings(&mut self, store: &mut dyn BlobStore) -> Result<bool, StorageError> {
        let mut restored: Vec<DeviceRecord, MAX_SENSORS> = Vec::new();
        let found = LAYOUT.restore(&table_name(NAME), store, |address, id| {
            let mut record = DeviceRecord::new(address);
            record.restore_bound_id(id);
            let _ = restored.push(record);
        })?;
        if found {
            self.devices = restored;
        }
        Ok(found)
    }
}
