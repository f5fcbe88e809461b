//! S0 pulse inputs of energy meters.
//!
//! Each meter pulse raises an edge interrupt. The interrupt handler only
//! touches its [`PulseLine`]: word-sized atomics written with plain stores,
//! so the main loop may read a slightly stale rate but never a torn one.
//! Everything else runs on the cooperative loop.

use core::fmt::Write;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_time::Duration;
use heapless::Vec;
use log::info;

use super::binding::{bind_persisted, table_name, TableLayout};
use super::{AddressText, BindError, DescribeSink, DeviceRecord, Driver, Setting};
use crate::config::ConfigError;
use crate::scheduler::{Cycle, Phase, SamplingScheduler, TickContext};
use crate::storage::{BlobStore, StorageError};

/// Rate reported for one pulse per second
pub const PULSE_SCALE: f32 = 1000.0;

pub const MAX_PULSE_INPUTS: usize = 2;

/// GPIOs wired to the S0 terminals with edge interrupts enabled
pub const INTERRUPT_PINS: [u8; 2] = [4, 5];

pub const SLEEP_PERIOD: Duration = Duration::from_secs(10);

const NAME: &str = "s0";

const LAYOUT: TableLayout = TableLayout {
    capacity: MAX_PULSE_INPUTS,
    address_len: 0,
};

// f32::NAN as raw bits
const NAN_BITS: u32 = 0x7FC0_0000;

/// State shared between one input's edge interrupt and the main loop
pub struct PulseLine {
    last_edge_ms: AtomicU32,
    events: AtomicU32,
    rate: AtomicU32,
}

impl PulseLine {
    pub const fn new() -> Self {
        Self {
            last_edge_ms: AtomicU32::new(0),
            events: AtomicU32::new(0),
            rate: AtomicU32::new(NAN_BITS),
        }
    }

    /// Edge handler, called from interrupt context with a millisecond
    /// timestamp. The first edge only seeds the timestamp.
    pub fn on_edge(&self, now_ms: u32) {
        let events = self.events.load(Ordering::Relaxed);
        if events > 0 {
            let interval = now_ms.wrapping_sub(self.last_edge_ms.load(Ordering::Relaxed));
            if interval > 0 {
                let rate = PULSE_SCALE * 1000.0 / interval as f32;
                self.rate.store(rate.to_bits(), Ordering::Relaxed);
            }
        }
        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
        self.events.store(events.wrapping_add(1), Ordering::Relaxed);
    }

    /// Current rate, NaN until two edges were seen
    pub fn rate(&self) -> f32 {
        f32::from_bits(self.rate.load(Ordering::Relaxed))
    }

    /// Edges seen since startup
    pub fn events(&self) -> u32 {
        self.events.load(Ordering::Relaxed)
    }
}

impl Default for PulseLine {
    fn default() -> Self {
        Self::new()
    }
}

struct PulseInput {
    pin: u8,
    line: &'static PulseLine,
}

pub struct PulseDriver {
    inputs: Vec<PulseInput, MAX_PULSE_INPUTS>,
    records: Vec<DeviceRecord, MAX_PULSE_INPUTS>,
    scheduler: SamplingScheduler,
}

impl PulseDriver {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            records: Vec::new(),
            scheduler: SamplingScheduler::new(SLEEP_PERIOD, Cycle::UploadOnly),
        }
    }

    pub fn with_sleep_period(mut self, period: Duration) -> Self {
        self.scheduler.set_sleep_period(period);
        self
    }

    /// Monitor `pin` through `line`. The caller attaches the edge interrupt
    /// that feeds `line`; only pins in [`INTERRUPT_PINS`] are wired for that.
    pub fn attach(&mut self, pin: u8, line: &'static PulseLine) -> Result<usize, ConfigError> {
        if !INTERRUPT_PINS.contains(&pin) {
            return Err(ConfigError::UnsupportedPin(pin));
        }
        if self.inputs.iter().any(|input| input.pin == pin) {
            return Err(ConfigError::DuplicatePin(pin));
        }
        self.inputs
            .push(PulseInput { pin, line })
            .map_err(|_| ConfigError::TooManyInputs)?;
        // records and inputs share capacity
        let _ = self.records.push(DeviceRecord::unaddressed());
        info!("[{}] monitoring gpio{}", NAME, pin);
        Ok(self.inputs.len() - 1)
    }

    /// Edges seen on an input
    pub fn events(&self, index: usize) -> Option<u32> {
        self.inputs.get(index).map(|input| input.line.events())
    }

    fn snapshot(&mut self) {
        for (record, input) in self.records.iter_mut().zip(self.inputs.iter()) {
            record.value = input.line.rate();
        }
    }
}

impl Default for PulseDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for PulseDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn sensor_count(&self) -> usize {
        self.inputs.len()
    }

    fn sensor_index(&self, address: &str) -> Option<usize> {
        let pin: u8 = address.strip_prefix("gpio")?.parse().ok()?;
        self.inputs.iter().position(|input| input.pin == pin)
    }

    fn address(&self, index: usize) -> Option<AddressText> {
        let input = self.inputs.get(index)?;
        let mut text = AddressText::new();
        write!(text, "gpio{}", input.pin).ok()?;
        Some(text)
    }

    fn bound_id(&self, index: usize) -> Option<&str> {
        self.records.get(index).map(|r| r.bound_id().as_str())
    }

    fn bind(&mut self, index: usize, id: &str, store: &mut dyn BlobStore) -> Result<(), BindError> {
        bind_persisted(&LAYOUT, &table_name(NAME), &mut self.records, index, id, store)
    }

    fn value(&self, index: usize) -> f32 {
        self.inputs.get(index).map_or(f32::NAN, |input| input.line.rate())
    }

    fn settings(&self, sink: &mut dyn DescribeSink) {
        sink.setting("interval", Setting::Int(self.scheduler.sleep_period().as_secs() as i64));
        sink.setting("scale", Setting::Float(PULSE_SCALE));
        let mut pins: heapless::String<16> = heapless::String::new();
        for (i, input) in self.inputs.iter().enumerate() {
            let sep = if i == 0 { "" } else { "," };
            let _ = write!(pins, "{}{}", sep, input.pin);
        }
        sink.setting("pins", Setting::Text(pins.as_str()));
    }

    fn tick(&mut self, ctx: &mut TickContext<'_, '_>) {
        if let Some(Phase::Uploading) = self.scheduler.poll(ctx.now, self.inputs.len()) {
            self.snapshot();
        }
        ctx.upload(NAME, &mut self.scheduler, &self.records);
    }

    fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    fn persist_bindings(&self, store: &mut dyn BlobStore) -> Result<(), StorageError> {
        LAYOUT.persist(&table_name(NAME), &self.records, store)
    }

    fn restore_bindings(&mut self, store: &mut dyn BlobStore) -> Result<bool, StorageError> {
        let records = &mut self.records;
        let mut slot = 0;
        LAYOUT.restore(&table_name(NAME), store, |_, id| {
            if let Some(record) = records.get_mut(slot) {
                record.restore_bound_id(id);
            }
            slot += 1;
        })
    }
}
