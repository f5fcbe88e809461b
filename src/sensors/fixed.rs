//! Drivers with a fixed set of channels and no bus enumeration.
//!
//! A [`Probe`] knows how to sample its channels; [`FixedDriver`] adds the
//! records, the binding table and the Idle -> Reading -> Uploading cycle.

use embassy_time::Duration;
use heapless::Vec;
use log::warn;

use super::binding::{bind_persisted, table_name, TableLayout};
use super::{AddressText, BindError, DescribeSink, DeviceRecord, Driver, SensorError, Setting};
use crate::scheduler::{Cycle, Phase, SamplingScheduler, TickContext};
use crate::storage::{BlobStore, StorageError};

/// Most channels a fixed driver exposes
pub const MAX_CHANNELS: usize = 2;

pub trait Probe {
    /// Driver name and route prefix
    const NAME: &'static str;
    /// Address of each channel, in index order
    const CHANNELS: &'static [&'static str];
    const SLEEP_PERIOD: Duration;

    fn sample(&mut self, channel: usize) -> Result<f32, SensorError>;

    /// Extra settings reported next to the interval
    fn settings(&self, _sink: &mut dyn DescribeSink) {}
}

pub struct FixedDriver<P: Probe> {
    probe: P,
    records: Vec<DeviceRecord, MAX_CHANNELS>,
    scheduler: SamplingScheduler,
}

impl<P: Probe> FixedDriver<P> {
    const LAYOUT: TableLayout = TableLayout {
        capacity: MAX_CHANNELS,
        address_len: 0,
    };

    pub fn new(probe: P) -> Self {
        let mut records = Vec::new();
        for _ in P::CHANNELS.iter().take(MAX_CHANNELS) {
            let _ = records.push(DeviceRecord::unaddressed());
        }

        Self {
            probe,
            records,
            scheduler: SamplingScheduler::new(P::SLEEP_PERIOD, Cycle::Direct),
        }
    }

    pub fn with_sleep_period(mut self, period: Duration) -> Self {
        self.scheduler.set_sleep_period(period);
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    fn read_channels(&mut self) {
        for (channel, record) in self.records.iter_mut().enumerate() {
            record.value = match self.probe.sample(channel) {
                Ok(value) => value,
                Err(e) => {
                    warn!("[{}] {} read failed: {}", P::NAME, P::CHANNELS[channel], e);
                    f32::NAN
                }
            };
        }
    }
}

impl<P: Probe> Driver for FixedDriver<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn sensor_count(&self) -> usize {
        self.records.len()
    }

    fn sensor_index(&self, address: &str) -> Option<usize> {
        P::CHANNELS
            .iter()
            .take(self.records.len())
            .position(|channel| *channel == address)
    }

    fn address(&self, index: usize) -> Option<AddressText> {
        if index >= self.records.len() {
            return None;
        }
        let mut text = AddressText::new();
        text.push_str(P::CHANNELS[index]).ok()?;
        Some(text)
    }

    fn bound_id(&self, index: usize) -> Option<&str> {
        self.records.get(index).map(|r| r.bound_id().as_str())
    }

    fn bind(&mut self, index: usize, id: &str, store: &mut dyn BlobStore) -> Result<(), BindError> {
        bind_persisted(&Self::LAYOUT, &table_name(P::NAME), &mut self.records, index, id, store)
    }

    fn value(&self, index: usize) -> f32 {
        self.records.get(index).map_or(f32::NAN, |r| r.value)
    }

    fn settings(&self, sink: &mut dyn DescribeSink) {
        sink.setting("interval", Setting::Int(self.scheduler.sleep_period().as_secs() as i64));
        self.probe.settings(sink);
    }

    fn tick(&mut self, ctx: &mut TickContext<'_, '_>) {
        if let Some(Phase::Reading) = self.scheduler.poll(ctx.now, self.records.len()) {
            self.read_channels();
            self.scheduler.readings_stored(ctx.now);
        }
        ctx.upload(P::NAME, &mut self.scheduler, &self.records);
    }

    fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    fn persist_bindings(&self, store: &mut dyn BlobStore) -> Result<(), StorageError> {
        Self::LAYOUT.persist(&table_name(P::NAME), &self.records, store)
    }

    fn restore_bindings(&mut self, store: &mut dyn BlobStore) -> Result<bool, StorageError> {
        let records = &mut self.records;
        let mut slot = 0;
        Self::LAYOUT.restore(&table_name(P::NAME), store, |_, id| {
            if let Some(record) = records.get_mut(slot) {
                record.restore_bound_id(id);
            }
            slot += 1;
        })
    }
}
