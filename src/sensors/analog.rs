use embassy_time::Duration;

use super::fixed::{FixedDriver, Probe};
use super::{DescribeSink, SensorError, Setting};

/// Single ADC channel
pub trait AnalogInput {
    /// Raw conversion result; `Err(NotReady)` while a conversion is running
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

/// Probe reporting the `a0` input as a fraction of full scale
pub struct Analog<A> {
    input: A,
    full_scale: u16,
}

impl<A: AnalogInput> Analog<A> {
    pub fn new(input: A, full_scale: u16) -> Self {
        Self { input, full_scale }
    }
}

impl<A: AnalogInput> Probe for Analog<A> {
    const NAME: &'static str = "analog";
    const CHANNELS: &'static [&'static str] = &["a0"];
    const SLEEP_PERIOD: Duration = Duration::from_secs(10);

    fn sample(&mut self, _channel: usize) -> Result<f32, SensorError> {
        if self.full_scale == 0 {
            return Err(SensorError::InvalidData);
        }
        let raw = self.input.read_raw()?;
        Ok(raw as f32 / self.full_scale as f32)
    }

    fn settings(&self, sink: &mut dyn DescribeSink) {
        sink.setting("fullscale", Setting::Int(self.full_scale as i64));
    }
}

pub type AnalogDriver<A> = FixedDriver<Analog<A>>;

impl<A: AnalogInput> AnalogDriver<A> {
    pub fn analog(input: A, full_scale: u16) -> Self {
        FixedDriver::new(Analog::new(input, full_scale))
    }
}
