use embassy_time::Duration;

use super::fixed::{FixedDriver, Probe};
use super::SensorError;

/// Combined temperature/humidity sensor (DHT11/DHT22 family)
pub trait ClimateSensor {
    /// Degrees Celsius
    fn read_temperature(&mut self) -> Result<f32, SensorError>;
    /// Relative humidity in percent
    fn read_humidity(&mut self) -> Result<f32, SensorError>;
}

/// Probe exposing the `temp` and `humidity` channels
pub struct Dht<S>(pub S);

impl<S: ClimateSensor> Probe for Dht<S> {
    const NAME: &'static str = "dht";
    const CHANNELS: &'static [&'static str] = &["temp", "humidity"];
    // minimum conversion spacing is 2 s
    const SLEEP_PERIOD: Duration = Duration::from_secs(60);

    fn sample(&mut self, channel: usize) -> Result<f32, SensorError> {
        let value = match channel {
            0 => self.0.read_temperature()?,
            _ => self.0.read_humidity()?,
        };
        if value.is_nan() {
            return Err(SensorError::InvalidData);
        }
        Ok(value)
    }
}

pub type DhtDriver<S> = FixedDriver<Dht<S>>;

impl<S: ClimateSensor> DhtDriver<S> {
    pub fn dht(sensor: S) -> Self {
        FixedDriver::new(Dht(sensor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClimate, MockLink, MockTransport};
    use crate::scheduler::{Phase, TickContext};
    use crate::sensors::Driver;
    use crate::upload::UploadClient;
    use embassy_time::Instant;

    #[test]
    fn test_channels() {
        let driver = DhtDriver::dht(MockClimate::new(21.0, 45.0));
        assert_eq!(driver.name(), "dht");
        assert_eq!(driver.sensor_count(), 2);
        assert_eq!(driver.sensor_index("temp"), Some(0));
        assert_eq!(driver.sensor_index("humidity"), Some(1));
        assert_eq!(driver.sensor_index("pressure"), None);
        assert_eq!(driver.address(1).as_deref(), Some("humidity"));
        assert_eq!(driver.address(2), None);
    }

    #[test]
    fn test_reading_fills_both_channels() {
        let link = MockLink::offline();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut driver = DhtDriver::dht(MockClimate::new(21.5, 40.0));

        let mut ctx = TickContext::new(Instant::from_secs(60), &link, &mut uploader);
        driver.tick(&mut ctx);
        assert_eq!(driver.phase(), Phase::Uploading);
        assert_eq!(driver.value(0), 21.5);
        assert_eq!(driver.value(1), 40.0);
    }

    #[test]
    fn test_failed_humidity_read_is_nan() {
        let link = MockLink::offline();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut sensor = MockClimate::new(21.5, 40.0);
        sensor.humidity = Err(SensorError::CommunicationError);
        let mut driver = DhtDriver::dht(sensor);

        let mut ctx = TickContext::new(Instant::from_secs(60), &link, &mut uploader);
        driver.tick(&mut ctx);
        assert_eq!(driver.value(0), 21.5);
        assert!(driver.value(1).is_nan());
    }
}
