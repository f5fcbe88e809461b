use embassy_time::Duration;

use super::fixed::{FixedDriver, Probe};
use super::SensorError;

/// Received signal strength of the station link
pub trait SignalStrength {
    /// RSSI in dBm; `Err(Disconnected)` while not associated
    fn rssi(&mut self) -> Result<i8, SensorError>;
}

/// Probe exposing the radio link quality as `wlan`
pub struct Wifi<S>(pub S);

impl<S: SignalStrength> Probe for Wifi<S> {
    const NAME: &'static str = "wifi";
    const CHANNELS: &'static [&'static str] = &["wlan"];
    const SLEEP_PERIOD: Duration = Duration::from_secs(10);

    fn sample(&mut self, _channel: usize) -> Result<f32, SensorError> {
        Ok(self.0.rssi()? as f32)
    }
}

pub type WifiDriver<S> = FixedDriver<Wifi<S>>;

impl<S: SignalStrength> WifiDriver<S> {
    pub fn wifi(signal: S) -> Self {
        FixedDriver::new(Wifi(signal))
    }
}
