//! Web API surface generated from the driver registry.
//!
//! The HTTP engine stays outside the crate: it asks [`for_each_route`] which paths
//! to serve, forwards matching requests to [`handle_sensor_request`] and
//! serves [`write_plugins`] / [`write_status`] for the summary pages.
//!
//! ```text
//! GET  /api/{driver}/{address}            -> {"value":21.5}
//! GET  /api/{driver}/{address}?uuid=...   -> {"addr":..,"uuid":..,"value":..}
//! POST /api/{driver}/{address}  uuid=...  -> same as above
//! ```

use core::fmt::{self, Write};
use embassy_time::Duration;
use heapless::String;
use log::{info, warn};

use crate::config::GatewayConfig;
use crate::sensors::manager::DriverRegistry;
use crate::sensors::{DescribeSink, Driver, Setting};
use crate::storage::BlobStore;
use crate::upload::{LinkStatus, UploadStats, WifiMode};

pub const API_PREFIX: &str = "/api/";

/// Capacity of a route path: prefix, driver name, separator, address
pub const ROUTE_CAPACITY: usize = 48;

/// Capacity of a sensor response body
pub const RESPONSE_CAPACITY: usize = 256;

pub type RoutePath = String<ROUTE_CAPACITY>;

/// One sensor endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: RoutePath,
    /// Position of the driver in the registry
    pub driver: usize,
    pub sensor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String<RESPONSE_CAPACITY>,
}

impl ApiResponse {
    fn new(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    fn empty_object(status: u16) -> Self {
        let mut response = Self::new(status);
        let _ = response.body.push_str("{}");
        response
    }
}

/// `/api/{name}/{address}` for one sensor
pub fn route_path(driver: &dyn Driver, index: usize) -> Option<RoutePath> {
    let address = driver.address(index)?;
    let mut path = RoutePath::new();
    write!(path, "{}{}/{}", API_PREFIX, driver.name(), address).ok()?;
    Some(path)
}

/// Visit every sensor endpoint in registration order
pub fn for_each_route(registry: &DriverRegistry<'_>, mut visit: impl FnMut(&Route)) {
    for (d, driver) in registry.iter().enumerate() {
        for sensor in 0..driver.sensor_count() {
            if let Some(path) = route_path(driver, sensor) {
                visit(&Route {
                    path,
                    driver: d,
                    sensor,
                });
            }
        }
    }
}

fn resolve(registry: &DriverRegistry<'_>, path: &str) -> Option<(usize, usize)> {
    let (name, address) = path.strip_prefix(API_PREFIX)?.split_once('/')?;
    let (d, driver) = registry.iter().enumerate().find(|(_, d)| d.name() == name)?;
    Some((d, driver.sensor_index(address)?))
}

/// Serve a request for a sensor endpoint. Returns `None` if `path` is not
/// a sensor route or the method is neither GET nor POST, so the caller can
/// fall through to its other handlers.
pub fn handle_sensor_request(
    registry: &mut DriverRegistry<'_>,
    store: &mut dyn BlobStore,
    method: Method,
    path: &str,
    params: &[(&str, &str)],
) -> Option<ApiResponse> {
    if method == Method::Other {
        return None;
    }
    let (d, sensor) = resolve(registry, path)?;
    let driver = registry.get_mut(d)?;

    match (method, params) {
        (Method::Get, []) => {
            let value = driver.value(sensor);
            let mut response = ApiResponse::new(if value.is_nan() { 400 } else { 200 });
            Some(match write_value(&mut response.body, value) {
                Ok(()) => response,
                Err(_) => ApiResponse::new(500),
            })
        }
        (_, [("uuid", id)]) => match driver.bind(sensor, id, store) {
            Ok(()) => {
                info!("[api] {} bound to {}", path, id);
                let mut response = ApiResponse::new(200);
                let mut sink = SensorObject::new(&mut response.body);
                driver.describe_sensor(sensor, &mut sink);
                let result = sink.result;
                Some(match result {
                    Ok(()) => response,
                    Err(_) => ApiResponse::new(500),
                })
            }
            Err(e) => {
                warn!("[api] bind {} rejected: {}", path, e);
                Some(ApiResponse::empty_object(400))
            }
        },
        _ => Some(ApiResponse::empty_object(400)),
    }
}

/// Status summary: one object per driver with its settings and sensors
pub fn write_plugins(registry: &DriverRegistry<'_>, out: &mut impl Write) -> fmt::Result {
    out.write_char('[')?;
    for (i, driver) in registry.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        let mut sink = PluginObject::begin(&mut *out, driver.name())?;
        driver.describe(&mut sink);
        sink.finish()?;
    }
    out.write_char(']')
}

/// Gateway status document
pub fn write_status(
    out: &mut impl Write,
    config: &GatewayConfig,
    link: &dyn LinkStatus,
    uploads: UploadStats,
    uptime: Duration,
) -> fmt::Result {
    let mode = match link.mode() {
        WifiMode::Station | WifiMode::StationAccessPoint if link.is_associated() => "Connected",
        WifiMode::Off => "Off",
        _ => "Access Point",
    };
    write!(out, "{{\"uptime\":{},\"heap\":{},", uptime.as_millis(), link.free_heap())?;
    out.write_str("\"hostname\":")?;
    write_string(out, config.hostname())?;
    out.write_str(",\"middleware\":")?;
    write_string(out, config.middleware())?;
    out.write_str(",\"wifimode\":")?;
    write_string(out, mode)?;
    write!(
        out,
        ",\"uploads\":{{\"delivered\":{},\"failed\":{}}}}}",
        uploads.delivered, uploads.failed
    )
}

fn write_value(out: &mut impl Write, value: f32) -> fmt::Result {
    out.write_str("{\"value\":")?;
    write_number(out, value)?;
    out.write_char('}')
}

fn write_string(out: &mut impl Write, s: &str) -> fmt::Result {
    out.write_char('"')?;
    for ch in s.chars() {
        match ch {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if c < ' ' => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

// JSON has no NaN or infinity
fn write_number(out: &mut impl Write, value: f32) -> fmt::Result {
    if value.is_finite() {
        write!(out, "{}", value)
    } else {
        out.write_str("null")
    }
}

fn write_setting(out: &mut impl Write, value: Setting<'_>) -> fmt::Result {
    match value {
        Setting::Int(v) => write!(out, "{}", v),
        Setting::Float(v) => write_number(out, v),
        Setting::Text(v) => write_string(out, v),
    }
}

fn write_sensor(out: &mut impl Write, address: &str, bound_id: &str, value: f32) -> fmt::Result {
    out.write_str("{\"addr\":")?;
    write_string(out, address)?;
    out.write_str(",\"uuid\":")?;
    write_string(out, bound_id)?;
    out.write_str(",\"value\":")?;
    write_number(out, value)?;
    out.write_char('}')
}

/// Writes `{"name":..,"settings":{..},"sensors":[..]}` as `describe` runs
struct PluginObject<'w, W: Write> {
    out: &'w mut W,
    settings: usize,
    sensors: usize,
    result: fmt::Result,
}

impl<'w, W: Write> PluginObject<'w, W> {
    fn begin(out: &'w mut W, name: &str) -> Result<Self, fmt::Error> {
        out.write_str("{\"name\":")?;
        write_string(out, name)?;
        out.write_str(",\"settings\":{")?;
        Ok(Self {
            out,
            settings: 0,
            sensors: 0,
            result: Ok(()),
        })
    }

    fn close_settings(&mut self) -> fmt::Result {
        self.out.write_str("},\"sensors\":[")
    }

    fn write_setting_entry(&mut self, key: &str, value: Setting<'_>) -> fmt::Result {
        if self.settings > 0 {
            self.out.write_char(',')?;
        }
        write_string(self.out, key)?;
        self.out.write_char(':')?;
        write_setting(self.out, value)
    }

    fn write_sensor_entry(&mut self, address: &str, bound_id: &str, value: f32) -> fmt::Result {
        if self.sensors == 0 {
            self.close_settings()?;
        } else {
            self.out.write_char(',')?;
        }
        write_sensor(self.out, address, bound_id, value)
    }

    fn finish(mut self) -> fmt::Result {
        self.result?;
        if self.sensors == 0 {
            self.close_settings()?;
        }
        self.out.write_str("]}")
    }
}

impl<W: Write> DescribeSink for PluginObject<'_, W> {
    fn setting(&mut self, key: &str, value: Setting<'_>) {
        // settings after the first sensor would break the object
        if self.result.is_err() || self.sensors > 0 {
            return;
        }
        self.result = self.write_setting_entry(key, value);
        self.settings += 1;
    }

    fn sensor(&mut self, address: &str, bound_id: &str, value: f32) {
        if self.result.is_err() {
            return;
        }
        self.result = self.write_sensor_entry(address, bound_id, value);
        self.sensors += 1;
    }
}

/// Writes the single-sensor summary returned by a bind request
struct SensorObject<'w, W: Write> {
    out: &'w mut W,
    result: fmt::Result,
}

impl<'w, W: Write> SensorObject<'w, W> {
    fn new(out: &'w mut W) -> Self {
        Self { out, result: Ok(()) }
    }
}

impl<W: Write> DescribeSink for SensorObject<'_, W> {
    fn setting(&mut self, _key: &str, _value: Setting<'_>) {}

    fn sensor(&mut self, address: &str, bound_id: &str, value: f32) {
        self.result = write_sensor(self.out, address, bound_id, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAnalog, MockClimate, MockLink, MockTransport};
    use crate::sensors::analog::AnalogDriver;
    use crate::sensors::dht::DhtDriver;
    use crate::storage::MemoryStore;
    use crate::upload::UploadClient;
    use embassy_time::Instant;

    use std::string::String as StdString;
    use std::vec::Vec as StdVec;

    const ID: &str = "6836dac0-8f5c-11e5-8f8f-6d2b8d3ba4e1";

    type Store = MemoryStore<4, 128>;

    #[test]
    fn test_routes_follow_registration_order() {
        let mut analog = AnalogDriver::analog(MockAnalog::new(0), 1023);
        let mut dht = DhtDriver::dht(MockClimate::new(20.0, 50.0));
        let mut registry = DriverRegistry::new();
        registry.register(&mut analog).unwrap();
        registry.register(&mut dht).unwrap();

        let mut seen: StdVec<Route> = StdVec::new();
        for_each_route(&registry, |route| seen.push(route.clone()));
        let paths: StdVec<&str> = seen.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/api/analog/a0", "/api/dht/temp", "/api/dht/humidity"]);

        let last = seen.last().unwrap();
        assert_eq!((last.driver, last.sensor), (1, 1));
    }

    #[test]
    fn test_get_value() {
        let mut store = Store::new();
        let mut analog = AnalogDriver::analog(MockAnalog::new(512), 1024);
        let mut registry = DriverRegistry::new();
        registry.register(&mut analog).unwrap();

        let response = handle_sensor_request(&mut registry, &mut store, Method::Get, "/api/analog/a0", &[]).unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body.as_str(), "{\"value\":null}");

        let link = MockLink::offline();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        registry.tick_all(Instant::from_secs(10), &link, &mut uploader);

        let response = handle_sensor_request(&mut registry, &mut store, Method::Get, "/api/analog/a0", &[]).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_str(), "{\"value\":0.5}");
    }

    #[test]
    fn test_bind_request() {
        let mut store = Store::new();
        let mut dht = DhtDriver::dht(MockClimate::new(20.0, 50.0));
        let mut registry = DriverRegistry::new();
        registry.register(&mut dht).unwrap();

        let response =
            handle_sensor_request(&mut registry, &mut store, Method::Post, "/api/dht/humidity", &[("uuid", ID)]).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body.as_str(),
            "{\"addr\":\"humidity\",\"uuid\":\"6836dac0-8f5c-11e5-8f8f-6d2b8d3ba4e1\",\"value\":null}"
        );
        assert_eq!(registry.get(0).and_then(|d| d.bound_id(1)), Some(ID));

        // set-once: a second id is refused
        let other = "a0a47f10-8f5c-11e5-b1d2-2f6b3e7d1c0a";
        let response =
            handle_sensor_request(&mut registry, &mut store, Method::Get, "/api/dht/humidity", &[("uuid", other)]).unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body.as_str(), "{}");
        assert_eq!(registry.get(0).and_then(|d| d.bound_id(1)), Some(ID));
    }

    #[test]
    fn test_erase_unbound_sensor() {
        let mut store = Store::new();
        let mut dht = DhtDriver::dht(MockClimate::new(20.0, 50.0));
        let mut registry = DriverRegistry::new();
        registry.register(&mut dht).unwrap();

        let response =
            handle_sensor_request(&mut registry, &mut store, Method::Post, "/api/dht/temp", &[("uuid", "")]).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.contains("\"uuid\":\"\""));
        assert_eq!(registry.get(0).and_then(|d| d.bound_id(0)), Some(""));
    }

    #[test]
    fn test_malformed_requests() {
        let mut store = Store::new();
        let mut dht = DhtDriver::dht(MockClimate::new(20.0, 50.0));
        let mut registry = DriverRegistry::new();
        registry.register(&mut dht).unwrap();

        let bad_length = handle_sensor_request(&mut registry, &mut store, Method::Post, "/api/dht/temp", &[("uuid", "x")]);
        assert_eq!(bad_length.map(|r| r.status), Some(400));

        let two_params = [("uuid", ID), ("force", "1")];
        let response = handle_sensor_request(&mut registry, &mut store, Method::Get, "/api/dht/temp", &two_params);
        assert_eq!(response.map(|r| r.status), Some(400));

        let wrong_param = handle_sensor_request(&mut registry, &mut store, Method::Post, "/api/dht/temp", &[("id", ID)]);
        assert_eq!(wrong_param.map(|r| r.status), Some(400));

        assert!(handle_sensor_request(&mut registry, &mut store, Method::Other, "/api/dht/temp", &[]).is_none());
        assert!(handle_sensor_request(&mut registry, &mut store, Method::Get, "/api/dht/pressure", &[]).is_none());
        assert!(handle_sensor_request(&mut registry, &mut store, Method::Get, "/api/s0/gpio4", &[]).is_none());
        assert!(handle_sensor_request(&mut registry, &mut store, Method::Get, "/index.html", &[]).is_none());
        assert_eq!(registry.get(0).and_then(|d| d.bound_id(0)), Some(""));
    }

    #[test]
    fn test_plugins_document() {
        let mut store = Store::new();
        let mut analog = AnalogDriver::analog(MockAnalog::new(0), 1023);
        let mut registry = DriverRegistry::new();
        registry.register(&mut analog).unwrap();
        registry.get_mut(0).unwrap().bind(0, ID, &mut store).unwrap();

        let mut out = StdString::new();
        write_plugins(&registry, &mut out).unwrap();
        assert_eq!(
            out,
            "[{\"name\":\"analog\",\"settings\":{\"interval\":10,\"fullscale\":1023},\
             \"sensors\":[{\"addr\":\"a0\",\"uuid\":\"6836dac0-8f5c-11e5-8f8f-6d2b8d3ba4e1\",\"value\":null}]}]"
        );
    }

    #[test]
    fn test_empty_registry_document() {
        let registry = DriverRegistry::new();
        let mut out = StdString::new();
        write_plugins(&registry, &mut out).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_string_escaping() {
        let mut out = StdString::new();
        write_string(&mut out, "a\"b\\c\nd\u{1}").unwrap();
        assert_eq!(out, "\"a\\\"b\\\\c\\nd\\u0001\"");
    }

    #[test]
    fn test_status_document() {
        let config = GatewayConfig::default();
        let link = MockLink::online();
        let stats = UploadStats { delivered: 3, failed: 1 };
        let mut out = StdString::new();
        write_status(&mut out, &config, &link, stats, Duration::from_secs(2)).unwrap();
        assert!(out.starts_with("{\"uptime\":2000,\"heap\":32768,"));
        assert!(out.contains("\"wifimode\":\"Connected\""));
        assert!(out.ends_with("\"uploads\":{\"delivered\":3,\"failed\":1}}"));
    }

    #[test]
    fn test_small_buffer_reports_error() {
        let mut analog = AnalogDriver::analog(MockAnalog::new(0), 1023);
        let mut registry = DriverRegistry::new();
        registry.register(&mut analog).unwrap();
        let mut out: String<16> = String::new();
        assert!(write_plugins(&registry, &mut out).is_err());
    }
}
