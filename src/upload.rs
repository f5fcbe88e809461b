//! Best-effort delivery of samples to the collection middleware.
//!
//! Each sample becomes one `POST {base}/data/{uuid}.json?value={v}` with an
//! empty body. Failed deliveries are logged and dropped; there is no retry
//! queue.

use core::fmt::Write;
use heapless::String;
use log::{info, warn};

/// Uploads wait until at least this much heap is free
pub const MIN_FREE_HEAP: usize = 4096;

/// Capacity of a request URI
pub const URI_CAPACITY: usize = 256;

/// Radio role of the network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    Off,
    Station,
    AccessPoint,
    StationAccessPoint,
}

impl WifiMode {
    pub fn has_station(self) -> bool {
        matches!(self, WifiMode::Station | WifiMode::StationAccessPoint)
    }
}

/// Network and memory conditions the upload gate looks at
pub trait LinkStatus {
    fn mode(&self) -> WifiMode;
    /// Station is associated with an access point and has an address
    fn is_associated(&self) -> bool;
    fn free_heap(&self) -> usize;
}

/// Reason an upload has to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBlocked {
    /// Only the local access point is up
    NoStation,
    NotAssociated,
    LowMemory(usize),
}

/// Upload safety gate: station role, associated, enough free heap
pub fn check_upload_safety(link: &dyn LinkStatus) -> Result<(), UploadBlocked> {
    if !link.mode().has_station() {
        return Err(UploadBlocked::NoStation);
    }
    if !link.is_associated() {
        return Err(UploadBlocked::NotAssociated);
    }
    let free = link.free_heap();
    if free < MIN_FREE_HEAP {
        return Err(UploadBlocked::LowMemory(free));
    }
    Ok(())
}

/// Transport-level failures (no HTTP status was received)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    ConnectionFailed,
    Timeout,
    Io,
    /// Client reported status 0
    NoStatus,
}

/// Synchronous HTTP client used for uploads.
///
/// `post` sends an empty-bodied POST, drains and discards any response body
/// and returns the HTTP status code.
pub trait HttpTransport {
    fn post(&mut self, uri: &str) -> Result<u16, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    /// No middleware URL configured
    NotConfigured,
    /// Request URI exceeds [`URI_CAPACITY`]
    UriTooLong,
    Transport(TransportError),
}

/// Counters kept by [`UploadClient`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub delivered: u32,
    pub failed: u32,
}

pub struct UploadClient<'a> {
    base: &'a str,
    transport: &'a mut dyn HttpTransport,
    stats: UploadStats,
}

impl<'a> UploadClient<'a> {
    pub fn new(base: &'a str, transport: &'a mut dyn HttpTransport) -> Self {
        Self {
            base,
            transport,
            stats: UploadStats::default(),
        }
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Build `{base}/data/{bound_id}.json?value={value}`. The value is
    /// rendered with two decimals, or `null` when it is not finite.
    pub fn request_uri(base: &str, bound_id: &str, value: f32) -> Result<String<URI_CAPACITY>, UploadError> {
        let mut uri = String::new();
        let result = if !value.is_finite() {
            write!(uri, "{}/data/{}.json?value=null", base, bound_id)
        } else {
            write!(uri, "{}/data/{}.json?value={:.2}", base, bound_id, value)
        };
        result.map_err(|_| UploadError::UriTooLong)?;
        Ok(uri)
    }

    /// Deliver one sample. Any positive HTTP status counts as delivered;
    /// transport failures are logged and reported but never retried.
    pub fn submit(&mut self, bound_id: &str, value: f32) -> Result<u16, UploadError> {
        if self.base.is_empty() {
            warn!("[upload] no middleware configured, dropping {}", bound_id);
            self.stats.failed += 1;
            return Err(UploadError::NotConfigured);
        }

        let uri = match Self::request_uri(self.base, bound_id, value) {
            Ok(uri) => uri,
            Err(e) => {
                self.stats.failed += 1;
                return Err(e);
            }
        };

        match self.transport.post(&uri).and_then(|status| match status {
            0 => Err(TransportError::NoStatus),
            status => Ok(status),
        }) {
            Ok(status) => {
                info!("[upload] {} {}", status, uri);
                self.stats.delivered += 1;
                Ok(status)
            }
            Err(e) => {
                warn!("[upload] failed ({}) {}", e, uri);
                self.stats.failed += 1;
                Err(UploadError::Transport(e))
            }
        }
    }
}

impl core::fmt::Display for UploadBlocked {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UploadBlocked::NoStation => write!(f, "station mode inactive"),
            UploadBlocked::NotAssociated => write!(f, "not associated"),
            UploadBlocked::LowMemory(free) => write!(f, "low memory ({} bytes free)", free),
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::ConnectionFailed => write!(f, "connection failed"),
            TransportError::Timeout => write!(f, "timeout"),
            TransportError::Io => write!(f, "I/O error"),
            TransportError::NoStatus => write!(f, "no status"),
        }
    }
}

impl core::fmt::Display for UploadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UploadError::NotConfigured => write!(f, "No middleware configured"),
            UploadError::UriTooLong => write!(f, "Request URI too long"),
            UploadError::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}
