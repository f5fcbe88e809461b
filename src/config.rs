//! Gateway settings and startup configuration errors.

use core::fmt::Write;
use heapless::String;
use log::{info, warn};

use crate::storage::{load_blob, read_str_field, save_blob, write_str_field, BlobStore, StorageError};

/// Blob holding the persisted gateway settings
pub const CONFIG_FILE: &str = "/config";

pub const MIDDLEWARE_CAPACITY: usize = 128;
pub const HOSTNAME_CAPACITY: usize = 32;

// fields carry a NUL terminator
const MIDDLEWARE_FIELD: usize = MIDDLEWARE_CAPACITY + 1;
const HOSTNAME_FIELD: usize = HOSTNAME_CAPACITY + 1;
const CONFIG_BLOB: usize = MIDDLEWARE_FIELD + HOSTNAME_FIELD;

pub const DEFAULT_MIDDLEWARE: &str = match option_env!("VZERO_MIDDLEWARE") {
    Some(url) => url,
    None => "http://demo.volkszaehler.org/middleware.php",
};

pub const DEFAULT_HOSTNAME: &str = match option_env!("VZERO_HOSTNAME") {
    Some(name) => name,
    None => "vzero",
};

/// Startup configuration errors. Any of these aborts the boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Pin has no edge interrupt wiring
    UnsupportedPin(u8),
    /// Pin already attached
    DuplicatePin(u8),
    /// All pulse input slots are taken
    TooManyInputs,
    /// Middleware URL is not an `http://` URL or too long
    InvalidMiddleware,
    /// Hostname empty, too long or not `[A-Za-z0-9-]`
    InvalidHostname,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    middleware: String<MIDDLEWARE_CAPACITY>,
    hostname: String<HOSTNAME_CAPACITY>,
}

impl GatewayConfig {
    pub fn middleware(&self) -> &str {
        &self.middleware
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Set the upload base URL. A trailing slash is dropped; the empty
    /// string disables uploads.
    pub fn set_middleware(&mut self, url: &str) -> Result<(), ConfigError> {
        let url = url.trim().trim_end_matches('/');
        if !url.is_empty() && !(url.starts_with("http://") && url.len() > "http://".len()) {
            return Err(ConfigError::InvalidMiddleware);
        }
        let mut value = String::new();
        value.push_str(url).map_err(|_| ConfigError::InvalidMiddleware)?;
        self.middleware = value;
        Ok(())
    }

    pub fn set_hostname(&mut self, name: &str) -> Result<(), ConfigError> {
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(ConfigError::InvalidHostname);
        }
        let mut value = String::new();
        value.push_str(name).map_err(|_| ConfigError::InvalidHostname)?;
        self.hostname = value;
        Ok(())
    }

    /// Load the persisted settings, falling back to the build defaults for
    /// a missing blob or a field that no longer validates
    pub fn load(store: &mut dyn BlobStore) -> Self {
        let mut config = Self::default();
        let mut blob = [0u8; CONFIG_BLOB];

        match load_blob(store, CONFIG_FILE, &mut blob) {
            Ok(true) => {}
            Ok(false) => {
                info!("[config] no saved settings, using defaults");
                return config;
            }
            Err(e) => {
                warn!("[config] failed to read settings: {}", e);
                return config;
            }
        }

        let (middleware, hostname) = blob.split_at(MIDDLEWARE_FIELD);
        match read_str_field(middleware).map(|url| config.set_middleware(url)) {
            Some(Ok(())) => {}
            _ => warn!("[config] stored middleware invalid, using default"),
        }
        match read_str_field(hostname).map(|name| config.set_hostname(name)) {
            Some(Ok(())) => {}
            _ => warn!("[config] stored hostname invalid, using default"),
        }

        info!("[config] middleware: {}", config.middleware());
        config
    }

    pub fn save(&self, store: &mut dyn BlobStore) -> Result<(), StorageError> {
        let mut blob = [0u8; CONFIG_BLOB];
        let (middleware, hostname) = blob.split_at_mut(MIDDLEWARE_FIELD);
        write_str_field(middleware, &self.middleware);
        write_str_field(hostname, &self.hostname);
        save_blob(store, CONFIG_FILE, &blob)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut middleware = String::new();
        let _ = middleware.push_str(DEFAULT_MIDDLEWARE);
        let mut hostname = String::new();
        if hostname.push_str(DEFAULT_HOSTNAME).is_err() {
            let _ = write!(hostname, "vzero");
        }
        Self { middleware, hostname }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::UnsupportedPin(pin) => write!(f, "GPIO{} does not support edge interrupts", pin),
            ConfigError::DuplicatePin(pin) => write!(f, "GPIO{} already attached", pin),
            ConfigError::TooManyInputs => write!(f, "Too many pulse inputs"),
            ConfigError::InvalidMiddleware => write!(f, "Invalid middleware URL"),
            ConfigError::InvalidHostname => write!(f, "Invalid hostname"),
        }
    }
}
