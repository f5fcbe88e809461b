use embassy_time::Instant;
use heapless::Vec;
use log::info;

use super::Driver;
use crate::scheduler::TickContext;
use crate::upload::{LinkStatus, UploadClient};

/// Most drivers one gateway runs
pub const MAX_DRIVERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry is at [`MAX_DRIVERS`]
    Full,
    /// A driver with this name is already registered
    Duplicate(&'static str),
}

/// Ordered set of active drivers.
///
/// Drivers are allocated by the startup code and only borrowed here.
/// Registration order is tick order and route order.
pub struct DriverRegistry<'a> {
    drivers: Vec<&'a mut dyn Driver, MAX_DRIVERS>,
}

impl<'a> DriverRegistry<'a> {
    pub const fn new() -> Self {
        Self { drivers: Vec::new() }
    }

    pub fn register(&mut self, driver: &'a mut dyn Driver) -> Result<(), RegistryError> {
        let name = driver.name();
        if self.drivers.is_full() {
            return Err(RegistryError::Full);
        }
        if self.drivers.iter().any(|d| d.name() == name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.drivers.push(driver).map_err(|_| RegistryError::Full)?;
        info!("[registry] {} registered", name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn Driver + 'a)> + '_ {
        self.drivers.iter().map(|d| &**d)
    }

    pub fn for_each(&self, mut f: impl FnMut(&dyn Driver)) {
        for driver in self.iter() {
            f(driver);
        }
    }

    pub fn get(&self, index: usize) -> Option<&dyn Driver> {
        self.drivers.get(index).map(|d| &**d as &dyn Driver)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Driver + 'a)> {
        self.drivers.get_mut(index).map(|d| &mut **d)
    }

    /// Look a driver up by name
    pub fn find(&self, name: &str) -> Option<&dyn Driver> {
        self.iter().find(|d| d.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut (dyn Driver + 'a)> {
        self.drivers
            .iter_mut()
            .find(|d| d.name() == name)
            .map(|d| &mut **d)
    }

    /// One run-loop iteration: tick every driver in registration order,
    /// sharing one upload slot between them
    pub fn tick_all(&mut self, now: Instant, link: &dyn LinkStatus, uploader: &mut UploadClient<'_>) {
        let mut ctx = TickContext::new(now, link, uploader);
        for driver in self.drivers.iter_mut() {
            driver.tick(&mut ctx);
        }
    }
}

impl Default for DriverRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::Full => write!(f, "Too many drivers (max {})", MAX_DRIVERS),
            RegistryError::Duplicate(name) => write!(f, "Driver {} registered twice", name),
        }
    }
}
