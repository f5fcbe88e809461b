//! Binding table codec shared by all drivers.
//!
//! A table is a contiguous array of `capacity` records, each
//! `{address[address_len], bound_id[37]}` with a NUL-terminated id. Unused
//! slots are zero-filled. There is no header and no checksum; a blob of the
//! wrong size is treated as absent.

use core::fmt::Write;
use heapless::String;

use super::{BindError, BoundId, BusAddress, DeviceRecord};
use crate::storage::{load_blob, read_str_field, save_blob, write_str_field, BlobStore, StorageError, BOUND_ID_FIELD};

/// Largest table blob any driver uses
pub const MAX_TABLE_BLOB: usize = 512;

/// Blob name of a driver's binding table
pub type TableName = String<24>;

pub fn table_name(driver: &str) -> TableName {
    let mut name = TableName::new();
    let _ = write!(name, "/{}.config", driver);
    name
}

#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    pub capacity: usize,
    /// 8 for bus ROM codes, 0 for drivers without addressable devices
    pub address_len: usize,
}

impl TableLayout {
    pub const fn record_len(&self) -> usize {
        self.address_len + BOUND_ID_FIELD
    }

    pub const fn blob_len(&self) -> usize {
        self.capacity * self.record_len()
    }

    /// Write every record (and zero-filled spare slots) to the store
    pub fn persist(&self, name: &str, records: &[DeviceRecord], store: &mut dyn BlobStore) -> Result<(), StorageError> {
        let mut blob = [0u8; MAX_TABLE_BLOB];
        let len = self.blob_len();
        debug_assert!(len <= MAX_TABLE_BLOB);

        for (record, chunk) in records.iter().zip(blob[..len].chunks_mut(self.record_len())) {
            let (addr, id) = chunk.split_at_mut(self.address_len);
            addr.copy_from_slice(&record.address.as_bytes()[..self.address_len]);
            write_str_field(id, record.bound_id().as_str());
        }

        save_blob(store, name, &blob[..len])
    }

    /// Read the table and hand each stored slot to `restore` in order.
    ///
    /// For addressed layouts the first all-zero address ends the table.
    /// Slots with an unreadable id are restored unbound.
    pub fn restore(
        &self,
        name: &str,
        store: &mut dyn BlobStore,
        mut restore: impl FnMut(BusAddress, BoundId),
    ) -> Result<bool, StorageError> {
        let mut blob = [0u8; MAX_TABLE_BLOB];
        let len = self.blob_len();
        if !load_blob(store, name, &mut blob[..len])? {
            return Ok(false);
        }

        for chunk in blob[..len].chunks(self.record_len()) {
            let (addr, id) = chunk.split_at(self.address_len);
            let mut address = BusAddress::EMPTY;
            address.0[..self.address_len].copy_from_slice(addr);
            if self.address_len > 0 && address.is_empty() {
                break;
            }
            let bound = read_str_field(id)
                .and_then(|text| BoundId::parse(text).ok())
                .unwrap_or_default();
            restore(address, bound);
        }
        Ok(true)
    }
}

/// Bind `records[index]` and persist the whole table, rolling the record
/// back if the save fails
pub fn bind_persisted(
    layout: &TableLayout,
    name: &str,
    records: &mut [DeviceRecord],
    index: usize,
    id: &str,
    store: &mut dyn BlobStore,
) -> Result<(), BindError> {
    let record = records.get_mut(index).ok_or(BindError::UnknownSensor)?;
    let previous = record.bound_id().clone();
    record.bind(id)?;

    if let Err(e) = layout.persist(name, records, store) {
        records[index].restore_bound_id(previous);
        return Err(BindError::Storage(e));
    }
    Ok(())
}
