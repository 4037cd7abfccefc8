//! Persistent node configuration.
//!
//! Values live in consecutive 4-byte slots, most significant byte first.
//! A slot that reads as all ones has never been written.

use super::{ReadStorage, Storage};
use crate::network::ipv4::Ipv4Address;

/// Slot holding the broker's IPv4 address.
pub const BROKER_IP: u16 = 1;
/// Slot holding this node's IPv4 address.
pub const LOCAL_IP: u16 = 2;

/// Width of one slot in bytes.
pub const SLOT_SIZE: u32 = 4;

/// Word read from a slot that was never written.
pub const UNSET: u32 = 0xFFFF_FFFF;

/// Slot-addressed view over a [`Storage`].
#[derive(Debug)]
pub struct ConfigStore<S> {
    storage: S,
    base: u32,
}

impl<S: ReadStorage> ConfigStore<S> {
    /// Slots start at offset 0 of `storage`.
    pub fn new(storage: S) -> Self {
        Self::with_base(storage, 0)
    }

    /// Slots start at `base`, leaving the bytes before it to other users.
    pub fn with_base(storage: S, base: u32) -> Self {
        ConfigStore { storage, base }
    }

    /// Give the storage back.
    pub fn into_inner(self) -> S {
        self.storage
    }

    fn offset(&self, slot: u16) -> u32 {
        self.base + u32::from(slot) * SLOT_SIZE
    }

    /// Raw word in `slot`, `None` if unset.
    pub fn read_word(&mut self, slot: u16) -> Result<Option<u32>, S::Error> {
        let mut bytes = [0u8; SLOT_SIZE as usize];
        let offset = self.offset(slot);
        self.storage.read(offset, &mut bytes)?;
        match u32::from_be_bytes(bytes) {
            UNSET => Ok(None),
            word => Ok(Some(word)),
        }
    }

    /// Address in `slot`, `None` if unset.
    pub fn read_address(&mut self, slot: u16) -> Result<Option<Ipv4Address>, S::Error> {
        Ok(self.read_word(slot)?.map(Ipv4Address::from_bits))
    }
}

impl<S: Storage> ConfigStore<S> {
    /// Store a raw word in `slot`.
    pub fn write_word(&mut self, slot: u16, word: u32) -> Result<(), S::Error> {
        let offset = self.offset(slot);
        self.storage.write(offset, &word.to_be_bytes())
    }

    /// Store an address in `slot`.
    pub fn write_address(&mut self, slot: u16, ip: Ipv4Address) -> Result<(), S::Error> {
        self.write_word(slot, ip.to_bits())
    }

    /// Mark `slot` as unset.
    pub fn clear(&mut self, slot: u16) -> Result<(), S::Error> {
        self.write_word(slot, UNSET)
    }
}
