//! # Storage abstraction layer for embedded systems
//!
//! Byte-addressed storage traits, implemented by the firmware for whatever
//! non-volatile memory the board has (internal EEPROM, emulated EEPROM in
//! flash, FRAM), plus [`config::ConfigStore`], the fixed-slot view the node
//! keeps its addresses in.
//!
//! - [`ReadStorage`]: Read data from storage
//! - [`Storage`]: Read and write operations
//! - [`RamStorage`]: Volatile storage backed by an array
//!
//! ```rust
//! use ethmqtt::storage::{RamStorage, ReadStorage, Storage};
//!
//! let mut storage = RamStorage::<64>::new();
//! storage.write(8, &[192, 168, 2, 1]).unwrap();
//! let mut bytes = [0u8; 4];
//! storage.read(8, &mut bytes).unwrap();
//! assert_eq!(bytes, [192, 168, 2, 1]);
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for storage operations
pub mod error;

pub mod config;

use error::Error;

/// Value of an erased byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Trait for reading data from storage devices.
///
/// # Examples
///
/// ```rust,no_run
/// use ethmqtt::storage::ReadStorage;
///
/// fn read_word<S: ReadStorage>(storage: &mut S) -> Result<u32, S::Error> {
///     let mut word = [0u8; 4];
///     storage.read(0, &mut word)?;
///     Ok(u32::from_be_bytes(word))
/// }
/// ```
pub trait ReadStorage {
    /// Associated error type for read operations
    type Error: core::fmt::Debug;

    /// Read data from the storage device.
    ///
    /// Reads data from the specified offset into the provided buffer.
    /// The entire buffer will be filled unless an error occurs.
    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error>;

    /// Get the total capacity of the storage device in bytes.
    fn capacity(&self) -> usize;
}

/// Trait for storage devices that support both read and write operations.
pub trait Storage: ReadStorage {
    /// Write data to the storage device.
    ///
    /// Whether already-written locations must be erased first depends on
    /// the technology; EEPROM and FRAM overwrite in place.
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Storage backed by an in-memory array, initially erased.
///
/// Handy on boards without non-volatile memory, and in tests.
#[derive(Debug, Clone)]
pub struct RamStorage<const N: usize> {
    memory: [u8; N],
}

impl<const N: usize> RamStorage<N> {
    /// Create erased storage.
    pub const fn new() -> Self {
        RamStorage {
            memory: [ERASED_BYTE; N],
        }
    }

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.memory
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, Error> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(Error::OutOfBounds)?;
        if end > N {
            return Err(Error::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReadStorage for RamStorage<N> {
    type Error = Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Storage for RamStorage<N> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        self.memory[range].copy_from_slice(bytes);
        Ok(())
    }
}

impl<T: ReadStorage + ?Sized> ReadStorage for &mut T {
    type Error = T::Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        T::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        T::capacity(self)
    }
}

impl<T: Storage + ?Sized> Storage for &mut T {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write(self, offset, bytes)
    }
}

#[cfg(test)]
mod tests;
