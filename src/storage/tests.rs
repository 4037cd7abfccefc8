use super::error::Error;
use super::*;

const CAPACITY: usize = 64;

#[test]
fn new_storage_reads_erased() {
    let mut storage = RamStorage::<CAPACITY>::new();
    let mut bytes = [0u8; 8];
    storage.read(0, &mut bytes).unwrap();
    assert_eq!(bytes, [ERASED_BYTE; 8]);
    assert_eq!(storage.capacity(), CAPACITY);
}

#[test]
fn write_then_read() {
    let mut storage = RamStorage::<CAPACITY>::new();
    storage.write(10, b"broker").unwrap();
    let mut bytes = [0u8; 6];
    storage.read(10, &mut bytes).unwrap();
    assert_eq!(&bytes, b"broker");
}

#[test]
fn out_of_bounds_access() {
    let mut storage = RamStorage::<CAPACITY>::new();
    let mut bytes = [0u8; 4];
    assert_eq!(storage.read(CAPACITY as u32 - 2, &mut bytes), Err(Error::OutOfBounds));
    assert_eq!(storage.write(CAPACITY as u32, &[1]), Err(Error::OutOfBounds));
    assert_eq!(storage.read(u32::MAX, &mut bytes), Err(Error::OutOfBounds));
}

#[test]
fn mutable_reference_is_storage() {
    fn store<S: Storage>(mut storage: S) -> Result<(), S::Error> {
        storage.write(0, &[42])
    }
    let mut storage = RamStorage::<CAPACITY>::new();
    store(&mut storage).unwrap();
    assert_eq!(storage.as_bytes()[0], 42);
}
