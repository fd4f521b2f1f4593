//! Embedded producer feeding the local event system

use bytes::Bytes;
use evet_core::evio::{BankWriter, BLOCK_HEADER_WORDS};
use evet_core::Endian;
use evet_shared_memory::{LocalEventSystem, SharedMemoryError};
use tracing::{debug, info};

/// Data words in every produced bank
const BANK_DATA_WORDS: usize = 2;
/// Tag of produced banks
pub const PRODUCER_TAG: u16 = 0x0a0a;
/// Data type code of 32-bit unsigned integers
const TYPE_UINT32: u8 = 0x01;

/// Bytes of one produced event holding `banks` banks
pub fn payload_size(banks: u32) -> usize {
    (BLOCK_HEADER_WORDS as usize + banks as usize * (2 + BANK_DATA_WORDS)) * 4
}

/// Build event `number`: `banks` banks whose data is `[number, bank index]`
pub fn build_event(number: u64, banks: u32, endian: Endian) -> Bytes {
    let mut writer = BankWriter::new(endian);
    for index in 0..banks {
        writer.add_bank(PRODUCER_TAG, TYPE_UINT32, index as u8, &[number as u32, index]);
    }
    writer.finish(number as u32)
}

/// Publish `count` events, stopping early once the system is killed
///
/// Returns how many events were published.
pub fn produce(system: &LocalEventSystem, count: u64, banks: u32) -> Result<u64, SharedMemoryError> {
    let banks = banks.max(1);
    let endian = Endian::native();

    for number in 0..count {
        let payload = build_event(number, banks, endian);
        match system.publish(&payload, endian) {
            Ok(()) => {}
            Err(SharedMemoryError::Dead) => {
                debug!("Event system died after {} events", number);
                return Ok(number);
            }
            Err(e) => return Err(e),
        }
    }

    info!("Producer published {} events", count);
    Ok(count)
}
