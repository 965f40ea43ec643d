//! Checksummed record framing over a journal.
//!
//! ```text
//! | len (u32 LE) | crc32 (u32 LE) | payload (len bytes) |
//! ```

use crate::error::{StorageError, StorageResult};
use crate::journal::JournalBackend;

const HEADER_LEN: usize = 8;

/// A sequence of framed records stored in a journal.
pub struct RecordLog {
    journal: Box<dyn JournalBackend>,
}

impl RecordLog {
    /// Wraps a journal.
    pub fn new(journal: Box<dyn JournalBackend>) -> Self {
        Self { journal }
    }

    /// Appends one record and syncs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is larger than `u32::MAX` bytes or
    /// the journal fails.
    pub fn append(&mut self, payload: &[u8]) -> StorageResult<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::RecordTooLarge { len: payload.len() })?;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&compute_crc32(payload).to_le_bytes());
        frame.extend_from_slice(payload);
        self.journal.append(&frame)?;
        self.journal.sync()
    }

    /// Reads every intact record in order.
    ///
    /// A short or corrupt tail (a crash mid-append) is truncated away so
    /// later appends start on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read or truncated.
    pub fn replay(&mut self) -> StorageResult<Vec<Vec<u8>>> {
        let size = self.journal.size()?;
        let mut offset = 0u64;
        let mut records = Vec::new();

        while offset + HEADER_LEN as u64 <= size {
            let header = self.journal.read_at(offset, HEADER_LEN)?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let body_start = offset + HEADER_LEN as u64;
            if body_start + u64::from(len) > size {
                break;
            }
            let payload = self.journal.read_at(body_start, len as usize)?;
            if compute_crc32(&payload) != crc {
                break;
            }
            records.push(payload);
            offset = body_start + u64::from(len);
        }

        if offset < size {
            self.journal.truncate(offset)?;
        }
        Ok(records)
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    pub fn size(&self) -> StorageResult<u64> {
        self.journal.size()
    }
}

impl std::fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog").finish_non_exhaustive()
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryJournal;

    #[test]
    fn crc32_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let mut log = RecordLog::new(Box::new(MemoryJournal::new()));
        log.append(b"one").unwrap();
        log.append(b"two").unwrap();
        let intact = log.size().unwrap();

        let mut bytes = log.journal.read_at(0, intact as usize).unwrap();
        bytes.extend_from_slice(&[9, 0, 0, 0, 1, 2]);

        let mut reopened = RecordLog::new(Box::new(MemoryJournal::with_data(bytes)));
        assert_eq!(
            reopened.replay().unwrap(),
            vec![b"one".to_vec(), b"two".to_vec()]
        );
        assert_eq!(reopened.size().unwrap(), intact);
    }

    #[test]
    fn corrupt_record_stops_replay() {
        let mut log = RecordLog::new(Box::new(MemoryJournal::new()));
        log.append(b"good").unwrap();
        let boundary = log.size().unwrap();
        log.append(b"flipped").unwrap();

        let size = log.size().unwrap();
        let mut bytes = log.journal.read_at(0, size as usize).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut reopened = RecordLog::new(Box::new(MemoryJournal::with_data(bytes)));
        assert_eq!(reopened.replay().unwrap(), vec![b"good".to_vec()]);
        assert_eq!(reopened.size().unwrap(), boundary);
    }

    proptest::proptest! {
        #[test]
        fn appended_records_replay_in_order(
            payloads in proptest::collection::vec(proptest::collection::vec(proptest::num::u8::ANY, 0..64), 0..16)
        ) {
            let mut log = RecordLog::new(Box::new(MemoryJournal::new()));
            for payload in &payloads {
                log.append(payload).unwrap();
            }
            proptest::prop_assert_eq!(log.replay().unwrap(), payloads);
        }
    }
}
