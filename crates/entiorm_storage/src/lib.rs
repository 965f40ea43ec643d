//! # entiorm storage
//!
//! Append-only journals used to make the embedded document store durable.
//!
//! Journals are **opaque byte stores**: they read, append, flush and
//! truncate. [`RecordLog`] adds checksummed framing on top so a torn
//! tail left by a crash is detected and cut off on replay.
//!
//! ## Available Journals
//!
//! - [`MemoryJournal`] - for tests and ephemeral databases
//! - [`FileJournal`] - a single file guarded by an exclusive advisory lock
//!
//! ## Example
//!
//! ```rust
//! use entiorm_storage::{MemoryJournal, RecordLog};
//!
//! let mut log = RecordLog::new(Box::new(MemoryJournal::new()));
//! log.append(b"first").unwrap();
//! log.append(b"second").unwrap();
//! assert_eq!(log.replay().unwrap(), vec![b"first".to_vec(), b"second".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod journal;
mod record;

pub use error::{StorageError, StorageResult};
pub use file::FileJournal;
pub use journal::{JournalBackend, MemoryJournal};
pub use record::{compute_crc32, RecordLog};
