//! The well-known rendezvous named pipe clients write requests into.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use protocol::{RequestRecord, ProtocolError, REQUEST_RECORD_SIZE};
use tracing::warn;

use crate::error::{DaemonError, DaemonResult};

/// Mode the rendezvous pipe is created with: owner read/write, group write.
///
/// Equivalent to `S_IRUSR | S_IWUSR | S_IWGRP`.
pub const RENDEZVOUS_MODE: u32 = 0o620;

/// Owns both ends of the rendezvous pipe.
///
/// The write descriptor is never written to; it exists purely so the read
/// end never observes EOF while the server is running.
pub struct Rendezvous {
    path: PathBuf,
    reader: File,
    _writer: File,
}

impl Rendezvous {
    /// Creates the rendezvous pipe at `path` and opens both ends.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::RendezvousExists`] if `path` is already
    /// present, or [`DaemonError::Rendezvous`] if creation or either open
    /// fails.
    pub fn create(path: &Path) -> DaemonResult<Self> {
        if path.exists() {
            return Err(DaemonError::RendezvousExists(path.to_path_buf()));
        }
        fifo::mkfifo(path, RENDEZVOUS_MODE).map_err(|source| DaemonError::Rendezvous {
            path: path.to_path_buf(),
            source,
        })?;

        let reader = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|source| DaemonError::Rendezvous {
                path: path.to_path_buf(),
                source,
            })?;
        let writer = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| DaemonError::Rendezvous {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            _writer: writer,
        })
    }

    /// Blocks for the next well-formed request record.
    ///
    /// A read of an unexpected positive size is logged and skipped; the
    /// loop continues with the next read. A zero-size read is surfaced as
    /// [`DaemonError::RendezvousEof`], which the dispatcher treats as fatal.
    pub fn read_request(&mut self) -> DaemonResult<RequestRecord> {
        loop {
            let mut buf = [0u8; REQUEST_RECORD_SIZE];
            let read = self
                .reader
                .read(&mut buf)
                .map_err(|source| DaemonError::Rendezvous {
                    path: self.path.clone(),
                    source,
                })?;

            if read == 0 {
                return Err(DaemonError::RendezvousEof);
            }
            if read != REQUEST_RECORD_SIZE {
                warn!(component = "rendezvous", read, expected = REQUEST_RECORD_SIZE, "dropped short read");
                continue;
            }
            match RequestRecord::from_bytes(&buf) {
                Ok(request) => return Ok(request),
                Err(ProtocolError::InvalidPathnameEncoding) => {
                    warn!(component = "rendezvous", "dropped request with non-UTF-8 pathname");
                }
                Err(err) => {
                    warn!(component = "rendezvous", %err, "dropped malformed request");
                }
            }
        }
    }
}
