#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` provides the streaming SHA-256 hasher used to digest file
//! contents for the hashing service, along with a small helper that streams
//! an open file through the hasher in fixed-size chunks.
//!
//! # Design
//!
//! - [`strong`] exposes [`strong::Sha256`] together with the
//!   [`strong::StrongDigest`] trait, kept as a trait boundary in case a
//!   second algorithm is ever negotiated.
//! - [`file_digest`] streams a file handle through a [`strong::Sha256`]
//!   hasher without reading the whole file into memory at once.
//!
//! # Invariants
//!
//! - Strong digests stream data incrementally and never panic; they surface
//!   failures through the standard digest traits.
//! - [`file_digest`] never holds a digest-cache or list lock: callers that
//!   compute digests under contention should call it only after releasing
//!   any shared-state locks.
//!
//! # Examples
//!
//! ```
//! use checksums::strong::{Sha256, StrongDigest};
//!
//! let mut hasher = Sha256::new();
//! hasher.update(b"hello");
//! let digest = hasher.finalize();
//! assert_eq!(digest.len(), Sha256::DIGEST_LEN);
//! ```

pub mod strong;

use std::fs::File;
use std::io::{self, Read};

use strong::{Sha256, StrongDigest};

/// Chunk size used when streaming a file through [`file_digest`].
///
/// Any size at or above one SHA-256 block (64 bytes) is conformant; 64 KiB
/// amortizes syscall overhead well on modern systems.
pub const DIGEST_CHUNK_SIZE: usize = 64 * 1024;

/// Computes the SHA-256 digest of an already-open file by streaming it in
/// [`DIGEST_CHUNK_SIZE`]-byte chunks.
///
/// Returns the 32-byte digest. I/O errors are surfaced to the caller, who is
/// expected to map them onto the protocol's `Open`/`Read`/`Close` error
/// codes (this crate does not know about the wire protocol).
pub fn file_digest(file: &mut File) -> io::Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}
