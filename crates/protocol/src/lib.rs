#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` defines the two fixed-layout wire records exchanged between the
//! SHA-256 hashing daemon and its clients over named-pipe rendezvous, plus the
//! error-code taxonomy carried on the response record.
//!
//! # Design
//!
//! Both [`RequestRecord`] and [`ResponseRecord`] encode to and decode from a
//! fixed-size byte buffer with an explicit, little-endian layout. The crate
//! intentionally avoids `#[repr(C)]` struct transmutation: an explicit
//! `to_bytes`/`from_bytes` pair keeps the wire format independent of the host
//! platform's struct layout rules and needs no `unsafe` code.
//!
//! # Invariants
//!
//! - [`PATHNAME_CAPACITY`] bounds the pathname field on both sides; a
//!   pathname that does not fit (including its trailing NUL) is rejected by
//!   [`RequestRecord::new`] before any I/O happens.
//! - [`ResponseRecord::hash`] is always 64 lowercase hex characters plus a
//!   trailing NUL when [`ErrorCode::Ok`] is reported, and all-zero otherwise.
//!
//! # Errors
//!
//! [`ProtocolError`] reports malformed records: a pathname that overflows
//! [`PATHNAME_CAPACITY`], a decoded buffer of the wrong length, or a response
//! whose error code does not map to a known [`ErrorCode`] variant.

use std::fmt;
use thiserror::Error;

/// Maximum number of bytes (including the trailing NUL) reserved for a
/// pathname on the wire. Chosen to comfortably hold real-world paths; see
/// the crate-level design note on why this is not combined with a
/// `#[repr(C)]` layout.
pub const PATHNAME_CAPACITY: usize = 4096;

/// Encoded size of a [`RequestRecord`]: a 4-byte little-endian `client_pid`
/// followed by the [`PATHNAME_CAPACITY`]-byte pathname field.
pub const REQUEST_RECORD_SIZE: usize = 4 + PATHNAME_CAPACITY;

/// Encoded size of a [`ResponseRecord`]: a 2-byte little-endian `err_code`
/// followed by the 65-byte hash field.
pub const RESPONSE_RECORD_SIZE: usize = 2 + 65;

/// Default filesystem path for the server's rendezvous named pipe.
pub const DEFAULT_RENDEZVOUS_PATH: &str = "/tmp/sha256d.fifo";

/// Default prefix for per-client return-channel named pipes. The client's
/// decimal process id is appended to form the full path.
pub const DEFAULT_CLIENT_FIFO_PREFIX: &str = "/tmp/sha256d.client.";

/// Errors produced while encoding or decoding wire records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The pathname (plus trailing NUL) does not fit in [`PATHNAME_CAPACITY`]
    /// bytes.
    #[error("pathname of {len} bytes exceeds the {PATHNAME_CAPACITY}-byte capacity")]
    PathnameTooLong {
        /// Length of the offending pathname, in bytes.
        len: usize,
    },
    /// A decoded buffer had an unexpected length.
    #[error("expected a {expected}-byte record, got {actual} bytes")]
    UnexpectedRecordSize {
        /// Size the record was supposed to have.
        expected: usize,
        /// Size actually observed.
        actual: usize,
    },
    /// The pathname field was not valid UTF-8.
    #[error("pathname field is not valid UTF-8")]
    InvalidPathnameEncoding,
    /// A response's `err_code` did not map to a known [`ErrorCode`] variant.
    #[error("unrecognized response error code {0}")]
    UnknownErrorCode(i16),
}

/// Error codes carried on [`ResponseRecord::err_code`].
///
/// Values match the server's wire-level error taxonomy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// The digest is valid.
    Ok,
    /// The server could not `stat` the file at admission time.
    Stat,
    /// The server could not open the file at digest time.
    Open,
    /// A read on the file failed mid-digest.
    Read,
    /// The file was digested successfully but `close` failed. Advisory: the
    /// hash is still valid.
    Close,
    /// The server is draining in-flight work during shutdown and did not
    /// compute a digest for this request.
    ShuttingDown,
}

impl ErrorCode {
    /// Returns `true` when the digest in the accompanying response is
    /// meaningless and must not be used by the caller.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, ErrorCode::Ok | ErrorCode::Close)
    }

    /// Returns the wire-level `i16` value for this error code.
    #[must_use]
    pub const fn to_wire(self) -> i16 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::Stat => -1,
            ErrorCode::Open => -2,
            ErrorCode::Read => -3,
            ErrorCode::Close => -4,
            ErrorCode::ShuttingDown => -5,
        }
    }
}

impl TryFrom<i16> for ErrorCode {
    type Error = ProtocolError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Ok),
            -1 => Ok(ErrorCode::Stat),
            -2 => Ok(ErrorCode::Open),
            -3 => Ok(ErrorCode::Read),
            -4 => Ok(ErrorCode::Close),
            -5 => Ok(ErrorCode::ShuttingDown),
            other => Err(ProtocolError::UnknownErrorCode(other)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::Ok => "ok",
            ErrorCode::Stat => "stat failed",
            ErrorCode::Open => "open failed",
            ErrorCode::Read => "read failed",
            ErrorCode::Close => "close failed (digest still valid)",
            ErrorCode::ShuttingDown => "server is shutting down",
        };
        f.write_str(text)
    }
}

/// A client's request for the digest of a pathname, as read off the
/// rendezvous pipe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestRecord {
    /// Process id of the requesting client.
    pub client_pid: i32,
    /// Requested pathname.
    pub pathname: String,
}

impl RequestRecord {
    /// Builds a request record, rejecting pathnames that cannot fit the
    /// wire format's [`PATHNAME_CAPACITY`].
    pub fn new(client_pid: i32, pathname: impl Into<String>) -> Result<Self, ProtocolError> {
        let pathname = pathname.into();
        if pathname.len() + 1 > PATHNAME_CAPACITY {
            return Err(ProtocolError::PathnameTooLong {
                len: pathname.len(),
            });
        }
        Ok(Self {
            client_pid,
            pathname,
        })
    }

    /// Encodes the record into a fixed [`REQUEST_RECORD_SIZE`]-byte buffer.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; REQUEST_RECORD_SIZE] {
        let mut buf = [0u8; REQUEST_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.client_pid.to_le_bytes());
        let name_bytes = self.pathname.as_bytes();
        buf[4..4 + name_bytes.len()].copy_from_slice(name_bytes);
        // Remaining bytes (including the terminator) are already zero.
        buf
    }

    /// Decodes a record from an exact-size buffer.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != REQUEST_RECORD_SIZE {
            return Err(ProtocolError::UnexpectedRecordSize {
                expected: REQUEST_RECORD_SIZE,
                actual: buf.len(),
            });
        }
        let mut pid_bytes = [0u8; 4];
        pid_bytes.copy_from_slice(&buf[0..4]);
        let client_pid = i32::from_le_bytes(pid_bytes);

        let name_field = &buf[4..];
        let nul_at = name_field.iter().position(|&b| b == 0).unwrap_or(name_field.len());
        let pathname = std::str::from_utf8(&name_field[..nul_at])
            .map_err(|_| ProtocolError::InvalidPathnameEncoding)?
            .to_string();

        Ok(Self {
            client_pid,
            pathname,
        })
    }
}

/// The server's response to a single client: either a digest or an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseRecord {
    /// Outcome of the request.
    pub err_code: ErrorCode,
    /// 64 lowercase hex characters, or all-zero when `err_code.is_failure()`.
    pub hash: [u8; 64],
}

impl ResponseRecord {
    /// Builds a success response from a 32-byte digest, hex-encoding it into
    /// the 64-character hash field.
    #[must_use]
    pub fn success(digest: &[u8; 32]) -> Self {
        let mut hash = [0u8; 64];
        for (i, byte) in digest.iter().enumerate() {
            let hex = format!("{byte:02x}");
            hash[i * 2..i * 2 + 2].copy_from_slice(hex.as_bytes());
        }
        Self {
            err_code: ErrorCode::Ok,
            hash,
        }
    }

    /// Builds a response carrying a close-failure warning alongside an
    /// otherwise valid digest.
    #[must_use]
    pub fn close_warning(digest: &[u8; 32]) -> Self {
        let mut response = Self::success(digest);
        response.err_code = ErrorCode::Close;
        response
    }

    /// Builds a failure response with no meaningful hash.
    #[must_use]
    pub fn failure(err_code: ErrorCode) -> Self {
        debug_assert!(err_code.is_failure());
        Self {
            err_code,
            hash: [0u8; 64],
        }
    }

    /// Returns the hash field as a `&str`, assuming it is valid ASCII hex.
    ///
    /// Returns `None` when `err_code.is_failure()`, since the field is
    /// meaningless in that case.
    #[must_use]
    pub fn hash_str(&self) -> Option<&str> {
        if self.err_code.is_failure() {
            return None;
        }
        std::str::from_utf8(&self.hash).ok()
    }

    /// Encodes the record into a fixed [`RESPONSE_RECORD_SIZE`]-byte buffer.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RESPONSE_RECORD_SIZE] {
        let mut buf = [0u8; RESPONSE_RECORD_SIZE];
        buf[0..2].copy_from_slice(&self.err_code.to_wire().to_le_bytes());
        buf[2..66].copy_from_slice(&self.hash);
        // buf[66] stays zero: the trailing NUL terminator.
        buf
    }

    /// Decodes a record from an exact-size buffer.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != RESPONSE_RECORD_SIZE {
            return Err(ProtocolError::UnexpectedRecordSize {
                expected: RESPONSE_RECORD_SIZE,
                actual: buf.len(),
            });
        }
        let mut code_bytes = [0u8; 2];
        code_bytes.copy_from_slice(&buf[0..2]);
        let err_code = ErrorCode::try_from(i16::from_le_bytes(code_bytes))?;

        let mut hash = [0u8; 64];
        hash.copy_from_slice(&buf[2..66]);

        Ok(Self { err_code, hash })
    }
}

/// Formats a client pid into its return-channel path under `prefix`.
#[must_use]
pub fn client_fifo_path(prefix: &str, client_pid: i32) -> String {
    format!("{prefix}{client_pid}")
}
