//! Error type for daemon-wide failures.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for fallible daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors that abort the whole server rather than a single request.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The rendezvous path already exists; the operator must remove it
    /// before the server can claim it.
    #[error("rendezvous path {0} already exists")]
    RendezvousExists(PathBuf),

    /// Creating or opening the rendezvous named pipe failed.
    #[error("rendezvous I/O error at {path}: {source}")]
    Rendezvous {
        /// Path of the rendezvous pipe.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A read from the rendezvous pipe returned zero bytes, which should be
    /// unreachable while the server holds its own write descriptor open.
    #[error("rendezvous pipe reported unexpected EOF")]
    RendezvousEof,

    /// The requested cache configuration was rejected.
    #[error("invalid cache configuration: {0}")]
    Cache(#[from] cache::CacheError),

    /// Installing the SIGINT handler failed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}
