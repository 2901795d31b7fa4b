//! Client-side errors, each carrying the process exit code it maps to.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors the client binary can report, each with a fixed exit code so
/// `main` never has to guess what a failure should map to.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The requested pathname does not fit the wire format's capacity.
    #[error("pathname {0:?} is too long to send to the server")]
    PathnameTooLong(PathBuf),

    /// Building or parsing a wire record failed.
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    /// Creating the client's own return-channel FIFO failed.
    #[error("failed to create return channel at {path}: {source}")]
    CreateReturnChannel {
        /// Path of the return-channel FIFO.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Writing the request to the rendezvous pipe failed.
    #[error("failed to send request to {path}: {source}")]
    SendRequest {
        /// Path of the rendezvous pipe.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Reading the response from the return channel failed.
    #[error("failed to read response from {path}: {source}")]
    ReadResponse {
        /// Path of the return-channel FIFO.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The server reported a per-request failure.
    #[error("server reported an error: {0}")]
    Server(protocol::ErrorCode),
}

impl ClientError {
    /// Maps this error to the process exit code `main` should return.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            ClientError::PathnameTooLong(_) => 2,
            ClientError::Protocol(_) => 3,
            ClientError::CreateReturnChannel { .. } | ClientError::SendRequest { .. } | ClientError::ReadResponse { .. } => 4,
            ClientError::Server(_) => 5,
        }
    }
}
