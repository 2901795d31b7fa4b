#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Argument parsing and the client round trip shared by `bin/sha256-server`
//! and `bin/sha256-client`.

pub mod client;
pub mod error;
pub mod server;

pub use client::{ClientArgs, ClientConfig};
pub use error::ClientError;
pub use server::ServerArgs;
