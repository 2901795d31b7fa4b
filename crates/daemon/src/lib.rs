#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `daemon` implements the SHA-256 hashing server: the rendezvous named
//! pipe, the single dispatcher thread, the worker pool, the digest cache
//! wiring, and the lifecycle controller that ties them together and
//! handles `SIGINT`.
//!
//! [`run`] is the crate's sole public entry point; `bin/sha256-server`
//! parses arguments into a [`Config`] and hands it here, keeping argument
//! parsing itself out of anything this crate tests.

mod config;
mod dispatcher;
mod error;
mod lifecycle;
mod rendezvous;
mod return_channel;
mod worker;

pub use config::{Config, MAX_THREADS};
pub use error::{DaemonError, DaemonResult};

/// Runs the server to completion: creates the rendezvous pipe, starts the
/// dispatcher and worker pool, and blocks until `SIGINT` triggers a clean
/// shutdown.
///
/// # Errors
///
/// Returns a [`DaemonError`] if the rendezvous pipe already exists, cannot
/// be created, or a fatal I/O error is observed on it once running.
pub fn run(config: Config) -> DaemonResult<()> {
    lifecycle::run(config)
}
