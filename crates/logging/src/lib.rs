#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` installs the [`tracing`] subscriber shared by the
//! `sha256-server` and `sha256-client` binaries. There is no verbosity-flag
//! taxonomy to model here, since the service has one log stream: verbosity
//! is a single count of `-v` repeats that maps onto a filter directive.
//!
//! # Design
//!
//! [`init`] builds an [`tracing_subscriber::EnvFilter`] from the requested
//! [`Verbosity`], then falls back to `RUST_LOG` when the operator wants
//! finer-grained control than a repeat count can express. Every daemon log
//! event carries a `component` field (`"rendezvous"`, `"dispatcher"`,
//! `"worker"`, `"cache"`, `"lifecycle"`) so a single log stream can still be
//! filtered per subsystem with `RUST_LOG=sha256d[component=worker]=debug`.

use tracing_subscriber::EnvFilter;

/// Verbosity requested on the command line, expressed as a repeat count of
/// `-v` (0 = default, 1 = `-v`, 2 = `-vv`, 3+ = `-vvv`), or as `--quiet`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    count: u8,
    quiet: bool,
}

impl Verbosity {
    /// Builds a verbosity level from a `-v` repeat count.
    #[must_use]
    pub fn from_count(count: u8) -> Self {
        Self { count, quiet: false }
    }

    /// Builds the quietest verbosity level, for `--quiet`.
    #[must_use]
    pub fn quiet() -> Self {
        Self { count: 0, quiet: true }
    }

    fn directive(self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.count {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Installs the global [`tracing`] subscriber.
///
/// The filter defaults to the directive implied by `verbosity`, but an
/// `RUST_LOG` environment variable always takes precedence so operators can
/// ask for per-module or per-field filtering without recompiling.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed. Binaries call
/// this exactly once during startup.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
