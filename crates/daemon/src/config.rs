//! Server configuration.

use std::path::PathBuf;

use protocol::DEFAULT_RENDEZVOUS_PATH;

/// Hard ceiling on the worker pool size, matching the server's fixed-size
/// thread table.
pub const MAX_THREADS: usize = 63;

/// Server configuration, built by `cli` from parsed arguments and handed to
/// [`crate::run`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem path of the rendezvous named pipe.
    pub rendezvous_path: PathBuf,
    /// Prefix for per-client return-channel named pipes.
    pub client_fifo_prefix: String,
    /// Number of worker threads.
    pub threads: usize,
    /// Number of buckets in the digest cache.
    pub cache_buckets: usize,
}

impl Config {
    /// Default worker count: one thread per online CPU minus one, clamped
    /// to `[1, MAX_THREADS]`.
    #[must_use]
    pub fn default_thread_count() -> usize {
        let online = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        online.saturating_sub(1).clamp(1, MAX_THREADS)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rendezvous_path: PathBuf::from(DEFAULT_RENDEZVOUS_PATH),
            client_fifo_prefix: protocol::DEFAULT_CLIENT_FIFO_PREFIX.to_owned(),
            threads: Self::default_thread_count(),
            cache_buckets: cache::DEFAULT_BUCKET_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thread_count_is_within_bounds() {
        let count = Config::default_thread_count();
        assert!(count >= 1);
        assert!(count <= MAX_THREADS);
    }

    #[test]
    fn default_config_uses_protocol_defaults() {
        let config = Config::default();
        assert_eq!(config.rendezvous_path, PathBuf::from(DEFAULT_RENDEZVOUS_PATH));
        assert_eq!(config.cache_buckets, cache::DEFAULT_BUCKET_COUNT);
    }
}
