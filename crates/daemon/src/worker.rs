//! Worker threads: drain pending work, consult the cache, hash on miss.

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};

use cache::DigestCache;
use coalescer::Coalescer;
use protocol::{ErrorCode, ResponseRecord};
use tracing::{info, warn};

use crate::return_channel;

/// Running totals shared by every worker thread and reported by the
/// lifecycle controller at shutdown.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Digests computed on a cache miss.
    pub cache_misses: AtomicU64,
    /// Requests served straight from the cache.
    pub cache_hits: AtomicU64,
    /// Clients that received a response: one count per registered pid on a
    /// completed work item.
    pub clients_served: AtomicU64,
}

/// Runs one worker's loop until the coalescer reports shutdown.
///
/// `worker_index` is carried on every log event this worker emits so a
/// single log stream can still be filtered per worker.
pub fn run(
    worker_index: usize,
    coalescer: &Coalescer,
    cache: &DigestCache,
    client_fifo_prefix: &str,
    stats: &WorkerStats,
) {
    while let Some(item) = coalescer.next_work_item() {
        let key = item.key();

        let response = if let Some(err) = item.deferred_err {
            ResponseRecord::failure(err)
        } else {
            compute_response(&item.pathname, item.mtime, cache, stats, worker_index)
        };

        // `complete` hands back ownership of the map's copy of this item,
        // along with whatever client registrations accrued on it while it
        // was in flight. Those clients are only reachable through this
        // return value, not through `item`.
        let completed = coalescer.complete(&key).unwrap_or(item);

        info!(
            component = "worker",
            worker_index,
            pathname = %completed.pathname,
            clients = completed.clients.len(),
            "publishing response"
        );
        return_channel::publish_to_clients(client_fifo_prefix, &completed.clients, &response);
        stats
            .clients_served
            .fetch_add(completed.clients.len() as u64, Ordering::Relaxed);
    }
    info!(component = "worker", worker_index, "exiting");
}

fn compute_response(
    pathname: &str,
    mtime: i64,
    cache: &DigestCache,
    stats: &WorkerStats,
    worker_index: usize,
) -> ResponseRecord {
    if let Some(digest) = cache.lookup(pathname, mtime) {
        stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        info!(component = "worker", worker_index, pathname, "cache hit");
        return ResponseRecord::success(&digest);
    }

    let response = match File::open(pathname) {
        Err(err) => {
            warn!(component = "worker", worker_index, pathname, %err, "open failed");
            ResponseRecord::failure(ErrorCode::Open)
        }
        Ok(mut file) => match checksums::file_digest(&mut file) {
            Ok(digest) => {
                cache.insert(pathname, mtime, digest);
                stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                match file.sync_all() {
                    Ok(()) => ResponseRecord::success(&digest),
                    Err(err) => {
                        warn!(component = "worker", worker_index, pathname, %err, "close warning");
                        ResponseRecord::close_warning(&digest)
                    }
                }
            }
            Err(err) => {
                warn!(component = "worker", worker_index, pathname, %err, "read failed");
                ResponseRecord::failure(ErrorCode::Read)
            }
        },
    };
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use tempfile::NamedTempFile;

    #[test]
    fn compute_response_hits_cache_on_second_call() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        file.flush().unwrap();
        let path = file.path().to_str().unwrap();

        let cache = DigestCache::new();
        let stats = WorkerStats::default();

        let first = compute_response(path, 1, &cache, &stats, 0);
        assert_eq!(first.err_code, ErrorCode::Ok);
        assert_eq!(stats.cache_misses.load(Ordering::Relaxed), 1);

        let second = compute_response(path, 1, &cache, &stats, 0);
        assert_eq!(second, first);
        assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn compute_response_reports_open_failure() {
        let cache = DigestCache::new();
        let stats = WorkerStats::default();
        let response = compute_response("/nonexistent/path/for/sure", 0, &cache, &stats, 0);
        assert_eq!(response.err_code, ErrorCode::Open);
    }

    #[test]
    fn run_drains_pending_and_exits_on_shutdown() {
        let coalescer = Arc::new(Coalescer::new());
        let cache = DigestCache::new();
        let stats = WorkerStats::default();

        coalescer.shutdown();
        run(0, &coalescer, &cache, "/tmp/sha256d.client.", &stats);
    }
}
