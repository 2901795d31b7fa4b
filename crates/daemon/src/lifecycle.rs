//! Startup, signal handling, and shutdown for the hashing server.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use cache::DigestCache;
use coalescer::Coalescer;
use protocol::RequestRecord;
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::{self, WAKEUP_CLIENT_PID};
use crate::error::{DaemonError, DaemonResult};
use crate::rendezvous::Rendezvous;
use crate::worker::{self, WorkerStats};

/// Drives the server to completion: creates the rendezvous, starts the
/// dispatcher and worker pool, waits for `SIGINT`, drains in-flight work,
/// reports final statistics, and removes the rendezvous pipe.
///
/// Shutdown is arbitrated by a single [`AtomicBool`] so it runs exactly
/// once regardless of which path triggers it: a `SIGINT`, or the dispatcher
/// returning on its own because the rendezvous pipe reported a fatal error.
pub fn run(config: Config) -> DaemonResult<()> {
    let rendezvous = Rendezvous::create(&config.rendezvous_path)?;
    let coalescer = Coalescer::new();
    let cache = DigestCache::with_bucket_count(config.cache_buckets)?;
    let stats = WorkerStats::default();
    let shutting_down = AtomicBool::new(false);

    let mut signals = Signals::new([SIGINT]).map_err(DaemonError::Signal)?;
    let signal_handle = signals.handle();

    let dispatcher_result = thread::scope(|scope| {
        let dispatcher_thread = scope.spawn(|| dispatcher::run(rendezvous, &coalescer, &shutting_down));

        let signal_thread = scope.spawn(|| {
            for signal in signals.forever() {
                info!(component = "lifecycle", signal, "received shutdown signal");
                request_shutdown(&config.rendezvous_path, &coalescer, &shutting_down);
                break;
            }
        });

        let (coalescer_ref, cache_ref, stats_ref) = (&coalescer, &cache, &stats);
        let client_fifo_prefix = &config.client_fifo_prefix;
        let worker_threads: Vec<_> = (0..config.threads)
            .map(|index| {
                scope.spawn(move || worker::run(index, coalescer_ref, cache_ref, client_fifo_prefix, stats_ref))
            })
            .collect();

        let dispatcher_result = dispatcher_thread.join().expect("dispatcher thread panicked");

        // The dispatcher stopped either because it observed shutdown, or
        // because the rendezvous pipe itself failed. Either way every
        // worker must be told to drain and exit.
        request_shutdown(&config.rendezvous_path, &coalescer, &shutting_down);

        for worker_thread in worker_threads {
            worker_thread.join().expect("worker thread panicked");
        }

        signal_handle.close();
        signal_thread.join().expect("signal thread panicked");

        dispatcher_result
    });

    log_final_stats(&stats);
    cleanup_rendezvous(&config.rendezvous_path);

    dispatcher_result
}

/// Marks shutdown as requested, exactly once, and wakes both halves of the
/// server: the worker pool via [`Coalescer::shutdown`], and the dispatcher's
/// blocking read by writing a [`WAKEUP_CLIENT_PID`] sentinel into the
/// rendezvous pipe.
///
/// Safe to call more than once or from more than one thread: only the
/// caller that wins the compare-exchange performs the wakeup.
fn request_shutdown(rendezvous_path: &Path, coalescer: &Coalescer, shutting_down: &AtomicBool) {
    if shutting_down.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
        return;
    }
    coalescer.shutdown();
    if let Err(err) = wake_dispatcher(rendezvous_path) {
        warn!(component = "lifecycle", %err, "failed to wake dispatcher for shutdown");
    }
}

fn wake_dispatcher(rendezvous_path: &Path) -> io::Result<()> {
    let wakeup = RequestRecord::new(WAKEUP_CLIENT_PID, "").expect("empty pathname always fits");
    let mut pipe = OpenOptions::new().write(true).open(rendezvous_path)?;
    pipe.write_all(&wakeup.to_bytes())
}

fn log_final_stats(stats: &WorkerStats) {
    let cache_hits = stats.cache_hits.load(Ordering::Relaxed);
    let cache_misses = stats.cache_misses.load(Ordering::Relaxed);
    let clients_served = stats.clients_served.load(Ordering::Relaxed);
    let total = cache_hits + cache_misses;
    let hit_rate = if total == 0 { 0.0 } else { cache_hits as f64 / total as f64 * 100.0 };

    info!(
        component = "lifecycle",
        clients_served,
        cache_hits,
        cache_misses,
        hit_rate_pct = hit_rate,
        "server shut down"
    );
}

fn cleanup_rendezvous(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!(component = "lifecycle", path = %path.display(), "removed rendezvous pipe"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(component = "lifecycle", path = %path.display(), %err, "failed to remove rendezvous pipe"),
    }
}
