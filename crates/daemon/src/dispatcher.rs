//! The single thread that drains the rendezvous pipe and admits work.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use coalescer::Coalescer;
use protocol::ErrorCode;
use tracing::{info, warn};

use crate::error::DaemonResult;
use crate::rendezvous::Rendezvous;

/// Client pid the lifecycle controller uses to wake a blocked dispatcher on
/// shutdown. No real client ever uses pid 0, so a request carrying it is
/// never admitted, only used to unblock [`Rendezvous::read_request`].
pub(crate) const WAKEUP_CLIENT_PID: i32 = 0;

/// Runs the dispatcher loop until shutdown is signalled or the rendezvous
/// reports a fatal error.
///
/// For every request, `stat` is called outside the coalescer's lock (it can
/// block on a slow filesystem); only the admission decision itself runs
/// under the lock, matching [`Coalescer::admit`]'s contract.
pub fn run(mut rendezvous: Rendezvous, coalescer: &Coalescer, shutdown: &AtomicBool) -> DaemonResult<()> {
    loop {
        if shutdown.load(Ordering::Acquire) {
            return Ok(());
        }

        let request = rendezvous.read_request()?;
        if request.client_pid == WAKEUP_CLIENT_PID {
            continue;
        }

        let (mtime, filesize, deferred_err) = match fs::metadata(&request.pathname) {
            Ok(meta) => (mtime_secs(&meta), meta.len(), None),
            Err(err) => {
                warn!(component = "dispatcher", pathname = %request.pathname, %err, "stat failed");
                (0, 0, Some(ErrorCode::Stat))
            }
        };

        let outcome = coalescer.admit(&request.pathname, mtime, filesize, deferred_err, request.client_pid);
        info!(
            component = "dispatcher",
            pathname = %request.pathname,
            client_pid = request.client_pid,
            ?outcome,
            "admitted request"
        );
    }
}

#[cfg(unix)]
fn mtime_secs(meta: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime()
}

#[cfg(not(unix))]
fn mtime_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::RequestRecord;
    use std::io::Write;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn shutdown_flag_stops_the_loop_without_a_request() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rendezvous");
        let rendezvous = Rendezvous::create(&path).unwrap();
        let coalescer = Coalescer::new();
        let shutdown = AtomicBool::new(true);

        run(rendezvous, &coalescer, &shutdown).unwrap();
    }

    #[test]
    fn wakeup_request_unblocks_a_blocked_read_without_being_admitted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rendezvous");
        let rendezvous = Rendezvous::create(&path).unwrap();
        let coalescer = Coalescer::new();
        let shutdown = AtomicBool::new(false);

        thread::scope(|scope| {
            let dispatcher = scope.spawn(|| run(rendezvous, &coalescer, &shutdown));

            // Give the dispatcher time to reach its blocking read before
            // waking it, so this exercises the unblock path rather than the
            // up-front shutdown check.
            thread::sleep(std::time::Duration::from_millis(50));
            shutdown.store(true, Ordering::Release);
            let mut pipe = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            let wakeup = RequestRecord::new(WAKEUP_CLIENT_PID, "").unwrap();
            pipe.write_all(&wakeup.to_bytes()).unwrap();

            dispatcher.join().unwrap().unwrap();
        });

        assert_eq!(coalescer.pending_len(), 0);
    }
}
