//! Publishing a response onto a client's per-request return channel.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use protocol::ResponseRecord;
use tracing::warn;

/// How long to wait between non-blocking open attempts in
/// [`publish_with_timeout`].
const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Writes `response` to the client FIFO at `path`, blocking until the
/// client's reader shows up.
///
/// The client is expected to have already created its FIFO and to be
/// blocked opening it read-only. Failures are returned to the caller rather
/// than logged here so workers can decide how loudly to report a vanished
/// client.
pub fn publish(path: &Path, response: &ResponseRecord) -> io::Result<()> {
    publish_with_timeout(path, response, None)
}

/// Writes `response` to the client FIFO at `path`, optionally bounding how
/// long to wait for the client's reader to show up.
///
/// With `timeout: None` this blocks exactly like [`publish`]. With
/// `timeout: Some(d)`, the open is attempted non-blocking and retried until
/// a reader appears or `d` elapses, at which point an
/// [`io::ErrorKind::TimedOut`] error is returned. Not used by the server by
/// default (see the crate's design notes on the optional timeout
/// extension); exercised directly by tests that need a deterministic wedge.
pub fn publish_with_timeout(
    path: &Path,
    response: &ResponseRecord,
    timeout: Option<Duration>,
) -> io::Result<()> {
    let Some(timeout) = timeout else {
        let mut pipe = OpenOptions::new().write(true).open(path)?;
        return pipe.write_all(&response.to_bytes());
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).custom_flags(libc::O_NONBLOCK).open(path) {
                Ok(mut pipe) => return pipe.write_all(&response.to_bytes()),
                Err(err) if err.raw_os_error() == Some(libc::ENXIO) => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "no reader opened the client return channel before the deadline",
                        ));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => return Err(err),
            }
        }
    }

    #[cfg(not(unix))]
    {
        let mut pipe = OpenOptions::new().write(true).open(path)?;
        pipe.write_all(&response.to_bytes())
    }
}

/// Publishes to every client waiting on a completed work item, logging but
/// not propagating per-client failures: one client vanishing (its process
/// died before reading the response) must not stop the others from being
/// served.
pub fn publish_to_clients(prefix: &str, client_pids: &[i32], response: &ResponseRecord) {
    for pid in client_pids {
        let path = protocol::client_fifo_path(prefix, *pid);
        if let Err(err) = publish(Path::new(&path), response) {
            warn!(component = "worker", pid, %err, "failed to publish response to client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ErrorCode;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn publish_delivers_response_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.fifo");
        fifo::mkfifo(&path, 0o600).unwrap();

        let response = ResponseRecord::success(&[9u8; 32]);
        let expected = response.to_bytes();

        let reader_path = path.clone();
        let reader = thread::spawn(move || {
            use std::io::Read;
            let mut file = std::fs::File::open(&reader_path).unwrap();
            let mut buf = vec![0u8; expected.len()];
            file.read_exact(&mut buf).unwrap();
            buf
        });

        publish(&path, &response).unwrap();
        let received = reader.join().unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn publish_with_timeout_times_out_with_no_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.fifo");
        fifo::mkfifo(&path, 0o600).unwrap();

        let response = ResponseRecord::success(&[1u8; 32]);
        let err = publish_with_timeout(&path, &response, Some(std::time::Duration::from_millis(50)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn publish_with_timeout_succeeds_once_a_reader_appears() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.fifo");
        fifo::mkfifo(&path, 0o600).unwrap();

        let response = ResponseRecord::success(&[2u8; 32]);
        let expected = response.to_bytes();

        let reader_path = path.clone();
        let reader = thread::spawn(move || {
            use std::io::Read;
            let mut file = std::fs::File::open(&reader_path).unwrap();
            let mut buf = vec![0u8; expected.len()];
            file.read_exact(&mut buf).unwrap();
            buf
        });

        publish_with_timeout(&path, &response, Some(std::time::Duration::from_secs(2))).unwrap();
        assert_eq!(reader.join().unwrap(), response.to_bytes());
    }

    #[test]
    fn publish_failure_on_missing_fifo_on_client_vanished() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.fifo");
        let response = ResponseRecord::failure(ErrorCode::Stat);
        assert!(publish(&path, &response).is_err());
    }
}
