//! The client side of the rendezvous protocol: argument parsing and the
//! request/response round trip over named pipes.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use protocol::{ErrorCode, RequestRecord, ResponseRecord, RESPONSE_RECORD_SIZE};

use crate::error::ClientError;

/// Mirrors [`protocol::DEFAULT_RENDEZVOUS_PATH`]; kept as a literal because
/// `clap`'s `default_value` attribute requires one. A test below asserts
/// the two stay in sync.
const DEFAULT_RENDEZVOUS_PATH: &str = "/tmp/sha256d.fifo";

/// Mirrors [`protocol::DEFAULT_CLIENT_FIFO_PREFIX`]; see
/// [`DEFAULT_RENDEZVOUS_PATH`] for why this is a literal.
const DEFAULT_CLIENT_FIFO_PREFIX: &str = "/tmp/sha256d.client.";

/// `sha256-client`'s command-line surface.
#[derive(Debug, Parser)]
#[command(name = "sha256-client", about = "Ask the sha256d server for a file's digest")]
pub struct ClientArgs {
    /// Pathname to hash, as seen by the server.
    pub pathname: PathBuf,

    /// Rendezvous pipe to contact. Must match the server's.
    #[arg(long, default_value = DEFAULT_RENDEZVOUS_PATH)]
    pub rendezvous_path: PathBuf,

    /// Prefix used to build this client's own return-channel FIFO.
    #[arg(long, default_value = DEFAULT_CLIENT_FIFO_PREFIX)]
    pub client_fifo_prefix: String,

    /// Increase log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved client configuration, independent of `clap`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pathname to request the digest of.
    pub pathname: PathBuf,
    /// Rendezvous pipe to contact.
    pub rendezvous_path: PathBuf,
    /// Prefix used to build this client's own return-channel FIFO.
    pub client_fifo_prefix: String,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            pathname: args.pathname,
            rendezvous_path: args.rendezvous_path,
            client_fifo_prefix: args.client_fifo_prefix,
        }
    }
}

/// Sends one request and blocks for the response, as a plain function so
/// the round trip is testable without going through a binary.
///
/// # Errors
///
/// Returns a [`ClientError`] if the pathname does not fit the wire format,
/// the return channel cannot be created, the request cannot be sent, the
/// response cannot be read, or the server reports a per-request failure.
pub fn request_digest(config: &ClientConfig) -> Result<[u8; 64], ClientError> {
    let pathname = config
        .pathname
        .to_str()
        .ok_or_else(|| ClientError::PathnameTooLong(config.pathname.clone()))?;

    let client_pid = std::process::id() as i32;
    let request = RequestRecord::new(client_pid, pathname)?;

    let reply_path = PathBuf::from(protocol::client_fifo_path(&config.client_fifo_prefix, client_pid));
    let _ = fs::remove_file(&reply_path);
    fifo::mkfifo(&reply_path, 0o600).map_err(|source| ClientError::CreateReturnChannel {
        path: reply_path.clone(),
        source,
    })?;

    let result = send_and_receive(config, &request, &reply_path);
    let _ = fs::remove_file(&reply_path);
    result
}

fn send_and_receive(
    config: &ClientConfig,
    request: &RequestRecord,
    reply_path: &PathBuf,
) -> Result<[u8; 64], ClientError> {
    let mut pipe = fs::OpenOptions::new()
        .write(true)
        .open(&config.rendezvous_path)
        .map_err(|source| ClientError::SendRequest {
            path: config.rendezvous_path.clone(),
            source,
        })?;
    pipe.write_all(&request.to_bytes()).map_err(|source| ClientError::SendRequest {
        path: config.rendezvous_path.clone(),
        source,
    })?;
    drop(pipe);

    let mut reply = fs::File::open(reply_path).map_err(|source| ClientError::ReadResponse {
        path: reply_path.clone(),
        source,
    })?;
    let mut buf = [0u8; RESPONSE_RECORD_SIZE];
    reply.read_exact(&mut buf).map_err(|source| ClientError::ReadResponse {
        path: reply_path.clone(),
        source,
    })?;

    let response = ResponseRecord::from_bytes(&buf)?;
    if response.err_code.is_failure() {
        return Err(ClientError::Server(response.err_code));
    }
    Ok(response.hash)
}

/// Entry point for `bin/sha256-client`: parses `args`, performs the round
/// trip, and writes the outcome to `stdout`/`stderr`.
pub fn run<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let parsed = match ClientArgs::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(clap_err) => {
            let _ = write!(stderr, "{clap_err}");
            return clap_err.exit_code_for_cli();
        }
    };

    logging::init(logging::Verbosity::from_count(parsed.verbose));
    let config = ClientConfig::from(parsed);

    match request_digest(&config) {
        Ok(hash) => {
            let hash_str = std::str::from_utf8(&hash).unwrap_or("<invalid-hash>");
            let _ = writeln!(stdout, "{hash_str}  {}", config.pathname.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            let _ = writeln!(stderr, "sha256-client: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

/// Small shim so a `clap::Error`'s own exit-code convention (0 for
/// `--help`/`--version`, 2 otherwise) is reusable from both binaries' entry
/// points.
pub(crate) trait ClapExitCodeExt {
    fn exit_code_for_cli(&self) -> ExitCode;
}

impl ClapExitCodeExt for clap::Error {
    fn exit_code_for_cli(&self) -> ExitCode {
        if self.exit_code() == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn request_digest_round_trips_through_real_fifos() {
        let dir = tempfile::tempdir().unwrap();
        let rendezvous_path = dir.path().join("rendezvous");
        fifo::mkfifo(&rendezvous_path, 0o600).unwrap();

        let config = ClientConfig {
            pathname: dir.path().join("irrelevant-for-this-test"),
            rendezvous_path: rendezvous_path.clone(),
            client_fifo_prefix: format!("{}/client.", dir.path().display()),
        };

        // Fake server: read the request, hand back a canned success
        // response without touching the filesystem.
        let server_rendezvous = rendezvous_path.clone();
        let prefix = config.client_fifo_prefix.clone();
        let server = thread::spawn(move || {
            let mut reader = fs::File::open(&server_rendezvous).unwrap();
            let mut buf = [0u8; protocol::REQUEST_RECORD_SIZE];
            reader.read_exact(&mut buf).unwrap();
            let request = RequestRecord::from_bytes(&buf).unwrap();

            let reply_path = protocol::client_fifo_path(&prefix, request.client_pid);
            let response = ResponseRecord::success(&[0xAB; 32]);
            let mut writer = fs::OpenOptions::new().write(true).open(&reply_path).unwrap();
            writer.write_all(&response.to_bytes()).unwrap();
        });

        let hash = request_digest(&config).unwrap();
        assert_eq!(std::str::from_utf8(&hash).unwrap(), "ab".repeat(32));
        server.join().unwrap();
    }

    #[test]
    fn request_digest_surfaces_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let rendezvous_path = dir.path().join("rendezvous");
        fifo::mkfifo(&rendezvous_path, 0o600).unwrap();

        let config = ClientConfig {
            pathname: dir.path().join("missing"),
            rendezvous_path: rendezvous_path.clone(),
            client_fifo_prefix: format!("{}/client.", dir.path().display()),
        };

        let server_rendezvous = rendezvous_path.clone();
        let prefix = config.client_fifo_prefix.clone();
        let server = thread::spawn(move || {
            let mut reader = fs::File::open(&server_rendezvous).unwrap();
            let mut buf = [0u8; protocol::REQUEST_RECORD_SIZE];
            reader.read_exact(&mut buf).unwrap();
            let request = RequestRecord::from_bytes(&buf).unwrap();

            let reply_path = protocol::client_fifo_path(&prefix, request.client_pid);
            let response = ResponseRecord::failure(ErrorCode::Stat);
            let mut writer = fs::OpenOptions::new().write(true).open(&reply_path).unwrap();
            writer.write_all(&response.to_bytes()).unwrap();
        });

        let err = request_digest(&config).unwrap_err();
        assert!(matches!(err, ClientError::Server(ErrorCode::Stat)));
        server.join().unwrap();
    }
}
