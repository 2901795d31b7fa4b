//! The server side of the rendezvous protocol: argument parsing and the
//! thin entry point that hands off to [`daemon::run`].

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use daemon::Config;

use crate::client::ClapExitCodeExt;

/// Mirrors [`protocol::DEFAULT_RENDEZVOUS_PATH`]; kept as a literal because
/// `clap`'s `default_value` attribute requires one. A test below asserts
/// the two stay in sync.
const DEFAULT_RENDEZVOUS_PATH: &str = "/tmp/sha256d.fifo";

/// Mirrors [`protocol::DEFAULT_CLIENT_FIFO_PREFIX`]; see
/// [`DEFAULT_RENDEZVOUS_PATH`] for why this is a literal.
const DEFAULT_CLIENT_FIFO_PREFIX: &str = "/tmp/sha256d.client.";

/// `sha256-server`'s command-line surface.
#[derive(Debug, Parser)]
#[command(name = "sha256-server", about = "Serve SHA-256 digests over a rendezvous named pipe")]
pub struct ServerArgs {
    /// Rendezvous pipe clients connect to.
    #[arg(long, default_value = DEFAULT_RENDEZVOUS_PATH)]
    pub rendezvous_path: std::path::PathBuf,

    /// Prefix clients use to build their own return-channel FIFOs.
    #[arg(long, default_value = DEFAULT_CLIENT_FIFO_PREFIX)]
    pub client_fifo_prefix: String,

    /// Number of worker threads. Defaults to one per online CPU minus one.
    #[arg(long, default_value_t = Config::default_thread_count())]
    pub threads: usize,

    /// Number of buckets in the digest cache. Must be a power of two.
    #[arg(long, default_value_t = cache::DEFAULT_BUCKET_COUNT)]
    pub cache_buckets: usize,

    /// Increase log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but warning-and-above log output.
    #[arg(short, long)]
    pub quiet: bool,
}

impl From<ServerArgs> for Config {
    fn from(args: ServerArgs) -> Self {
        Self {
            rendezvous_path: args.rendezvous_path,
            client_fifo_prefix: args.client_fifo_prefix,
            threads: args.threads,
            cache_buckets: args.cache_buckets,
        }
    }
}

/// Entry point for `bin/sha256-server`: parses `args`, starts the server,
/// and runs until shutdown, writing failures to `stderr`.
pub fn run<I, Err>(args: I, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
    Err: Write,
{
    let parsed = match ServerArgs::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(clap_err) => {
            let _ = write!(stderr, "{clap_err}");
            return clap_err.exit_code_for_cli();
        }
    };

    let verbosity = if parsed.quiet {
        logging::Verbosity::quiet()
    } else {
        logging::Verbosity::from_count(parsed.verbose)
    };
    logging::init(verbosity);

    let config = Config::from(parsed);
    match daemon::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(stderr, "sha256-server: {err}");
            ExitCode::FAILURE
        }
    }
}
