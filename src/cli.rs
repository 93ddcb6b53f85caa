//! Command Line Interface (CLI) arguments.

use clap::Parser;

/// Hyperstack command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "HYPERSTACK_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "HYPERSTACK_PORT")]
    pub port: u16,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "HYPERSTACK_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "HYPERSTACK_USE_RAYON")]
    pub use_rayon: bool,
    /// Maximum number of concurrently running CPU-bound tasks. Defaults to the number of CPUs
    /// minus one.
    #[arg(long, env = "HYPERSTACK_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Maximum size in bytes of an uploaded image file.
    #[arg(long, default_value_t = 1 << 30, env = "HYPERSTACK_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,
    /// Maximum size in bytes of a decoded image.
    #[arg(long, default_value_t = 1 << 32, env = "HYPERSTACK_MAX_DECODED_BYTES")]
    pub max_decoded_bytes: usize,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
