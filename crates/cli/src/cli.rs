//! The argv surface (spec §6 "CLI surface"). Grounded in the teacher's
//! `commands::daemon::DaemonArgs`/`DaemonCommand` derive pattern, flattened
//! into one top-level parser since this binary has a single daemon mode
//! plus a handful of remote commands rather than a verb-per-subsystem tree.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vigild", version, about = "Service supervisor and monitor daemon")]
pub struct Cli {
    /// Control file (spec §6 `-c <path>`)
    #[arg(short = 'c', long = "control-file", default_value = "/etc/vigil/vigilrc")]
    pub control_file: PathBuf,

    /// Run as a daemon, polling every N seconds (spec §6 `-d <seconds>`)
    #[arg(short = 'd', long = "daemon")]
    pub daemon_interval: Option<u64>,

    /// Restrict actions to services in this group (spec §6 `-g <group>`)
    #[arg(short = 'g', long = "group")]
    pub group: Option<String>,

    /// Log destination: a file path, or the literal `syslog` (spec §6 `-l`)
    #[arg(short = 'l', long = "logfile")]
    pub log_file: Option<String>,

    /// PID file path (spec §6 `-p <pidfile>`)
    #[arg(short = 'p', long = "pidfile", default_value = "/var/run/vigil.pid")]
    pub pid_file: PathBuf,

    /// State snapshot file path (spec §6 `-s <statefile>`)
    #[arg(short = 's', long = "statefile", default_value = "/var/lib/vigil/state")]
    pub state_file: PathBuf,

    /// Run in the foreground rather than detaching (spec §6 `-I`)
    #[arg(short = 'I', long = "foreground")]
    pub foreground: bool,

    /// Increase verbosity; repeatable (spec §6 `-v`/`-vv`)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Batch mode: no interactive prompts (spec §6 `-B`)
    #[arg(short = 'B', long = "batch")]
    pub batch: bool,

    /// Print the identity token's SHA1 and MD5 digest, then exit (spec §6 `-H [file]`)
    #[arg(short = 'H', long = "hash", num_args = 0..=1, value_name = "FILE")]
    pub hash: Option<Option<PathBuf>>,

    /// Print the identity token and exit (spec §6 `--id`)
    #[arg(long = "id")]
    pub print_id: bool,

    /// Regenerate the identity token and exit (spec §6 `--resetid`)
    #[arg(long = "resetid")]
    pub reset_id: bool,

    /// Parse the control file and exit without running (spec §6 `-t`)
    #[arg(short = 't', long = "test")]
    pub syntax_check: bool,

    /// Identity file path, independent of `-c`
    #[arg(long = "id-file", default_value = "/var/lib/vigil/id")]
    pub identity_file: PathBuf,

    /// Event queue directory
    #[arg(long = "queue-dir", default_value = "/var/lib/vigil/events")]
    pub event_queue_dir: PathBuf,

    /// Address the HTTP control surface binds to, or (in client mode) connects to
    #[arg(long = "http", default_value = "127.0.0.1:2812")]
    pub http_addr: SocketAddr,

    /// Basic-auth credentials for client-mode requests, `user:pass`
    #[arg(long = "credentials", value_name = "USER:PASS")]
    pub credentials: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Start a Service, or `all`
    Start { name: String },
    /// Stop a Service, or `all`
    Stop { name: String },
    /// Restart a Service, or `all`
    Restart { name: String },
    /// Enable monitoring on a Service, or `all`
    Monitor { name: String },
    /// Disable monitoring on a Service, or `all`
    Unmonitor { name: String },
    /// Ask the daemon to reload its control file
    Reload,
    /// Print per-service status, optionally filtered to one name
    Status { name: Option<String> },
    /// Print the aggregate summary, optionally filtered to one name
    Summary { name: Option<String> },
    /// Print a report, optionally filtered to up|down|initializing|unmonitored|total
    Report { filter: Option<String> },
    /// List processes whose argv matches `pattern`
    Procmatch { pattern: String },
    /// Ask the daemon to stop
    Quit,
    /// Parse the control file and report whether it is valid
    Validate,
}

impl Cli {
    pub fn credentials(&self) -> Option<(String, String)> {
        let raw = self.credentials.as_ref()?;
        let (user, pass) = raw.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }
}
