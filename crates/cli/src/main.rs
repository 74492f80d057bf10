//! `vigild`: parses the argv surface (spec §6) and either runs the daemon
//! main loop or issues a client-mode request against a running daemon's
//! HTTP control surface.

mod cli;
mod client;
mod cycle;
mod daemon;

use std::io::Write;

use clap::Parser;
use cli::{Cli, Command};
use sha1::Digest;

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let exit_code = run(cli);
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> i32 {
    if cli.reset_id {
        return match vigil_store::identity_file::reset(&cli.identity_file) {
            Ok(id) => {
                println!("{id}");
                0
            }
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        };
    }

    if cli.print_id {
        return match vigil_store::identity_file::load_or_create(&cli.identity_file) {
            Ok(id) => {
                println!("{id}");
                0
            }
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        };
    }

    if let Some(target) = &cli.hash {
        return print_hash(target.as_deref().unwrap_or(&cli.control_file));
    }

    if cli.syntax_check {
        return match vigil_config::load_file(&cli.control_file) {
            Ok(graph) => {
                println!("control file OK ({} services)", graph.len());
                0
            }
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        };
    }

    if let Some(interval) = cli.daemon_interval {
        return run_daemon(&cli, interval);
    }

    match cli.command.clone() {
        Some(command) => run_client_command(&cli, command),
        None => {
            eprintln!("error: no command given; pass -d <seconds> to run as a daemon, or a command (see --help)");
            1
        }
    }
}

fn run_daemon(cli: &Cli, interval: u64) -> i32 {
    let options = daemon::DaemonOptions {
        paths: daemon::Paths {
            control_file: cli.control_file.clone(),
            pid_file: cli.pid_file.clone(),
            state_file: cli.state_file.clone(),
            identity_file: cli.identity_file.clone(),
            event_queue_dir: cli.event_queue_dir.clone(),
        },
        poll_interval: std::time::Duration::from_secs(interval),
        foreground: cli.foreground,
        http_addr: cli.http_addr,
        auth: cli.credentials().map(|(user, pass)| vigil_control::AuthConfig { read_write: Some((user, pass)), read_only: None, allow_nets: Vec::new() }).unwrap_or_default(),
    };
    match daemon::run(options) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

fn run_client_command(cli: &Cli, command: Command) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    runtime.block_on(dispatch(cli, command))
}

async fn dispatch(cli: &Cli, command: Command) -> i32 {
    let client = client::Client::new(cli.http_addr, cli.credentials());

    let result = match command {
        Command::Start { name } => client.do_action(&name, "start").await.map(|()| println!("OK")),
        Command::Stop { name } => client.do_action(&name, "stop").await.map(|()| println!("OK")),
        Command::Restart { name } => client.do_action(&name, "restart").await.map(|()| println!("OK")),
        Command::Monitor { name } => client.do_action(&name, "monitor").await.map(|()| println!("OK")),
        Command::Unmonitor { name } => client.do_action(&name, "unmonitor").await.map(|()| println!("OK")),
        Command::Reload => client.reload().await.map(|()| println!("OK")),
        Command::Quit => client.quit().await.map(|()| println!("OK")),
        Command::Status { name } => match client.status().await {
            Ok(services) => {
                for svc in services.iter().filter(|s| name.as_deref().is_none_or(|n| n == s.name)) {
                    let pid = svc.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
                    let monitored = if svc.monitored { "monitored" } else { "not monitored" };
                    let pending = svc.pending_action.as_deref().map(|a| format!(" pending={a}")).unwrap_or_default();
                    println!("{:<20} {:<10} {:<12} {monitored} pid={pid}{pending}", svc.name, svc.kind, svc.state);
                }
                Ok(())
            }
            Err(err) => Err(err),
        },
        Command::Summary { name } => {
            let _ = name;
            client.summary().await.map(|s| println!("total={} up={} down={} initializing={} unmonitored={}", s.total, s.up, s.down, s.initializing, s.unmonitored))
        }
        Command::Report { filter } => client.report(filter.as_deref()).await.map(|s| println!("total={} up={} down={} initializing={} unmonitored={}", s.total, s.up, s.down, s.initializing, s.unmonitored)),
        Command::Procmatch { pattern } => {
            use vigil_probes::ProcessCollector;
            let collector = vigil_probes::LinuxProcessCollector;
            match collector.find_by_pattern(&pattern) {
                Ok(pids) => {
                    for pid in pids {
                        println!("{pid}");
                    }
                    Ok(())
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    return 1;
                }
            }
        }
        Command::Validate => match vigil_config::load_file(&cli.control_file) {
            Ok(graph) => {
                println!("control file OK ({} services)", graph.len());
                Ok(())
            }
            Err(err) => {
                eprintln!("error: {err}");
                return 1;
            }
        },
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn print_hash(path: &std::path::Path) -> i32 {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };

    let sha1 = {
        let mut hasher = sha1::Sha1::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    };
    let md5 = {
        let mut hasher = md5::Md5::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "SHA1({}) = {sha1}", path.display());
    let _ = writeln!(out, "MD5({}) = {md5}", path.display());
    0
}
