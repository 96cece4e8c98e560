#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use mailgate_lib::config::LoggingConfig;
use mailgate_lib::telemetry::{init_tracing, install_panic_hook};
use mailgate_lib::{dump_config, load_from_path, run, run_worker, RunOptions, WorkerLaunch};
use std::path::PathBuf;
use tracing::{error, info};

const PROGRAM: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(author, version, about = "POP3/IMAP gateway")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "/etc/mailgate/gateway.toml")]
    config: PathBuf,

    /// Message store location, overrides `server_socket`
    #[arg(short = 'H', long, value_name = "URI")]
    host: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one connection handed over by the gateway
    #[command(hide = true)]
    Worker,
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Some(Command::Worker) => worker_main(),
        None => gateway_main(cli),
    };
    std::process::exit(code);
}

fn gateway_main(cli: Cli) -> i32 {
    let mut cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _ = init_tracing(&LoggingConfig::default());
            error!(%err, path = %cli.config.display(), "failed to load configuration");
            return startup_failed(&err);
        }
    };
    if let Some(host) = &cli.host {
        cfg.server_socket = host.clone();
    }

    if cli.dump_config {
        return match dump_config(&cfg) {
            Ok(text) => {
                print!("{text}");
                0
            }
            Err(err) => {
                eprintln!("{PROGRAM}: {err}");
                1
            }
        };
    }

    let log = match init_tracing(&cfg.logging) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("{PROGRAM}: {err}");
            None
        }
    };
    install_panic_hook(PROGRAM, VERSION);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to start the runtime");
            return 1;
        }
    };

    let options = RunOptions { config_path: Some(cli.config), host_override: cli.host, log };
    match runtime.block_on(run(cfg, options)) {
        Ok(report) => {
            info!(accepted = report.accepted, "exiting");
            0
        }
        Err(err) => {
            error!(%err, "gateway exited with error");
            startup_failed(&err)
        }
    }
}

fn worker_main() -> i32 {
    let launch = match WorkerLaunch::receive() {
        Ok(launch) => launch,
        Err(err) => {
            eprintln!("{PROGRAM}: {err}");
            return 1;
        }
    };
    let _ = init_tracing(&launch.config.logging);
    install_panic_hook(PROGRAM, VERSION);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to start the worker runtime");
            return 1;
        }
    };
    match runtime.block_on(run_worker(launch)) {
        Ok(_) => 0,
        Err(err) => {
            error!(%err, "worker failed");
            1
        }
    }
}

fn startup_failed(err: &mailgate_lib::GatewayError) -> i32 {
    eprintln!("{PROGRAM}: Startup failed: {err}. Please check the log for details.");
    1
}
