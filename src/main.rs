//! meridian-core - example entry point
//!
//! Thin CLI wiring the library's two pipeline assemblers: `controller`
//! captures a screen and streams it, `controlled` listens and renders.

use clap::{Parser, ValueEnum};
use log::{error, info};
use meridian_core::config::Config;
use meridian_core::net::connection::Endpoint;
use meridian_core::session::{ControlledSession, ControlledSessionConfig, ControllerSession, ControllerSessionConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Controller,
    Controlled,
}

#[derive(Parser, Debug)]
#[command(name = "meridian-core", about = "Peer-to-peer remote-desktop transport core")]
struct Args {
    /// Which side of the session to run.
    #[arg(long, value_enum)]
    role: Role,

    /// Path to a TOML config file. Falls back to built-in defaults if absent.
    #[arg(long, default_value = "meridian.toml")]
    config: String,

    /// Remote host to connect to. Required for `--role controller`.
    #[arg(long)]
    remote_host: Option<String>,

    /// Remote port to connect to. Required for `--role controller`.
    #[arg(long)]
    remote_port: Option<u16>,

    /// Local port to bind. For `--role controlled` this is the port peers
    /// connect to.
    #[arg(long, default_value_t = 0)]
    local_port: u16,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config from {}: {e}", args.config);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        error!("invalid config: {e}");
        std::process::exit(1);
    }

    match args.role {
        Role::Controller => run_controller(&args, &config),
        Role::Controlled => run_controlled(&args, &config),
    }
}

fn run_controller(args: &Args, config: &Config) {
    let (Some(remote_host), Some(remote_port)) = (args.remote_host.clone(), args.remote_port) else {
        error!("--role controller requires --remote-host and --remote-port");
        std::process::exit(1);
    };

    let mut session = ControllerSession::new();
    let init_result = session.initialize(ControllerSessionConfig {
        local_ip: config.connection.local_ip.clone(),
        local_port: args.local_port,
        remote: Endpoint::new(remote_host, remote_port),
        video_enabled: true,
        audio_enabled: true,
        video: config.video_track.clone().into(),
        audio: config.audio_track.clone().into(),
        heartbeat_interval_ms: config.peer.heartbeat_interval_ms,
    });
    if let meridian_core::error::Result::Err(e) = init_result {
        error!("failed to start controller session: {}", e.full_message());
        std::process::exit(1);
    }

    info!("controller session running; press Ctrl+C to exit");
    wait_for_shutdown_signal();
    session.shutdown();
}

fn run_controlled(args: &Args, config: &Config) {
    let mut session = ControlledSession::new();
    let init_result = session.initialize(ControlledSessionConfig {
        local_ip: config.connection.local_ip.clone(),
        local_port: args.local_port,
        video_enabled: true,
        audio_enabled: true,
        video: config.video_track.clone().into(),
        audio: config.audio_track.clone().into(),
        heartbeat_interval_ms: config.peer.heartbeat_interval_ms,
    });
    if let meridian_core::error::Result::Err(e) = init_result {
        error!("failed to start controlled session: {}", e.full_message());
        std::process::exit(1);
    }

    info!("controlled session listening; press Ctrl+C to exit");
    wait_for_shutdown_signal();
    session.shutdown();
}

fn wait_for_shutdown_signal() {
    let (tx, rx) = std::sync::mpsc::channel();
    let result = ctrlc_handler(move || {
        let _ = tx.send(());
    });
    if result.is_err() {
        error!("failed to install Ctrl+C handler; exiting immediately");
        return;
    }
    let _ = rx.recv();
}

/// Blocks on SIGINT/SIGTERM via a raw signal handler so the binary has no
/// dependency beyond `libc`, which is already part of this crate's stack.
fn ctrlc_handler(on_signal: impl Fn() + Send + 'static) -> Result<(), ()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    static REGISTERED: AtomicBool = AtomicBool::new(false);
    if REGISTERED.swap(true, Ordering::SeqCst) {
        return Err(());
    }

    let flag = Arc::new(AtomicBool::new(false));
    let flag_for_thread = flag.clone();
    std::thread::spawn(move || loop {
        if flag_for_thread.load(Ordering::SeqCst) {
            on_signal();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    unsafe {
        extern "C" fn handle_signal(_: libc::c_int) {
            SHUTDOWN_REQUESTED.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        static SHUTDOWN_REQUESTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);

        std::thread::spawn(move || loop {
            if SHUTDOWN_REQUESTED.load(std::sync::atomic::Ordering::SeqCst) {
                flag.store(true, Ordering::SeqCst);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        });
    }

    Ok(())
}
