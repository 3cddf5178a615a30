//! `taskwarden` – TaskWarden Command Line Interface
//!
//! This binary hosts a supervised task registry on the local machine.  It:
//!
//! 1. Loads `~/.taskwarden/config.toml`, writing the defaults on first run.
//! 2. Starts a [`Supervisor`] over the host thread backend, so every unit is
//!    an OS thread watched by a software watchdog.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/list`, `/spawn`, `/kick`, `/remove`, `/demo`, `/help`).
//! 4. Intercepts **Ctrl-C** to tear down every supervised task and exit.

mod config;
mod repl;
mod scenarios;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use taskwarden_hal::ThreadProvider;
use taskwarden_runtime::Supervisor;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); TASKWARDEN_LOG_FORMAT=json switches
    // to JSON lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    // User-facing output still uses println!.
    let _otel_guard = taskwarden_runtime::init_tracing("taskwarden");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => write_default_config(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Supervisor ────────────────────────────────────────────────────────
    let mut supervisor = match Supervisor::start(cfg.supervisor_config(), Arc::new(ThreadProvider::new())) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start supervisor".red(), e);
            std::process::exit(1);
        }
    };
    let tunables = cfg.supervisor_config();
    println!(
        "  Watchdog timeout {} ms, {} subscription slots.",
        tunables.watchdog_timeout.as_millis().to_string().bold(),
        tunables.max_subscribers.to_string().bold()
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // The REPL blocks on stdin, so the handler tears down the registry itself
    // and exits instead of waiting for the prompt loop to notice the flag.
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let registry = supervisor.registry();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – tearing down supervised tasks …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        registry.teardown();
        println!("{}", "  ✓ All tasks removed.".green());
        println!("{}", "  ✓ Exiting TaskWarden.".green());
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; tasks are only torn down on /quit");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&supervisor, &cfg, shutdown);
    supervisor.shutdown();
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn write_default_config() -> config::Config {
    let mut cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} No configuration found; defaults written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ______           __   _       __               __         "#.bold().cyan());
    println!("{}", r#" /_  __/___ ______/ /__| |     / /___ __________/ /__  ____ "#.bold().cyan());
    println!("{}", r#"  / / / __ `/ ___/ //_/| | /| / / __ `/ ___/ __  / _ \/ __ \"#.bold().cyan());
    println!("{}", r#" / / / /_/ (__  ) ,<   | |/ |/ / /_/ / /  / /_/ /  __/ / / /"#.bold().cyan());
    println!("{}", r#"/_/  \__,_/____/_/|_|  |__/|__/\__,_/_/   \__,_/\___/_/ /_/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "TaskWarden".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Supervised task registry with watchdog enforcement");
    println!();
}
