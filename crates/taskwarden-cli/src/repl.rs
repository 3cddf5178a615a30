//! REPL – Read-Eval-Print Loop for the TaskWarden interactive shell.
//!
//! Supported slash-commands:
//!   /help                                   – show this list
//!   /list [json]                            – list supervised tasks
//!   /spawn <name> [priority] [core|any] [stack] – add a kicking unit
//!   /stall <name>                           – add a unit that never kicks
//!   /kick <name>                            – kick a task's watchdog
//!   /remove <name>                          – stop supervising and destroy a task
//!   /demo multi | lifecycle                 – start a demo workload
//!   /quit | /exit                           – tear everything down and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use taskwarden_runtime::{Supervisor, TaskRegistry, UnitHealth};
use taskwarden_types::{CoreAffinity, TaskError, UnitId, UnitSpec};

use crate::config::Config;
use crate::scenarios;

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(supervisor: &Supervisor, cfg: &Config, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let registry = supervisor.registry();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "taskwarden>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match cmd {
            "/help" => cmd_help(),
            "/list" => cmd_list(supervisor, args.first() == Some(&"json")),
            "/spawn" => cmd_spawn(&registry, cfg, &args),
            "/stall" => cmd_stall(&registry, cfg, &args),
            "/kick" => cmd_kick(&registry, &args),
            "/remove" => cmd_remove(&registry, &args),
            "/demo" => cmd_demo(&registry, &args),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "TaskWarden Commands".bold().underline());
    println!("  {}  – list supervised tasks", "/list [json]".bold().cyan());
    println!(
        "  {}  – add a unit that kicks its watchdog",
        "/spawn <name> [priority] [core|any] [stack]".bold().cyan()
    );
    println!("  {}  – add a unit that never kicks", "/stall <name>".bold().cyan());
    println!("  {}  – kick a task's watchdog", "/kick <name>".bold().cyan());
    println!("  {}  – stop supervising and destroy a task", "/remove <name>".bold().cyan());
    println!("  {}  – start a demo workload", "/demo multi|lifecycle".bold().cyan());
    println!("  {}  – tear down all tasks and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_list(supervisor: &Supervisor, json: bool) {
    let tasks = supervisor.registry().snapshot();

    if json {
        match serde_json::to_string_pretty(&tasks) {
            Ok(out) => println!("{out}"),
            Err(e) => println!("{}: {}", "Serialization error".red(), e),
        }
        return;
    }

    if tasks.is_empty() {
        println!("  {}", "No supervised tasks.".dimmed());
        return;
    }

    println!(
        "  {:<16} {:<9} {:>8} {:<8} {:>7}  {:<9} {}",
        "NAME", "UNIT", "PRIORITY", "CORE", "STACK", "HEALTH", "CREATED"
    );
    for task in &tasks {
        let health = match supervisor.watchdog().health(task.unit_id) {
            UnitHealth::Healthy => "healthy".green(),
            UnitHealth::TimedOut => "timed out".red().bold(),
        };
        println!(
            "  {:<16} {:<9} {:>8} {:<8} {:>7}  {:<9} {}",
            task.name.bold(),
            task.unit_id.to_string(),
            task.priority,
            task.core_affinity.to_string(),
            task.stack_size,
            health,
            task.created_at.format("%H:%M:%S").to_string().dimmed()
        );
    }
}

fn cmd_spawn(registry: &Arc<TaskRegistry>, cfg: &Config, args: &[&str]) {
    let spec = match parse_spawn_args(args, cfg) {
        Ok(spec) => spec,
        Err(msg) => {
            println!("{}: {}", "Usage error".red(), msg);
            return;
        }
    };
    let name = spec.name.clone();
    report_added(&name, scenarios::spawn_heartbeat(registry, spec, cfg.kick_interval()));
}

fn cmd_stall(registry: &Arc<TaskRegistry>, cfg: &Config, args: &[&str]) {
    let Some(name) = args.first() else {
        println!("{}: /stall <name>", "Usage".red());
        return;
    };
    let spec = UnitSpec::new(*name)
        .priority(cfg.default_priority)
        .stack_size(cfg.default_stack_size);
    report_added(name, scenarios::spawn_stalled(registry, spec));
    println!(
        "  {} expect a watchdog report in about {} ms",
        "!".yellow().bold(),
        cfg.watchdog_timeout_ms
    );
}

fn cmd_kick(registry: &TaskRegistry, args: &[&str]) {
    let Some(name) = args.first() else {
        println!("{}: /kick <name>", "Usage".red());
        return;
    };
    match registry.kick(name) {
        Ok(()) => println!("  {} kicked {}", "✓".green().bold(), name.bold()),
        Err(e) => report_error(&e),
    }
}

fn cmd_remove(registry: &TaskRegistry, args: &[&str]) {
    let Some(name) = args.first() else {
        println!("{}: /remove <name>", "Usage".red());
        return;
    };
    match registry.remove(name) {
        Ok(()) => println!("  {} removed {}", "✓".green().bold(), name.bold()),
        Err(e) => report_error(&e),
    }
}

fn cmd_demo(registry: &Arc<TaskRegistry>, args: &[&str]) {
    match args.first().copied() {
        Some("multi") => {
            for (name, result) in scenarios::start_multi(registry) {
                report_added(&name, result);
            }
        }
        Some("lifecycle") => {
            report_added(scenarios::LIFECYCLE_MANAGER, scenarios::start_lifecycle(registry));
            println!(
                "  {}",
                "Workers are created, removed and re-created every few seconds; watch the log."
                    .dimmed()
            );
        }
        _ => println!("{}: /demo multi|lifecycle", "Usage".red()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn report_added(name: &str, result: Result<UnitId, TaskError>) {
    match result {
        Ok(id) => println!("  {} {} supervised as {}", "✓".green().bold(), name.bold(), id),
        Err(e) => report_error(&e),
    }
}

fn report_error(e: &TaskError) {
    println!("  {} {}", "✗".red().bold(), e);
}

/// Parse `<name> [priority] [core|any] [stack]` using `cfg` for omitted values.
fn parse_spawn_args(args: &[&str], cfg: &Config) -> Result<UnitSpec, String> {
    let Some(name) = args.first() else {
        return Err("/spawn <name> [priority] [core|any] [stack]".to_string());
    };
    let mut spec = UnitSpec::new(*name)
        .priority(cfg.default_priority)
        .stack_size(cfg.default_stack_size);

    if let Some(raw) = args.get(1) {
        spec.priority = raw
            .parse()
            .map_err(|_| format!("invalid priority '{raw}'"))?;
    }
    if let Some(raw) = args.get(2) {
        spec.core_affinity = parse_core(raw).ok_or_else(|| format!("invalid core '{raw}'"))?;
    }
    if let Some(raw) = args.get(3) {
        spec.stack_size = raw
            .parse()
            .map_err(|_| format!("invalid stack size '{raw}'"))?;
    }
    Ok(spec)
}

/// Accepts `any`, `0`, `core0`, `1`, `core1`, …
fn parse_core(raw: &str) -> Option<CoreAffinity> {
    if raw.eq_ignore_ascii_case("any") {
        return Some(CoreAffinity::Any);
    }
    let digits = raw.strip_prefix("core").unwrap_or(raw);
    digits.parse().ok().map(CoreAffinity::Core)
}
