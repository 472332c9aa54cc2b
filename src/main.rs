//! Brick Hospital CLI
//!
//! Usage:
//!   brick-hospital                          # Play in the terminal (type colours)
//!   brick-hospital --level L2               # Fixed-length level round
//!   brick-hospital --microbit               # Colours from a micro:bit over USB
//!   brick-hospital --devices                # List serial devices
//!   brick-hospital --listen                 # Print micro:bit colours only
//!   brick-hospital --serve                  # HTTP API server
//!   brick-hospital --json                   # JSON output

use clap::Parser;
use colored::{ColoredString, Colorize};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use brick_hospital::account::{resolve_user_id, LocalStore, RestUserDirectory, StaticUserDirectory, UserDirectory};
use brick_hospital::config::{load_config, AppConfig, CategorySet};
use brick_hospital::core::api::{build_session_config, NewSessionRequest};
use brick_hospital::core::{run_server, AppState, EventSender, GameSession, SessionHandle, SessionRunner};
use brick_hospital::device::{DeviceAdapter, SerialBackend, SystemSerialBackend};
use brick_hospital::logging;
use brick_hospital::types::{
    AdapterState, Category, CategoryPolicy, Color, DeviceEvent, GameRecord, InputMode, Level, MissAttribution,
    OutcomeCode, Phase, SequenceEnd, SessionEvent, SessionReport, SessionUpdate,
};
use brick_hospital::VERSION;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(
    name = "brick-hospital",
    version = VERSION,
    about = "Brick Hospital - reaction and recognition training",
    long_about = "Brick Hospital walks an active target across a grid of slots.\n\n\
                  Resolve each slot by naming its colour (or shape) before the\n\
                  slot timer runs out. Hits and misses are tallied per category.\n\n\
                  Input (terminal play):\n  \
                  red / r, yellow / y, blue / b, green / g   Tap a colour\n  \
                  hexagon, rectangle, ...                   Tap a shape (--shapes)\n  \
                  confirm / c                               Confirm a locked slot (--lock-confirm)\n  \
                  rescan                                    Reconnect the micro:bit\n  \
                  quit                                      End the game\n\n\
                  Modes:\n  \
                  --microbit     Also read colours from a micro:bit\n  \
                  --devices      List serial devices\n  \
                  --listen       Print micro:bit colours without playing\n  \
                  --serve        HTTP API server mode"
)]
struct Args {
    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (overrides config)
    #[arg(long)]
    addr: Option<String>,

    /// List attached serial devices and exit
    #[arg(long)]
    devices: bool,

    /// Print micro:bit colours as they arrive, without a game
    #[arg(long)]
    listen: bool,

    /// Level preset (L1, L2, L3): a fixed-length round
    #[arg(short, long)]
    level: Option<String>,

    /// Practice time in minutes
    #[arg(short, long)]
    minutes: Option<u32>,

    /// Seconds each slot stays active
    #[arg(short, long)]
    interval: Option<u32>,

    /// Category policy: fixed | sequence | random
    #[arg(long)]
    mode: Option<CategoryPolicy>,

    /// Number of slots in the grid
    #[arg(long)]
    slots: Option<usize>,

    /// Use the shape vocabulary instead of colours
    #[arg(long)]
    shapes: bool,

    /// End after the last slot instead of wrapping around
    #[arg(long)]
    terminate: bool,

    /// Charge wrong taps to the tapped category
    #[arg(long)]
    attribute_tapped: bool,

    /// Read colours from a micro:bit over USB serial
    #[arg(long)]
    microbit: bool,

    /// A matching micro:bit colour locks the slot; type 'confirm' to score it
    #[arg(long)]
    lock_confirm: bool,

    /// Seed for the random policy
    #[arg(long)]
    seed: Option<u64>,

    /// Username to record games under (guest when omitted)
    #[arg(short, long)]
    user: Option<String>,

    /// Config file (default: ./brick_hospital.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Debug logging and per-second ticks
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(args.verbose);
    if args.no_color || args.json {
        colored::control::set_override(false);
    }

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Config error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let result = if args.devices {
        list_devices()
    } else if args.listen {
        run_listen(&config).await
    } else if args.serve {
        run_serve(&args, &config).await
    } else {
        run_game(&args, &config).await
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// CLI flags as a session request over the config defaults
fn session_request(args: &Args) -> NewSessionRequest {
    NewSessionRequest {
        level: args.level.clone(),
        practice_minutes: args.minutes,
        interval_seconds: args.interval,
        slot_count: args.slots,
        policy: args.mode,
        categories: args.shapes.then_some(CategorySet::Shapes),
        sequence_end: args.terminate.then_some(SequenceEnd::Terminate),
        miss_attribution: args.attribute_tapped.then_some(MissAttribution::Tapped),
        input_mode: args.lock_confirm.then_some(InputMode::LockThenConfirm),
        seed: args.seed,
        ..Default::default()
    }
}

fn user_directory(config: &AppConfig) -> Result<Box<dyn UserDirectory>, Box<dyn std::error::Error>> {
    match (&config.backend.url, &config.backend.api_key) {
        (Some(url), Some(key)) => Ok(Box::new(RestUserDirectory::new(url.clone(), key.clone(), config.backend.timeout())?)),
        _ => Ok(Box::new(StaticUserDirectory::new())),
    }
}

/// Play one session in the terminal
async fn run_game(args: &Args, config: &AppConfig) -> CliResult {
    let (session_config, level) = build_session_config(&config.session.to_session_config(), &session_request(args))?;
    let store = LocalStore::new(&config.storage.path);
    let directory = user_directory(config)?;
    let user_id = resolve_user_id(directory.as_ref(), Some(&store), args.user.as_deref().unwrap_or("")).await;

    let categories = session_config.categories.clone();
    let lock_confirm = session_config.input_mode == InputMode::LockThenConfirm;
    let mut runner = SessionRunner::new(GameSession::new(session_config.clone())?);
    if args.microbit || lock_confirm {
        runner = runner.with_device(DeviceAdapter::system(
            config.serial.settings(),
            config.serial.status_log_lines,
        ));
    }

    if !args.json {
        print_header(level, &user_id);
        println!(
            "Practice {}s, {}s per slot, {} slots, policy {}.",
            session_config.practice_seconds,
            session_config.interval_seconds,
            session_config.slot_count,
            session_config.policy
        );
        println!(
            "Targets: {}",
            categories.iter().map(|c| paint(*c)).map(|s| s.to_string()).collect::<Vec<_>>().join(" ")
        );
        println!("Type a target and press Enter. Type 'quit' to end the game.");
        if lock_confirm {
            println!("Show the colour on the micro:bit, then type 'confirm'.");
        }
        println!();
    }

    let handle = runner.spawn();
    let mut updates = handle.subscribe();
    spawn_stdin_reader(handle.sender(), lock_confirm);
    if !args.json {
        spawn_device_printer(&handle);
    }

    // The start update may race the subscription, so print it from the snapshot
    let started = handle.started().await;
    print_update(&SessionUpdate::new(OutcomeCode::S001_SESSION_STARTED, started), args);

    loop {
        match updates.recv().await {
            Ok(update) if update.outcome == OutcomeCode::S001_SESSION_STARTED => continue,
            Ok(update) => {
                let ended = update.snapshot.phase == Phase::Ended;
                print_update(&update, args);
                if ended {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    let report = handle.report().await.ok_or("session task stopped before reporting")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let record = GameRecord::from_report(&report, &user_id, level);
    if let Err(e) = store.append_record(record) {
        tracing::warn!("could not store game record: {}", e);
    }
    Ok(())
}

/// Stdin lines become session events on a plain thread
fn spawn_stdin_reader(sender: EventSender, lock_confirm: bool) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            let event = match line.to_ascii_lowercase().as_str() {
                "" => continue,
                "quit" | "exit" | "q" | "end" => SessionEvent::EndGame,
                "c" | "confirm" if lock_confirm => SessionEvent::Confirm,
                "c" | "confirm" => {
                    eprintln!("{}", "  confirm only applies with --lock-confirm".yellow());
                    continue;
                }
                "rescan" => {
                    if !sender.rescan() {
                        return;
                    }
                    continue;
                }
                _ => match line.parse::<Category>() {
                    Ok(category) => SessionEvent::Tap(category),
                    Err(e) => {
                        eprintln!("{}", format!("  {}", e).yellow());
                        continue;
                    }
                },
            };
            let end = event == SessionEvent::EndGame;
            if !sender.send(event) || end {
                return;
            }
        }
        // EOF ends the game too
        sender.send(SessionEvent::EndGame);
    });
}

/// Echo new micro:bit status lines while the game runs
fn spawn_device_printer(handle: &SessionHandle) {
    let Some(mut status) = handle.watch_device() else {
        return;
    };
    tokio::spawn(async move {
        let mut seen = 0;
        loop {
            {
                let current = status.borrow_and_update();
                for line in current.lines_since(seen) {
                    println!("  {}", format!("[micro:bit] {}", line).dimmed());
                }
                seen = current.lines_logged;
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    });
}

fn print_header(level: Option<Level>, user_id: &str) {
    let title = match level {
        Some(level) => format!("Brick Hospital v{} - {}", VERSION, level.preset().title),
        None => format!("Brick Hospital v{} - Practice", VERSION),
    };
    println!("{}", "=".repeat(48).bold());
    println!("  {}", title.bold());
    println!("  player: {}", user_id.cyan());
    println!("{}", "=".repeat(48).bold());
    println!();
}

fn print_update(update: &SessionUpdate, args: &Args) {
    if update.outcome == OutcomeCode::C003_TICK && !args.verbose {
        return;
    }
    if args.json {
        if let Ok(json) = serde_json::to_string(update) {
            println!("{}", json);
        }
    } else if args.no_color {
        println!("{}", update.to_parseable_string());
    } else {
        println!("{}", update.to_terminal_string());
    }
}

fn print_report(report: &SessionReport) {
    println!();
    println!("{}", "Session summary".bold());
    println!(
        "  ended: {:?} after {}s, {} slots resolved",
        report.end_reason, report.elapsed_seconds, report.resolved_slots
    );
    for row in &report.summary.categories {
        println!(
            "  {:<12} hit {:>3}  miss {:>3}  {:>3}%",
            paint(row.category),
            row.hit,
            row.miss,
            row.accuracy_percent
        );
    }
    println!(
        "  {:<12} hit {:>3}  miss {:>3}  {:>3}%",
        "TOTAL".bold(),
        report.summary.total_hit,
        report.summary.total_miss,
        report.summary.overall_accuracy_percent
    );
}

fn paint(category: Category) -> ColoredString {
    let token = category.token();
    match category.as_color() {
        Some(Color::Red) => token.red(),
        Some(Color::Yellow) => token.yellow(),
        Some(Color::Blue) => token.blue(),
        Some(Color::Green) => token.green(),
        None => token.normal(),
    }
}

fn list_devices() -> CliResult {
    let devices = SystemSerialBackend::new().enumerate()?;
    println!("USB devices: {}", devices.len());
    for device in &devices {
        let tag = if device.serial_capable { "serial".green() } else { "other".dimmed() };
        println!("  {} [{}]", device.describe(), tag);
    }
    Ok(())
}

/// Print colours from the micro:bit until Ctrl-C
async fn run_listen(config: &AppConfig) -> CliResult {
    let mut adapter = DeviceAdapter::system(config.serial.settings(), config.serial.status_log_lines);
    adapter.start_listening();
    for line in adapter.log().lines() {
        println!("  {}", line.dimmed());
    }
    if !matches!(adapter.state(), AdapterState::Reading | AdapterState::AwaitingPermission) {
        return Err(format!("device adapter is {}", adapter.state()).into());
    }

    println!("Listening (Ctrl-C to stop)...");
    loop {
        tokio::select! {
            event = adapter.next_event() => match event {
                DeviceEvent::ColorChanged(color) => println!("  {}", paint(Category::Color(color)).bold()),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    adapter.shutdown().await;
    if let Some(line) = adapter.log().last() {
        println!("  {}", line.dimmed());
    }
    Ok(())
}

/// Run HTTP API server
async fn run_serve(args: &Args, config: &AppConfig) -> CliResult {
    let addr = match &args.addr {
        Some(addr) => addr.parse()?,
        None => config.server_addr()?,
    };
    let serial = config.serial.clone();
    let state = AppState::new(config.session.to_session_config())
        .with_store(LocalStore::new(&config.storage.path))
        .with_device_factory(Arc::new(move || {
            DeviceAdapter::system(serial.settings(), serial.status_log_lines)
        }));

    println!();
    println!("{}", "=".repeat(48).bold());
    println!("  {}", format!("Brick Hospital API Server v{}", VERSION).bold());
    println!("{}", "=".repeat(48).bold());
    println!();

    run_server(addr, state).await
}
