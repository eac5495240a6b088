//! kidsbus - operator command line for the school transport console.
//!
//! Prints the cached collections, dashboard counts and consistency drift,
//! and follows bus locations. `--demo` runs against an in-memory store
//! seeded with sample data instead of the configured remote store.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kidsbus_core::location::StoreDocumentProvider;
use kidsbus_core::models::{Bus, Collection, Location, Parent, Student};
use kidsbus_core::utils::{format_phone, truncate_string};
use kidsbus_core::{Config, Console, LocationChain, MemoryGateway, RemoteStore};

// ============================================================================
// Constants
// ============================================================================

/// Column width for names in list output
const NAME_WIDTH: usize = 24;

/// Location batches printed by `track` before exiting
const DEFAULT_TRACK_TICKS: usize = 3;

const USAGE: &str = "\
Usage: kidsbus [--demo] [--log-file PATH] <command>

Commands:
  students          List students
  parents           List parents and their children
  buses             List buses with occupancy
  stats             Dashboard counts
  audit             Report relationship drift
  track [IDS...]    Follow bus locations (all active buses when no ids)";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to `log_file` when given. The
/// returned guard flushes the file writer and must outlive `main`'s work.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().context("--log-file needs a file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

struct Args {
    demo: bool,
    log_file: Option<String>,
    command: String,
    rest: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut demo = false;
    let mut log_file = None;
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--demo" => demo = true,
            "--log-file" => log_file = Some(args.next().context("--log-file needs a path")?),
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}\n\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }
    if positional.is_empty() {
        bail!("{}", USAGE);
    }
    let command = positional.remove(0);
    Ok(Args {
        demo,
        log_file,
        command,
        rest: positional,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = parse_args()?;
    let _guard = init_tracing(args.log_file.as_deref().map(Path::new))?;
    info!(command = %args.command, demo = args.demo, "kidsbus starting");

    let mut console = if args.demo {
        demo_console()
    } else {
        let config = Config::load()?;
        Console::connect(&config)?
    };
    console.init().await.context("Failed to load collections")?;

    match args.command.as_str() {
        "students" => print_students(&console),
        "parents" => print_parents(&console),
        "buses" => print_buses(&console),
        "stats" => print_stats(&console),
        "audit" => print_audit(&console),
        "track" => track(&console, args.rest).await?,
        other => bail!("Unknown command {}\n\n{}", other, USAGE),
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_students(console: &Console) {
    for student in console.cache().all::<Student>() {
        let bus = student
            .bus_id
            .as_deref()
            .and_then(|id| console.cache().find::<Bus>(id))
            .map(|b| b.plate_number.clone())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<w$}  {:<6} {:<10} {:<14} {}",
            truncate_string(&student.name, NAME_WIDTH),
            student.grade,
            student.current_status.to_string(),
            format_phone(&student.parent_phone),
            bus,
            w = NAME_WIDTH
        );
    }
}

fn print_parents(console: &Console) {
    for parent in console.cache().all::<Parent>() {
        println!(
            "{:<w$}  {:<14} {}",
            truncate_string(&parent.name, NAME_WIDTH),
            format_phone(&parent.phone),
            parent.email,
            w = NAME_WIDTH
        );
        for child in &parent.children {
            println!("    {} ({}, {})", child.name, child.grade, child.school_name);
        }
    }
}

fn print_buses(console: &Console) {
    for bus in console.cache().all::<Bus>() {
        let riders = console.cache().students_on_bus(&bus.id).len();
        println!(
            "{:<w$}  {:>3}/{:<3} riders {:<3} {}",
            truncate_string(&bus.label(), NAME_WIDTH),
            bus.students_count,
            bus.capacity,
            riders,
            bus.status,
            w = NAME_WIDTH
        );
    }
}

fn print_stats(console: &Console) {
    let stats = console.statistics();
    println!("Students     {} ({} active)", stats.total_students, stats.active_students);
    println!("  on bus     {}", stats.students_on_bus);
    println!("  at school  {}", stats.students_at_school);
    println!("  at home    {}", stats.students_at_home);
    println!("Parents      {}", stats.total_parents);
    println!("Supervisors  {}", stats.total_supervisors);
    println!("Buses        {}", stats.total_buses);
    println!(
        "Seats        {}/{} ({}%)",
        stats.seats_assigned,
        stats.seats_total,
        stats.occupancy_percent()
    );
    println!("Loaded       {}", console.cache().ages());
}

fn print_audit(console: &Console) {
    let drifts = console.audit();
    if drifts.is_empty() {
        println!("No drift found");
        return;
    }
    for drift in &drifts {
        println!("{}", drift);
    }
    println!("{} issue(s)", drifts.len());
}

fn describe(location: &Location) -> String {
    match location.coordinates {
        Some(c) => format!("{:.5}, {:.5} ({:?})", c.lat, c.lng, location.source),
        None => location.description.clone().unwrap_or_default(),
    }
}

async fn track(console: &Console, bus_ids: Vec<String>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let on_update = move |batch: Vec<Location>| {
        let _ = tx.send(batch);
    };
    if bus_ids.is_empty() {
        if console.track_fleet(on_update) == 0 {
            println!("No active buses");
            return Ok(());
        }
    } else {
        console.track_all(bus_ids, on_update)?;
    }

    for tick in 0..DEFAULT_TRACK_TICKS {
        let Some(batch) = rx.recv().await else {
            break;
        };
        if tick > 0 {
            println!();
        }
        for location in &batch {
            println!("{:<12} {}", location.bus_id, describe(location));
        }
    }
    console.stop_fleet_tracking();
    Ok(())
}

// ============================================================================
// Demo data
// ============================================================================

fn demo_console() -> Console {
    let gateway = MemoryGateway::new()
        .with_documents(
            Collection::Parents,
            vec![json!({
                "id": "parent_1",
                "name": "Huda Al-Harbi",
                "email": "huda@example.com",
                "phone": "0501234567",
                "children": [{
                    "id": "student_1",
                    "name": "Ali",
                    "grade": "G3",
                    "schoolName": "Al Noor School",
                    "busRoute": "Route 1",
                    "qrCode": "STUDENT_1",
                    "currentStatus": "onBus"
                }]
            })],
        )
        .with_documents(
            Collection::Students,
            vec![
                json!({
                    "id": "student_1",
                    "name": "Ali",
                    "grade": "G3",
                    "schoolName": "Al Noor School",
                    "busRoute": "Route 1",
                    "busId": "bus_1",
                    "parentId": "parent_1",
                    "parentName": "Huda Al-Harbi",
                    "parentPhone": "0501234567",
                    "qrCode": "STUDENT_1",
                    "currentStatus": "onBus"
                }),
                json!({
                    "id": "student_2",
                    "name": "Mona",
                    "grade": "G5",
                    "schoolName": "Al Noor School",
                    "busRoute": "Route 2",
                    "parentPhone": "966551112222",
                    "qrCode": "STUDENT_2",
                    "currentStatus": "atSchool"
                }),
            ],
        )
        .with_documents(
            Collection::Buses,
            vec![
                json!({
                    "id": "bus_1",
                    "plateNumber": "ABC 123",
                    "driverName": "Khalid",
                    "driverPhone": "0559876543",
                    "route": "Route 1",
                    "capacity": 30,
                    "studentsCount": 1,
                    "lat": 24.7136,
                    "lng": 46.6753
                }),
                json!({
                    "id": "bus_2",
                    "plateNumber": "XYZ 789",
                    "route": "Route 2",
                    "capacity": 20,
                    "status": "maintenance"
                }),
            ],
        )
        .with_documents(
            Collection::Supervisors,
            vec![json!({"id": "sup_1", "name": "Sara", "permissions": ["view_students"]})],
        );

    let remote = RemoteStore::new(Arc::new(gateway));
    let chain = LocationChain::new().with(StoreDocumentProvider::new(remote.clone()));
    Console::new(remote, Default::default(), chain)
}
