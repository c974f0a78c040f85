//! Console front end: the single consumer of engine events
//!
//! Every LogEntry is kept in the LogBook (for `--export`) and printed when it
//! passes the display filter. Status snapshots are printed as one summary line.

use colored::{ColoredString, Colorize};
use std::sync::{Arc, Mutex};
use suterm_core::domain::{CommandResult, LogBook, LogEntry, LogFilter, Severity, StatusSnapshot};
use suterm_core::port::CoreEvent;
use tokio::sync::mpsc;

/// Shared log history, written by the console loop only
pub type SharedLogBook = Arc<Mutex<LogBook>>;

pub struct Console {
    filter: LogFilter,
    book: SharedLogBook,
    /// Print status snapshots as they arrive (watch mode)
    show_status: bool,
}

impl Console {
    pub fn new(filter: LogFilter, show_status: bool) -> Self {
        Self {
            filter,
            book: Arc::new(Mutex::new(LogBook::new())),
            show_status,
        }
    }

    pub fn book(&self) -> SharedLogBook {
        Arc::clone(&self.book)
    }

    /// Consume events until every sender is gone
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<CoreEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
    }

    fn handle(&self, event: CoreEvent) {
        match event {
            CoreEvent::Log(entry) => {
                if self.filter.matches(&entry) {
                    println!("{}", render_entry(&entry));
                }
                self.book
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .append(entry);
            }
            CoreEvent::Status(snapshot) => {
                if self.show_status {
                    println!("{}", render_status_line(&snapshot));
                }
            }
            CoreEvent::CommandComplete { request_id, result } => {
                println!("{}", render_result(&request_id, &result));
            }
        }
    }
}

fn paint(text: String, severity: Severity) -> ColoredString {
    match severity {
        Severity::Info => text.normal(),
        Severity::Warn => text.yellow(),
        Severity::Error => text.red().bold(),
        Severity::Success => text.green(),
    }
}

pub fn render_entry(entry: &LogEntry) -> ColoredString {
    paint(entry.format_line(), entry.severity)
}

fn yes_no(value: bool, yes: &str, no: &str) -> ColoredString {
    if value {
        yes.green()
    } else {
        no.red()
    }
}

pub fn render_status_line(snapshot: &StatusSnapshot) -> String {
    format!(
        "{} root {} | device {} | memory {}/{} MB | storage free {}",
        "●".cyan(),
        yes_no(snapshot.root_granted, "granted", "denied"),
        yes_no(snapshot.device_connected, "connected", "disconnected"),
        snapshot.memory_used_mb,
        snapshot.memory_total_mb,
        human_bytes(snapshot.storage_free_bytes),
    )
}

/// Multi-line status block for `suterm status`
pub fn render_status(snapshot: &StatusSnapshot) -> String {
    let captured = snapshot
        .captured_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");
    [
        format!("{}", "Device Status".cyan().bold()),
        format!(
            "  {} {}",
            "Root access:".bold(),
            yes_no(snapshot.root_granted, "Granted", "Denied")
        ),
        format!(
            "  {} {}",
            "Device:".bold(),
            yes_no(snapshot.device_connected, "Connected", "Disconnected")
        ),
        format!(
            "  {} {}/{} MB",
            "Memory:".bold(),
            snapshot.memory_used_mb,
            snapshot.memory_total_mb
        ),
        format!(
            "  {} {}",
            "Storage free:".bold(),
            human_bytes(snapshot.storage_free_bytes)
        ),
        format!("  {} {}", "Captured:".bold(), captured),
    ]
    .join("\n")
}

fn render_result(request_id: &str, result: &CommandResult) -> ColoredString {
    let text = match result.exit_code {
        Some(code) => format!(
            "[{}] {} (exit {}, {} ms)",
            request_id,
            result.outcome,
            code,
            result.duration_ms()
        ),
        None => format!("[{}] {} ({} ms)", request_id, result.outcome, result.duration_ms()),
    };
    if result.is_success() {
        text.green().bold()
    } else if result.timed_out || result.cancelled {
        text.yellow().bold()
    } else {
        text.red().bold()
    }
}

/// `df -h` style size
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}
