//! # Logging Module
//!
//! Inizializza `tracing` e collega ogni evento di log a due destinazioni
//! oltre alla console:
//! - il log in memoria del `ProgressTracker` (pagina di stato, più recente prima)
//! - il file di log append-only, una riga `<timestamp> | <messaggio>` per evento
//!
//! Un errore di scrittura sul file di log viene segnalato una sola volta su
//! stderr e non interrompe mai il processo.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::pipeline::progress_tracker::ProgressTracker;

/// Layer feeding the status log and the log file
pub struct StatusLogLayer {
    tracker: ProgressTracker,
    log_file: Option<PathBuf>,
    file_error_reported: AtomicBool,
}

impl StatusLogLayer {
    pub fn new(tracker: ProgressTracker, log_file: Option<PathBuf>) -> Self {
        Self {
            tracker,
            log_file,
            file_error_reported: AtomicBool::new(false),
        }
    }

    fn append_to_file(&self, line: &str) {
        let Some(path) = &self.log_file else {
            return;
        };

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = result {
            if !self.file_error_reported.swap(true, Ordering::Relaxed) {
                eprintln!("Failed to append log to {}: {}", path.display(), e);
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for StatusLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let line = format_line(Utc::now(), *event.metadata().level(), &visitor.finish());
        self.append_to_file(&line);
        self.tracker.push_log(line);
    }
}

/// `2024-03-01T10:00:00.000Z | message`, with the level for warnings and errors
fn format_line(at: DateTime<Utc>, level: Level, message: &str) -> String {
    let timestamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    if level <= Level::WARN {
        format!("{} | {} | {}", timestamp, level, message)
    } else {
        format!("{} | {}", timestamp, message)
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " | {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " | {}={:?}", field.name(), value);
        }
    }
}

/// Install the global subscriber: env filter, console output, status log.
///
/// `RUST_LOG` wins over `verbose` when set.
pub fn init(tracker: &ProgressTracker, log_file: Option<PathBuf>, verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "info,media_minifier=debug" } else { "info" })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(StatusLogLayer::new(tracker.clone(), log_file))
        .try_init()?;

    Ok(())
}
