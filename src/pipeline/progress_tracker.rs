//! # Progress Tracking Module
//!
//! Stato condiviso tra il driver della pipeline e la superficie di stato:
//! contatori, file corrente, log in memoria e output catturato dell'encoder.
//!
//! Ogni accesso prende un lock per il tempo di una copia o di un incremento,
//! quindi le letture della pagina di stato non fermano mai il driver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::json_output::StatusSnapshot;

/// `current_file` value when nothing is converting
pub const IDLE_FILE: &str = "-";

/// Which encoder stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct CapturedOutput {
    stdout: String,
    stderr: String,
}

/// Transient stdout/stderr buffers of the current encoder run
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    inner: Arc<RwLock<CapturedOutput>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both buffers; called at the start of every run
    pub fn reset(&self) {
        let mut output = write(&self.inner);
        output.stdout.clear();
        output.stderr.clear();
    }

    pub fn append(&self, stream: OutputStream, chunk: &str) {
        let mut output = write(&self.inner);
        match stream {
            OutputStream::Stdout => output.stdout.push_str(chunk),
            OutputStream::Stderr => output.stderr.push_str(chunk),
        }
    }

    /// Copy of (stdout, stderr)
    pub fn snapshot(&self) -> (String, String) {
        let output = read(&self.inner);
        (output.stdout.clone(), output.stderr.clone())
    }
}

#[derive(Debug)]
struct Counters {
    total: usize,
    processed: usize,
    current_file: String,
}

/// Process-wide progress shared by the driver and the status page
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    counters: Arc<RwLock<Counters>>,
    log_history: Arc<Mutex<VecDeque<String>>>,
    history_limit: usize,
    output: OutputCapture,
}

impl ProgressTracker {
    pub fn new(history_limit: usize) -> Self {
        Self {
            counters: Arc::new(RwLock::new(Counters {
                total: 0,
                processed: 0,
                current_file: IDLE_FILE.to_string(),
            })),
            log_history: Arc::new(Mutex::new(VecDeque::with_capacity(history_limit.min(1024)))),
            history_limit: history_limit.max(1),
            output: OutputCapture::new(),
        }
    }

    /// Buffers the encoder writes into
    pub fn output(&self) -> OutputCapture {
        self.output.clone()
    }

    pub fn set_total(&self, total: usize) {
        write(&self.counters).total = total;
    }

    pub fn total(&self) -> usize {
        read(&self.counters).total
    }

    pub fn processed(&self) -> usize {
        read(&self.counters).processed
    }

    pub fn current_file(&self) -> String {
        read(&self.counters).current_file.clone()
    }

    pub fn begin_attempt(&self, file_name: &str) {
        write(&self.counters).current_file = file_name.to_string();
    }

    /// Count one attempt, whatever its outcome, and go back to idle
    pub fn finish_attempt(&self) {
        let mut counters = write(&self.counters);
        counters.processed += 1;
        counters.current_file = IDLE_FILE.to_string();
    }

    /// Add a formatted log line; the oldest line is dropped past the limit
    pub fn push_log(&self, line: String) {
        let mut history = self.log_history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_front(line);
        history.truncate(self.history_limit);
    }

    /// Log lines, newest first
    pub fn log_lines(&self) -> Vec<String> {
        let history = self.log_history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let (processed, total, current_file) = {
            let counters = read(&self.counters);
            (counters.processed, counters.total, counters.current_file.clone())
        };
        let (stdout, stderr) = self.output.snapshot();
        StatusSnapshot::new(processed, total, current_file, self.log_lines(), stdout, stderr)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
