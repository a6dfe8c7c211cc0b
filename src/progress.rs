//! # Progress Bar and Statistics Module
//!
//! Questo modulo gestisce la progress bar su console e le statistiche del run.
//!
//! ## Componenti principali:
//! - `ProgressManager`: progress bar `indicatif`, un tick per tentativo
//! - `RunStats`: file convertiti, falliti, byte risparmiati
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [01:12:05] [=========================>--------------] 150/230 (65%) ✅ clip.mov: 48.1% saved
//! ```
//!
//! La progress bar è nascosta automaticamente quando stderr non è un terminale.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::file_manager::FileManager;

/// Console progress for the pending files of a run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that draws nothing, for tests and headless runs
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Advance by one attempt with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Outcome counters of one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub files_converted: usize,
    pub files_failed: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
    /// Converted files whose swap backup could not be deleted
    pub backups_left: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// `converted_size` is None when the post-swap stat failed
    pub fn add_converted(&mut self, original_size: u64, converted_size: Option<u64>) {
        self.files_converted += 1;
        if let Some(converted_size) = converted_size {
            self.total_original_size += original_size;
            self.total_bytes_saved += original_size.saturating_sub(converted_size);
        }
    }

    pub fn add_backup_left(&mut self) {
        self.backups_left += 1;
    }

    pub fn add_failed(&mut self) {
        self.files_failed += 1;
    }

    pub fn attempts(&self) -> usize {
        self.files_converted + self.files_failed
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} files | Converted: {} | Failed: {} | Total saved: {} ({:.2}%)",
            self.attempts(),
            self.files_converted,
            self.files_failed,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        );
        if self.backups_left > 0 {
            summary.push_str(&format!(" | Backups left: {}", self.backups_left));
        }
        summary
    }
}
