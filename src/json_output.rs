//! # JSON Output Module
//!
//! Questo modulo definisce il contratto dati della superficie di stato.
//!
//! ## Contenuto dello snapshot:
//! - `processed` / `total` / `percentage`: progresso complessivo
//! - `current_file`: file in conversione, oppure `-` se idle
//! - `done`: true quando non c'è lavoro o tutto è stato processato
//! - `log`: ultime righe di log, dalla più recente
//! - `stdout` / `stderr`: output catturato dell'ultimo tentativo
//!
//! Lo snapshot è una copia: leggerlo non blocca mai il driver.

use serde::{Deserialize, Serialize};

/// Point-in-time copy of everything the status surface shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub processed: usize,
    pub total: usize,
    pub percentage: f64,
    pub current_file: String,
    pub done: bool,
    pub log: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

impl StatusSnapshot {
    pub fn new(
        processed: usize,
        total: usize,
        current_file: String,
        log: Vec<String>,
        stdout: String,
        stderr: String,
    ) -> Self {
        let percentage = if total > 0 {
            ((processed as f64 / total as f64) * 100.0).min(100.0)
        } else {
            100.0
        };

        Self {
            processed,
            total,
            percentage,
            current_file,
            done: total == 0 || processed >= total,
            log,
            stdout,
            stderr,
        }
    }

    /// Whole percent, rounded down
    pub fn whole_percent(&self) -> u64 {
        self.percentage.floor() as u64
    }
}
