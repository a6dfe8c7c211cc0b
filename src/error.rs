//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom dell'applicazione.
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `EncoderSpawn`: L'encoder esterno non può essere avviato
//! - `EncoderExit`: L'encoder è terminato con exit status diverso da 0
//! - `Swap`: Uno dei rename dello swap è fallito
//! - `State`: Errori di lettura/scrittura del file sidecar
//! - `Discovery`: La root di scansione non è leggibile
//! - `Config`: Configurazione non valida
//!
//! Gli errori per singolo file non fermano mai il driver: vengono loggati e il
//! record viene marcato come fallito. Solo gli errori di orchestrazione
//! (es. `Discovery` sulla root) risalgono fino a `main`.

use std::path::PathBuf;

/// Step of the swap protocol that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    /// original -> `<base>.old.<ext>`
    Backup,
    /// `<base>.new.<ext>` -> `<base>.<ext>`
    Promote,
}

impl std::fmt::Display for SwapStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backup => write!(f, "backup original"),
            Self::Promote => write!(f, "promote converted file"),
        }
    }
}

/// Custom error types for the conversion pipeline
#[derive(thiserror::Error, Debug)]
pub enum MinifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start encoder `{program}`: {source}")]
    EncoderSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with {} for {}", exit_label(.code), .path.display())]
    EncoderExit {
        path: PathBuf,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Swap step '{step}' failed for {}: {source}", .path.display())]
    Swap {
        step: SwapStep,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file error: {0}")]
    State(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}
