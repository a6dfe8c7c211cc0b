//! # Media Minifier Library
//!
//! Pipeline di conversione video ripristinabile: scansiona un albero di
//! cartelle, converte ogni video con un encoder esterno e tiene in ogni
//! cartella un manifest che permette di riprendere dopo un crash.
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `file_manager`: Enumerazione cartelle e utilità sui file
//! - `state`: Manifest per cartella e file sidecar
//! - `encoder`: Invocazione dell'encoder esterno
//! - `swap`: Sostituzione dell'originale e riconciliazione all'avvio
//! - `pipeline`: Orchestratore e stato condiviso
//! - `progress`: Progress bar su console e statistiche del run
//! - `json_output`: Snapshot di stato serializzabile
//! - `logging`: Setup di `tracing` e log su file
//! - `status_server`: Pagina HTTP di stato
//!
//! ## Utilizzo:
//! ```ignore
//! use media_minifier::{CommandEncoder, Config, MediaMinifier, ProgressTracker};
//!
//! let config = Config::default();
//! let tracker = ProgressTracker::new(config.log_history_limit);
//! let encoder = Arc::new(CommandEncoder::from_config(&config, tracker.output()));
//! let minifier = MediaMinifier::new(config, encoder, tracker)?;
//! minifier.run(&path).await?;
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod state;
pub mod status_server;
pub mod swap;

pub use config::Config;
pub use encoder::{CommandEncoder, EncodeOutput, Encoder};
pub use error::MinifyError;
pub use pipeline::{MediaMinifier, ProgressTracker};
pub use state::{FolderManifest, MediaRecord, RecordState, StateManager};
