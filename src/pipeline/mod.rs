//! # Pipeline Module
//!
//! Separa le responsabilità della pipeline di conversione in sottomoduli:
//! - `media_minifier`: Orchestratore (discovery, bootstrap, loop sequenziale)
//! - `task_converter`: Singolo tentativo (encoder + swap + transizioni di stato)
//! - `progress_tracker`: Stato condiviso con la pagina di stato

pub mod media_minifier;
pub mod progress_tracker;
pub mod task_converter;

pub use media_minifier::{FolderWork, MediaMinifier, WorkPlan};
pub use progress_tracker::{OutputCapture, ProgressTracker};
pub use task_converter::{AttemptOutcome, TaskConverter};
