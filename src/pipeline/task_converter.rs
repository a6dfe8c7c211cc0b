//! # Task Converter Module
//!
//! Esegue un singolo tentativo di conversione e applica le transizioni di stato
//! del record: Pending -> InProgress -> Done | Failed.
//!
//! Il manifest viene salvato dopo ogni transizione, così un crash perde al
//! massimo il tentativo in corso (che resta Pending al riavvio).

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    encoder::Encoder,
    error::MinifyError,
    file_manager::FileManager,
    pipeline::progress_tracker::ProgressTracker,
    state::{FolderManifest, StateManager},
    swap::{swap_in_converted, SwapPaths},
};

/// Result of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Converted {
        /// None when the converted file could not be stat'ed
        converted_size: Option<u64>,
        /// False when the swap backup was left on disk
        backup_removed: bool,
    },
    Failed(String),
}

/// Runs the encoder and the swap for single records
pub struct TaskConverter {
    config: Config,
    state_manager: StateManager,
    encoder: Arc<dyn Encoder>,
    tracker: ProgressTracker,
}

impl TaskConverter {
    pub fn new(config: Config, encoder: Arc<dyn Encoder>, tracker: ProgressTracker) -> Self {
        let state_manager = StateManager::new(&config);
        Self {
            config,
            state_manager,
            encoder,
            tracker,
        }
    }

    /// Attempt the conversion of `manifest.records[index]`.
    ///
    /// The caller must only pass pending records. The tracker's processed count
    /// goes up by exactly one, and the current file is back to idle on return.
    pub async fn convert_record(&self, folder: &Path, manifest: &mut FolderManifest, index: usize) -> AttemptOutcome {
        let file_name = manifest.records[index].file_name.clone();

        manifest.records[index].mark_started(Utc::now());
        self.tracker.begin_attempt(&file_name);
        info!("Convert file {}", folder.join(&file_name).display());
        self.persist(folder, manifest).await;

        let outcome = self.attempt(folder, manifest, index).await;
        self.tracker.finish_attempt();
        outcome
    }

    async fn attempt(&self, folder: &Path, manifest: &mut FolderManifest, index: usize) -> AttemptOutcome {
        let file_name = manifest.records[index].file_name.clone();
        let full_path = folder.join(&file_name);

        if let Err(e) = self.encoder.run(&full_path).await {
            if let MinifyError::EncoderExit { stdout, stderr, .. } = &e {
                error!("File conversion result: \nLog={}\nError={}", stdout, stderr);
            }
            error!("Failed to convert file={}: {}", full_path.display(), e);
            return self.fail(folder, manifest, index, e).await;
        }

        let paths = SwapPaths::for_file(folder, &file_name, &self.config);
        let swap = match swap_in_converted(&paths, self.config.delete_retries).await {
            Ok(swap) => swap,
            Err(e) => {
                error!("Failed to remove old and rename new file={}: {}", full_path.display(), e);
                return self.fail(folder, manifest, index, e).await;
            }
        };

        manifest.records[index].mark_finished(Utc::now());
        self.persist(folder, manifest).await;

        let converted_size = match FileManager::file_size(&swap.target).await {
            Ok(size) => {
                manifest.records[index].converted_size = Some(size);
                self.persist(folder, manifest).await;
                Some(size)
            }
            Err(e) => {
                warn!(
                    "Failed to update converted file new size stat({}): {}",
                    swap.target.display(),
                    e
                );
                None
            }
        };

        info!("✅ Converted {} -> {}", file_name, swap.target.display());
        AttemptOutcome::Converted {
            converted_size,
            backup_removed: swap.backup_removed,
        }
    }

    async fn fail(&self, folder: &Path, manifest: &mut FolderManifest, index: usize, cause: MinifyError) -> AttemptOutcome {
        manifest.records[index].mark_failed(Utc::now());
        self.persist(folder, manifest).await;
        AttemptOutcome::Failed(cause.to_string())
    }

    /// Save the manifest; a failure is logged and the in-memory state kept.
    async fn persist(&self, folder: &Path, manifest: &FolderManifest) {
        if let Err(e) = self.state_manager.save(folder, manifest).await {
            error!("Failed to update stat in folder={}: {}", folder.display(), e);
        }
    }
}
