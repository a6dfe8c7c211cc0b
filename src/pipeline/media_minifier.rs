//! # Media Minifier Main Orchestrator
//!
//! Orchestratore principale: costruisce il piano di lavoro e lo esegue in
//! modo strettamente sequenziale.
//!
//! ## Flusso di esecuzione:
//! 1. **Discovery**: enumera la root e tutte le sottocartelle
//! 2. **Bootstrap**: carica (o costruisce) il manifest di ogni cartella
//! 3. **Riconciliazione**: ripulisce i residui di swap interrotti (opzionale)
//! 4. **Retry**: rimette in coda i record falliti (solo con `retry_failed`)
//! 5. **Totale**: somma i record non terminali, una sola volta
//! 6. **Conversione**: cartelle in ordine di discovery, record in ordine di manifest
//!
//! I manifest caricati al bootstrap restano in memoria per tutto il run, quindi
//! il numero di tentativi non può superare il totale riportato.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    encoder::Encoder,
    file_manager::FileManager,
    pipeline::{
        progress_tracker::ProgressTracker,
        task_converter::{AttemptOutcome, TaskConverter},
    },
    progress::{ProgressManager, RunStats},
    state::{FolderManifest, RecordState, StateManager},
    swap::{reconcile_folder, ReconcileReport},
};

/// One folder and its manifest
#[derive(Debug, Clone)]
pub struct FolderWork {
    pub folder: PathBuf,
    pub manifest: FolderManifest,
}

/// Everything discovered at startup
#[derive(Debug, Default)]
pub struct WorkPlan {
    pub folders: Vec<FolderWork>,
    /// Entries the enumerator could not inspect
    pub skipped: Vec<(PathBuf, String)>,
    /// Folders whose manifest could not be loaded or built
    pub failed_folders: Vec<(PathBuf, String)>,
    pub reconcile: ReconcileReport,
}

impl WorkPlan {
    /// Non-terminal records across all folders
    pub fn pending(&self) -> usize {
        self.folders.iter().map(|w| w.manifest.pending_count()).sum()
    }
}

/// Main pipeline orchestrator
pub struct MediaMinifier {
    config: Config,
    state_manager: StateManager,
    converter: TaskConverter,
    tracker: ProgressTracker,
    show_progress: bool,
}

impl MediaMinifier {
    /// Create a new pipeline over `encoder`, reporting into `tracker`
    pub fn new(config: Config, encoder: Arc<dyn Encoder>, tracker: ProgressTracker) -> Result<Self> {
        config.validate()?;
        info!("Using encoder: {}", encoder.name());

        Ok(Self {
            state_manager: StateManager::new(&config),
            converter: TaskConverter::new(config.clone(), encoder, tracker.clone()),
            config,
            tracker,
            show_progress: true,
        })
    }

    /// Enable or disable the console progress bar
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Discover folders and load every manifest, then publish the total.
    pub async fn prepare(&self, root: &Path) -> Result<WorkPlan> {
        info!("Starting with directory {}", root.display());

        let scan = FileManager::enumerate_folders(root)?;
        info!(
            "Found {} folder(s), {} unreadable entr{}",
            scan.folders.len(),
            scan.skipped.len(),
            if scan.skipped.len() == 1 { "y" } else { "ies" }
        );

        let mut plan = WorkPlan {
            skipped: scan.skipped,
            ..Default::default()
        };

        for folder in scan.folders {
            let mut manifest = match self.state_manager.load(&folder).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    error!("Failed to load stat for folder={}: {}", folder.display(), e);
                    plan.failed_folders.push((folder, e.to_string()));
                    continue;
                }
            };

            if self.config.reconcile_on_start {
                let report = reconcile_folder(&folder, &mut manifest, &self.config).await;
                if report.changed_manifest() {
                    if let Err(e) = self.state_manager.save(&folder, &manifest).await {
                        error!("Failed to update stat in folder={}: {}", folder.display(), e);
                    }
                }
                plan.reconcile.merge(report);
            }

            if self.config.retry_failed {
                let mut reset = 0;
                for record in manifest.records.iter_mut() {
                    if record.reset_failed() {
                        reset += 1;
                    }
                }
                if reset > 0 {
                    info!("Re-queued {} failed file(s) in folder={}", reset, folder.display());
                    if let Err(e) = self.state_manager.save(&folder, &manifest).await {
                        error!("Failed to update stat in folder={}: {}", folder.display(), e);
                    }
                }
            }

            debug!(
                "Folder {}: {} pending, {} done, {} failed",
                folder.display(),
                manifest.count(RecordState::Pending),
                manifest.count(RecordState::Done),
                manifest.count(RecordState::Failed)
            );
            plan.folders.push(FolderWork { folder, manifest });
        }

        if !plan.reconcile.is_empty() {
            info!(
                "Reconciliation: {} action(s), {} error(s)",
                plan.reconcile.actions.len(),
                plan.reconcile.errors.len()
            );
        }

        let total = plan.pending();
        self.tracker.set_total(total);
        info!("Files to convert: {}", total);

        Ok(plan)
    }

    /// Convert every pending record of the plan, one at a time.
    pub async fn convert_folders(&self, plan: &mut WorkPlan) -> RunStats {
        let progress = if self.show_progress {
            ProgressManager::new(plan.pending() as u64)
        } else {
            ProgressManager::hidden()
        };
        let mut stats = RunStats::new();

        for work in &mut plan.folders {
            for index in 0..work.manifest.records.len() {
                let record = &work.manifest.records[index];
                debug!(
                    "Found media={}, converted={}",
                    record.file_name,
                    record.state() == RecordState::Done
                );

                match record.state() {
                    RecordState::Done => {
                        info!("File is already converted({})", work.folder.join(&record.file_name).display());
                        continue;
                    }
                    RecordState::Failed => {
                        info!("File is already failed({})", work.folder.join(&record.file_name).display());
                        continue;
                    }
                    RecordState::Pending => {}
                }

                let original_size = record.original_size;
                let file_name = record.file_name.clone();
                progress.set_message(&format!("🎬 {}", file_name));

                match self.converter.convert_record(&work.folder, &mut work.manifest, index).await {
                    AttemptOutcome::Converted {
                        converted_size,
                        backup_removed,
                    } => {
                        stats.add_converted(original_size, converted_size);
                        if !backup_removed {
                            stats.add_backup_left();
                        }
                        let message = match converted_size {
                            Some(size) => format!(
                                "✅ {}: {:.1}% saved",
                                file_name,
                                FileManager::calculate_reduction(original_size, size)
                            ),
                            None => format!("✅ {}", file_name),
                        };
                        progress.update(&message);
                    }
                    AttemptOutcome::Failed(reason) => {
                        stats.add_failed();
                        warn!("❌ {} failed: {}", file_name, reason);
                        progress.update(&format!("❌ {}", file_name));
                    }
                }
            }
        }

        progress.finish(&stats.format_summary());
        stats
    }

    /// Prepare and convert everything under `root`
    pub async fn run(&self, root: &Path) -> Result<RunStats> {
        let mut plan = self.prepare(root).await?;
        let stats = self.convert_folders(&mut plan).await;
        info!("All done! {}", stats.format_summary());
        Ok(stats)
    }
}
