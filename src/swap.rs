//! # Swap Module
//!
//! Sostituisce il file originale con la versione convertita tramite rename.
//!
//! ## Protocollo (`clip.mov` -> encoder produce `clip.new.mp4`):
//! 1. `clip.mov` -> `clip.old.mp4` (backup)
//! 2. `clip.new.mp4` -> `clip.mp4` (nome finale)
//! 3. cancella `clip.old.mp4`, con qualche tentativo extra
//!
//! Se fallisce lo step 1 o 2 l'errore risale e il record viene marcato come
//! fallito; la cartella può contenere un backup orfano. Se fallisce lo step 3
//! la conversione resta valida e il backup rimane come residuo.
//! Se il nome finale è già occupato da un altro file lo swap non parte.
//!
//! ## Riconciliazione all'avvio:
//! `reconcile_folder` ripulisce i residui lasciati da interruzioni precedenti
//! (vedi `ReconcileAction`).

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MinifyError, SwapStep};
use crate::state::{FolderManifest, RecordState};

/// Pause between backup delete attempts
const DELETE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Paths involved in swapping one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPaths {
    pub original: PathBuf,
    pub converted: PathBuf,
    pub backup: PathBuf,
    pub target: PathBuf,
}

impl SwapPaths {
    pub fn for_file(folder: &Path, file_name: &str, config: &Config) -> Self {
        let base = crate::file_manager::FileManager::base_name(file_name);
        Self {
            original: folder.join(file_name),
            converted: folder.join(config.converted_name(base)),
            backup: folder.join(config.backup_name(base)),
            target: folder.join(config.final_name(base)),
        }
    }
}

/// Outcome of a completed swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Path of the converted file under its final name
    pub target: PathBuf,
    /// False if the backup could not be deleted and is still on disk
    pub backup_removed: bool,
}

/// Replace `paths.original` with `paths.converted`.
///
/// When the extension changes and another file already holds the final name,
/// nothing is renamed and the promote step fails.
pub async fn swap_in_converted(paths: &SwapPaths, delete_retries: u32) -> Result<SwapOutcome, MinifyError> {
    if paths.target != paths.original && exists(&paths.target).await {
        return Err(MinifyError::Swap {
            step: SwapStep::Promote,
            path: paths.converted.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", paths.target.display()),
            ),
        });
    }

    fs::rename(&paths.original, &paths.backup)
        .await
        .map_err(|source| MinifyError::Swap {
            step: SwapStep::Backup,
            path: paths.original.clone(),
            source,
        })?;

    fs::rename(&paths.converted, &paths.target)
        .await
        .map_err(|source| MinifyError::Swap {
            step: SwapStep::Promote,
            path: paths.converted.clone(),
            source,
        })?;

    let backup_removed = match remove_with_retries(&paths.backup, delete_retries).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Converted file is in place but backup {} could not be removed: {}",
                paths.backup.display(),
                e
            );
            false
        }
    };

    Ok(SwapOutcome {
        target: paths.target.clone(),
        backup_removed,
    })
}

/// Delete a file, retrying `retries` extra times on failure.
pub async fn remove_with_retries(path: &Path, retries: u32) -> std::io::Result<()> {
    let mut attempt = 0;
    loop {
        match fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                debug!("Delete of {} failed (attempt {}): {}", path.display(), attempt, e);
                tokio::time::sleep(DELETE_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Cleanup performed on a leftover swap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Done record with its backup still on disk: backup deleted
    RemovedBackup(PathBuf),
    /// Original missing and backup present: backup renamed back
    RestoredOriginal { from: PathBuf, to: PathBuf },
    /// Unfinished record with a stale encoder output: output deleted
    RemovedStaleOutput(PathBuf),
    /// Pending record whose rename completed before the kill: marked done
    CompletedSwap(PathBuf),
}

/// Actions taken by a reconciliation pass, plus the ones that failed
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub actions: Vec<ReconcileAction>,
    pub errors: Vec<(PathBuf, String)>,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.actions.extend(other.actions);
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.errors.is_empty()
    }

    /// True when some record was updated and the manifest must be saved
    pub fn changed_manifest(&self) -> bool {
        self.actions
            .iter()
            .any(|action| matches!(action, ReconcileAction::CompletedSwap(_)))
    }
}

/// Resolve swap residue left by an earlier interrupted run.
///
/// Only files named after a record of `manifest` are touched. A pending
/// record whose swap got past the rename is marked done in `manifest`; the
/// caller saves it when `changed_manifest` reports so.
pub async fn reconcile_folder(folder: &Path, manifest: &mut FolderManifest, config: &Config) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for record in manifest.records.iter_mut() {
        let paths = SwapPaths::for_file(folder, &record.file_name, config);

        if record.state() == RecordState::Done {
            if exists(&paths.backup).await && exists(&paths.target).await {
                match remove_with_retries(&paths.backup, config.delete_retries).await {
                    Ok(()) => {
                        info!("Removed leftover backup {}", paths.backup.display());
                        report.actions.push(ReconcileAction::RemovedBackup(paths.backup));
                    }
                    Err(e) => report.errors.push((paths.backup, e.to_string())),
                }
            }
            continue;
        }

        let backup_present = exists(&paths.backup).await;
        let original_present = exists(&paths.original).await;
        let renamed = paths.target == paths.original || !original_present;

        let pending = record.state() == RecordState::Pending;
        if pending && backup_present && renamed && exists(&paths.target).await {
            record.mark_finished(Utc::now());
            record.converted_size = fs::symlink_metadata(&paths.target).await.ok().map(|m| m.len());
            info!("Completed interrupted swap of {}", paths.target.display());
            report.actions.push(ReconcileAction::CompletedSwap(paths.target.clone()));

            if let Err(e) = remove_with_retries(&paths.backup, config.delete_retries).await {
                warn!("Failed to remove backup {}: {}", paths.backup.display(), e);
                report.errors.push((paths.backup, e.to_string()));
            }
            continue;
        }

        if !original_present && backup_present {
            match fs::rename(&paths.backup, &paths.original).await {
                Ok(()) => {
                    info!(
                        "Restored {} from interrupted swap backup {}",
                        paths.original.display(),
                        paths.backup.display()
                    );
                    report.actions.push(ReconcileAction::RestoredOriginal {
                        from: paths.backup.clone(),
                        to: paths.original.clone(),
                    });
                }
                Err(e) => {
                    warn!("Failed to restore {}: {}", paths.original.display(), e);
                    report.errors.push((paths.backup.clone(), e.to_string()));
                }
            }
        }

        if paths.converted != paths.original && exists(&paths.converted).await {
            match fs::remove_file(&paths.converted).await {
                Ok(()) => {
                    info!("Removed stale encoder output {}", paths.converted.display());
                    report.actions.push(ReconcileAction::RemovedStaleOutput(paths.converted));
                }
                Err(e) => {
                    warn!("Failed to remove stale output {}: {}", paths.converted.display(), e);
                    report.errors.push((paths.converted, e.to_string()));
                }
            }
        }
    }

    report
}

async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}
