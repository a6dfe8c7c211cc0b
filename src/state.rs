//! # State Management Module
//!
//! Questo modulo gestisce il manifest per cartella che traccia il ciclo di vita
//! della conversione di ogni file video.
//!
//! ## Responsabilità:
//! - Costruisce il manifest alla prima visita di una cartella (discovery)
//! - Rilegge il manifest nelle visite successive senza rivalidarlo
//! - Persiste il manifest dopo ogni transizione di stato
//! - Applica la ignore list (case-insensitive) solo in fase di costruzione
//!
//! ## Strutture dati:
//! - `MediaRecord`: Un file video e il suo stato (pending/done/failed)
//! - `FolderManifest`: Sequenza ordinata di record di una cartella
//! - `StateManager`: Lettura/scrittura del file sidecar
//!
//! ## Strategia di persistence:
//! - Un file JSON nascosto dentro ogni cartella scansionata
//! - Scrittura su file temporaneo nella stessa cartella + rename atomico
//! - Un sidecar illeggibile viene trattato come assente e ricostruito
//!
//! ## Esempio struttura state file:
//! ```json
//! [
//!   {
//!     "fileName": "clip.mov",
//!     "originalSize": 1048576,
//!     "convertStarted": "2024-03-01T10:00:00.000Z",
//!     "convertFinished": "2024-03-01T10:05:12.311Z",
//!     "convertedSize": 524288
//!   },
//!   { "fileName": "other.mp4", "originalSize": 2048 }
//! ]
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::MinifyError;
use crate::file_manager::FileManager;

/// Lifecycle position of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Never attempted, or interrupted before reaching a terminal state
    Pending,
    /// Converted and swapped in
    Done,
    /// Conversion or swap failed
    Failed,
}

/// One discovered video file and its conversion progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub file_name: String,
    #[serde(default)]
    pub original_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_finished: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl MediaRecord {
    pub fn new(file_name: impl Into<String>, original_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            original_size,
            convert_started: None,
            convert_finished: None,
            converted_size: None,
            failed_at: None,
        }
    }

    /// `convert_started` alone never makes a record terminal.
    ///
    /// `failed_at` wins over `convert_finished`: older sidecars stamped the
    /// finish time before the swap and added `failedAt` when the swap failed.
    pub fn state(&self) -> RecordState {
        if self.failed_at.is_some() {
            RecordState::Failed
        } else if self.convert_finished.is_some() {
            RecordState::Done
        } else {
            RecordState::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state() != RecordState::Pending
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.convert_started = Some(at);
    }

    pub fn mark_finished(&mut self, at: DateTime<Utc>) {
        self.failed_at = None;
        self.convert_finished = Some(at);
    }

    pub fn mark_failed(&mut self, at: DateTime<Utc>) {
        self.convert_finished = None;
        self.converted_size = None;
        self.failed_at = Some(at);
    }

    /// Put a failed record back in the queue. Returns false if it was not failed.
    pub fn reset_failed(&mut self) -> bool {
        if self.state() != RecordState::Failed {
            return false;
        }
        self.failed_at = None;
        self.convert_started = None;
        self.convert_finished = None;
        self.converted_size = None;
        true
    }
}

/// Ordered records of one folder, persisted as its sidecar file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderManifest {
    pub records: Vec<MediaRecord>,
}

impl FolderManifest {
    pub fn new(records: Vec<MediaRecord>) -> Self {
        Self { records }
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_terminal()).count()
    }

    pub fn count(&self, state: RecordState) -> usize {
        self.records.iter().filter(|r| r.state() == state).count()
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.file_name.as_str()).collect()
    }
}

/// Reads and writes per-folder manifests
#[derive(Debug, Clone)]
pub struct StateManager {
    stats_file_name: String,
    ignore_file_name: String,
    video_extensions: Vec<String>,
    target_extension: String,
}

impl StateManager {
    pub fn new(config: &Config) -> Self {
        Self {
            stats_file_name: config.stats_file_name.clone(),
            ignore_file_name: config.ignore_file_name.clone(),
            video_extensions: config.video_extensions.iter().map(|e| e.to_lowercase()).collect(),
            target_extension: config.target_extension.to_lowercase(),
        }
    }

    pub fn state_file_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.stats_file_name)
    }

    /// Load the folder manifest, building and persisting it on first visit.
    ///
    /// An existing sidecar is returned as-is, without comparing it to the
    /// folder's current contents.
    pub async fn load(&self, folder: &Path) -> Result<FolderManifest> {
        let state_path = self.state_file_path(folder);
        match fs::read_to_string(&state_path).await {
            Ok(content) => match serde_json::from_str::<FolderManifest>(&content) {
                Ok(manifest) => {
                    info!("Stat loaded in folder={}", folder.display());
                    return Ok(manifest);
                }
                Err(e) => {
                    warn!(
                        "Unreadable state file {}, rebuilding: {}",
                        state_path.display(),
                        e
                    );
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Stat file doesn't exist in folder={}", folder.display());
            }
            Err(e) => {
                warn!("Failed to read state file {}, rebuilding: {}", state_path.display(), e);
            }
        }

        let manifest = self.build(folder).await?;
        if let Err(e) = self.save(folder, &manifest).await {
            warn!("Failed to persist new manifest in folder={}: {}", folder.display(), e);
        }
        Ok(manifest)
    }

    /// Scan the folder and register every supported video file.
    pub async fn build(&self, folder: &Path) -> Result<FolderManifest> {
        let ignore_list = self.read_ignore_list(folder).await;

        let mut entries = fs::read_dir(folder).await.map_err(|e| {
            MinifyError::State(format!("Failed to list folder {}: {}", folder.display(), e))
        })?;

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read entry in folder={}: {}", folder.display(), e);
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            // lstat: symlinks are neither followed nor registered
            let metadata = fs::symlink_metadata(entry.path()).await;
            if let Some(record) = self.register(folder, name, metadata, &ignore_list) {
                records.push(record);
            }
        }

        info!(
            "Built manifest for folder={} with {} file(s)",
            folder.display(),
            records.len()
        );
        Ok(FolderManifest::new(records))
    }

    /// Record for one directory entry, or None when it is not a candidate.
    ///
    /// A stat failure only drops the entry; it is never registered as failed.
    fn register(
        &self,
        folder: &Path,
        name: String,
        metadata: std::io::Result<std::fs::Metadata>,
        ignore_list: &HashSet<String>,
    ) -> Option<MediaRecord> {
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    "Failed to load media file={} in folder={}: {}",
                    name,
                    folder.display(),
                    e
                );
                return None;
            }
        };

        if !metadata.is_file() {
            return None;
        }
        if ignore_list.contains(&name.to_uppercase()) {
            debug!("Ignored by ignore list: {}", name);
            return None;
        }
        if !self.is_candidate(&name) {
            return None;
        }

        debug!("Registered media file: {}", name);
        Some(MediaRecord::new(name, metadata.len()))
    }

    /// Overwrite the sidecar with the full manifest.
    ///
    /// The content goes to a temporary file in the same folder first and is then
    /// renamed over the sidecar, so a kill mid-write leaves the previous version.
    pub async fn save(&self, folder: &Path, manifest: &FolderManifest) -> Result<()> {
        let content = serde_json::to_string(manifest)?;
        let folder = folder.to_path_buf();
        let target = self.state_file_path(&folder);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(".media-minifier-")
                .suffix(".tmp")
                .tempfile_in(&folder)?;
            temp.write_all(content.as_bytes())?;
            temp.as_file().sync_all()?;
            temp.persist(&target).map_err(|e| {
                MinifyError::State(format!("Failed to replace {}: {}", target.display(), e.error))
            })?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    /// Upper-cased names from the ignore file; empty when absent or unparsable.
    async fn read_ignore_list(&self, folder: &Path) -> HashSet<String> {
        let path = folder.join(&self.ignore_file_name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => return HashSet::new(),
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(names) => {
                info!("Ignore list loaded in folder={}: {:?}", folder.display(), names);
                names.into_iter().map(|n| n.to_uppercase()).collect()
            }
            Err(e) => {
                debug!("Ignoring unparsable ignore file {}: {}", path.display(), e);
                HashSet::new()
            }
        }
    }

    /// Supported extension, and not a swap intermediate (`*.new.<ext>` / `*.old.<ext>`).
    fn is_candidate(&self, name: &str) -> bool {
        if !FileManager::has_extension_in(Path::new(name), &self.video_extensions) {
            return false;
        }
        let lower = name.to_lowercase();
        let new_suffix = format!(".new.{}", self.target_extension);
        let old_suffix = format!(".old.{}", self.target_extension);
        !(lower.ends_with(&new_suffix) || lower.ends_with(&old_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> StateManager {
        StateManager::new(&Config::default())
    }

    async fn touch(dir: &Path, name: &str, content: &[u8]) {
        fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn test_discovery_filter_with_ignore_list() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(dir, "a.mp4", b"aaaa").await;
        touch(dir, "b.MOV", b"bb").await;
        touch(dir, "c.txt", b"c").await;
        touch(dir, "d.mts", b"ddd").await;
        touch(dir, ".media-minifier-ignore.json", br#"["B.MOV"]"#).await;

        let manifest = manager().load(dir).await.unwrap();
        let mut names = manifest.file_names();
        names.sort();
        assert_eq!(names, vec!["a.mp4", "d.mts"]);

        let a = manifest.records.iter().find(|r| r.file_name == "a.mp4").unwrap();
        assert_eq!(a.original_size, 4);
        assert_eq!(a.state(), RecordState::Pending);
        assert!(a.convert_started.is_none());
        assert!(dir.join(".media-minifer-stats.json").exists());
    }

    #[tokio::test]
    async fn test_unparsable_ignore_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.avi", b"a").await;
        touch(temp.path(), ".media-minifier-ignore.json", b"not json").await;

        let manifest = manager().load(temp.path()).await.unwrap();
        assert_eq!(manifest.file_names(), vec!["a.avi"]);
    }

    #[tokio::test]
    async fn test_subdirectories_and_intermediates_not_registered() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::create_dir(dir.join("nested.mp4")).await.unwrap();
        touch(dir, "clip.new.mp4", b"n").await;
        touch(dir, "clip.OLD.MP4", b"o").await;
        touch(dir, "keep.mov", b"k").await;

        let manifest = manager().load(dir).await.unwrap();
        assert_eq!(manifest.file_names(), vec!["keep.mov"]);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "one.mp4", b"1").await;
        touch(temp.path(), "two.MTS", b"22").await;

        let first = manager().load(temp.path()).await.unwrap();
        let second = manager().load(temp.path()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_existing_manifest_not_revalidated() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "one.mp4", b"1").await;
        let first = manager().load(temp.path()).await.unwrap();

        // Files added later stay invisible until the manifest is rebuilt
        touch(temp.path(), "late.mp4", b"2").await;
        let second = manager().load(temp.path()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.file_names(), vec!["one.mp4"]);
    }

    #[tokio::test]
    async fn test_unparsable_manifest_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "one.mp4", b"1").await;
        touch(temp.path(), ".media-minifer-stats.json", b"{ broken").await;

        let manifest = manager().load(temp.path()).await.unwrap();
        assert_eq!(manifest.file_names(), vec!["one.mp4"]);

        let content = fs::read_to_string(temp.path().join(".media-minifer-stats.json")).await.unwrap();
        assert!(content.contains("one.mp4"));
    }

    #[tokio::test]
    async fn test_save_load_preserves_state() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();

        let mut done = MediaRecord::new("done.mp4", 100);
        done.mark_started(now);
        done.mark_finished(now);
        done.converted_size = Some(40);
        let mut failed = MediaRecord::new("failed.mov", 200);
        failed.mark_started(now);
        failed.mark_failed(now);
        let mut interrupted = MediaRecord::new("crashed.avi", 300);
        interrupted.mark_started(now);

        let manifest = FolderManifest::new(vec![done, failed, interrupted]);
        manager().save(temp.path(), &manifest).await.unwrap();
        let loaded = manager().load(temp.path()).await.unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(loaded.records[0].state(), RecordState::Done);
        assert_eq!(loaded.records[1].state(), RecordState::Failed);
        // Started but never finished: still pending after a restart
        assert_eq!(loaded.records[2].state(), RecordState::Pending);
        assert_eq!(loaded.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let manifest = FolderManifest::new(vec![MediaRecord::new("a.mp4", 1)]);
        manager().save(temp.path(), &manifest).await.unwrap();
        manager().save(temp.path(), &manifest).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![".media-minifer-stats.json".to_string()]);
    }

    #[tokio::test]
    async fn test_unstatable_entry_is_omitted() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "ok.mp4", b"123").await;
        let manager = manager();
        let ignore = HashSet::new();

        let lost = std::io::Error::new(std::io::ErrorKind::NotFound, "vanished");
        assert!(manager
            .register(temp.path(), "gone.mp4".to_string(), Err(lost), &ignore)
            .is_none());

        let metadata = std::fs::symlink_metadata(temp.path().join("ok.mp4"));
        let record = manager
            .register(temp.path(), "ok.mp4".to_string(), metadata, &ignore)
            .unwrap();
        assert_eq!(record, MediaRecord::new("ok.mp4", 3));
    }

    #[tokio::test]
    async fn test_save_into_blocked_sidecar_fails() {
        let temp = TempDir::new().unwrap();
        // A directory where the sidecar should be cannot be replaced by a file
        fs::create_dir(temp.path().join(".media-minifer-stats.json")).await.unwrap();

        let manifest = FolderManifest::new(vec![MediaRecord::new("a.mp4", 1)]);
        assert!(manager().save(temp.path(), &manifest).await.is_err());
    }

    #[test]
    fn test_sidecar_format_is_camel_case_and_sparse() {
        let manifest = FolderManifest::new(vec![MediaRecord::new("clip.mov", 10)]);
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(json, r#"[{"fileName":"clip.mov","originalSize":10}]"#);
    }

    #[test]
    fn test_reads_legacy_records() {
        let json = r#"[
            {"fileName":"a.mp4","originalSize":5,"convertStarted":"2024-03-01T10:00:00.000Z",
             "convertFinished":"2024-03-01T10:05:00.000Z","convertedSize":2},
            {"fileName":"b.mp4","convertStarted":"2024-03-01T10:06:00.000Z","failedAt":null},
            {"fileName":"c.mov","originalSize":7,"convertStarted":"2024-03-01T10:07:00.000Z",
             "convertFinished":"2024-03-01T10:09:00.000Z","failedAt":"2024-03-01T10:09:01.000Z"}
        ]"#;
        let mut manifest: FolderManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.records[0].state(), RecordState::Done);
        assert_eq!(manifest.records[0].converted_size, Some(2));
        assert_eq!(manifest.records[1].state(), RecordState::Pending);
        assert_eq!(manifest.records[1].original_size, 0);

        // Swap failure recorded by older versions: both timestamps set
        assert_eq!(manifest.records[2].state(), RecordState::Failed);
        assert_eq!(manifest.pending_count(), 1);
        assert!(manifest.records[2].reset_failed());
        assert_eq!(manifest.records[2].state(), RecordState::Pending);
        assert!(manifest.records[2].convert_finished.is_none());
    }

    #[test]
    fn test_terminal_states_are_exclusive() {
        let now = Utc::now();
        let mut record = MediaRecord::new("x.mp4", 1);
        record.mark_failed(now);
        assert_eq!(record.state(), RecordState::Failed);
        assert!(record.convert_finished.is_none());

        assert!(record.reset_failed());
        assert_eq!(record.state(), RecordState::Pending);
        assert!(record.convert_started.is_none());
        assert!(!record.reset_failed());

        record.mark_finished(now);
        assert_eq!(record.state(), RecordState::Done);
        assert!(record.failed_at.is_none());
    }
}
