//! # File Management Module
//!
//! Questo modulo gestisce la discovery delle cartelle e le utilità sui file.
//!
//! ## Responsabilità:
//! - Enumerazione ricorsiva delle cartelle sotto la root
//! - Raccolta degli errori di lettura come dati (non solo log)
//! - Utilità su nomi ed estensioni dei file
//! - Formattazione human-readable delle dimensioni
//!
//! ## Politica di traversal:
//! - Depth-first, la cartella padre precede sempre le figlie
//! - La root è sempre il primo elemento
//! - I symlink a cartelle NON vengono seguiti
//! - Un'entry illeggibile viene saltata, i fratelli continuano
//! - L'ordine dipende dal listing del filesystem e non è garantito stabile
//!
//! ## Esempio:
//! ```ignore
//! let scan = FileManager::enumerate_folders(Path::new("/media"))?;
//! for (path, error) in &scan.skipped {
//!     warn!("skipped {}: {}", path.display(), error);
//! }
//! ```

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::MinifyError;

/// Result of a directory enumeration
#[derive(Debug, Default)]
pub struct FolderScan {
    /// Root followed by every descendant directory, parents first
    pub folders: Vec<PathBuf>,
    /// Entries that could not be inspected, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// List `root` and all its descendant directories, depth-first.
    ///
    /// Fails only when the root itself cannot be read.
    pub fn enumerate_folders(root: &Path) -> Result<FolderScan> {
        let metadata = std::fs::metadata(root).map_err(|e| {
            MinifyError::Discovery(format!("Cannot access root {}: {}", root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(MinifyError::Discovery(format!("Root is not a directory: {}", root.display())).into());
        }
        std::fs::read_dir(root).map_err(|e| {
            MinifyError::Discovery(format!("Cannot read root {}: {}", root.display(), e))
        })?;

        Ok(Self::collect_folders(root, WalkDir::new(root).follow_links(false)))
    }

    /// Split a walk into directories and entries that could not be read.
    pub fn collect_folders<I>(root: &Path, walk: I) -> FolderScan
    where
        I: IntoIterator<Item = walkdir::Result<walkdir::DirEntry>>,
    {
        let mut scan = FolderScan::default();
        for entry in walk {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_dir() {
                        debug!("Found folder: {}", entry.path().display());
                        scan.folders.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!("Failed to find directories(folder={}): {}", path.display(), e);
                    scan.skipped.push((path, e.to_string()));
                }
            }
        }

        scan
    }

    /// File size in bytes, without following symlinks
    pub async fn file_size(path: &Path) -> Result<u64> {
        Ok(fs::symlink_metadata(path).await?.len())
    }

    /// Name without its last extension (`clip.new.mp4` -> `clip.new`)
    pub fn base_name(file_name: &str) -> &str {
        match Path::new(file_name).extension() {
            Some(ext) => &file_name[..file_name.len() - ext.len() - 1],
            None => file_name,
        }
    }

    /// Case-insensitive extension check; `extensions` must be lowercase
    pub fn has_extension_in(path: &Path, extensions: &[String]) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| *e == ext_lower)
        } else {
            false
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enumerate_parent_before_children() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("a").join("a1")).unwrap();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("a").join("file.mp4"), b"x").unwrap();

        let scan = FileManager::enumerate_folders(root).unwrap();
        assert_eq!(scan.folders.len(), 4);
        assert_eq!(scan.folders[0], root);
        assert!(scan.skipped.is_empty());

        let pos = |p: PathBuf| scan.folders.iter().position(|f| *f == p).unwrap();
        assert!(pos(root.join("a")) < pos(root.join("a").join("a1")));
        assert!(!scan.folders.contains(&root.join("a").join("file.mp4")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_not_followed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(outside.join("deep")).unwrap();
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        // A loop back to the root must not hang the scan
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        let scan = FileManager::enumerate_folders(&root).unwrap();
        assert_eq!(scan.folders, vec![root.clone()]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        assert!(FileManager::enumerate_folders(&temp.path().join("missing")).is_err());

        let file = temp.path().join("file.mp4");
        std::fs::write(&file, b"x").unwrap();
        assert!(FileManager::enumerate_folders(&file).is_err());
    }

    #[test]
    fn test_unreadable_folder_is_skipped_and_walk_continues() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("a").join("inner")).unwrap();
        std::fs::create_dir(root.join("b")).unwrap();
        std::fs::create_dir(root.join("c")).unwrap();

        // Sorted walk lists the root up front; "b" vanishes before it is opened
        let walk = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .inspect(|entry| {
                if let Ok(entry) = entry {
                    if entry.path() == root.join("a") {
                        std::fs::remove_dir(root.join("b")).unwrap();
                    }
                }
            });
        let scan = FileManager::collect_folders(root, walk);

        assert_eq!(
            scan.folders,
            vec![
                root.to_path_buf(),
                root.join("a"),
                root.join("a").join("inner"),
                root.join("c"),
            ]
        );
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(scan.skipped[0].0, root.join("b"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(FileManager::base_name("clip.MOV"), "clip");
        assert_eq!(FileManager::base_name("clip.new.mp4"), "clip.new");
        assert_eq!(FileManager::base_name("noext"), "noext");
        assert_eq!(FileManager::base_name(".hidden"), ".hidden");
    }

    #[test]
    fn test_has_extension_in() {
        let exts = vec!["mp4".to_string(), "mts".to_string()];
        assert!(FileManager::has_extension_in(Path::new("a.MP4"), &exts));
        assert!(FileManager::has_extension_in(Path::new("d.mts"), &exts));
        assert!(!FileManager::has_extension_in(Path::new("c.txt"), &exts));
        assert!(!FileManager::has_extension_in(Path::new("mp4"), &exts));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
    }
}
