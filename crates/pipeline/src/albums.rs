use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{album_key, AlbumItem};
use tracing::{debug, info, warn};

const LOCK_ATTEMPTS: u32 = 5;
const LOCK_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Persistent album manifests: one JSON array file per collection, updated
/// by whole-file rewrite under an exclusive lock file. Distinct collections
/// never contend; writers to the same collection serialize on the lock.
#[derive(Clone, Debug)]
pub struct AlbumStore {
    dir: PathBuf,
    names: HashSet<String>,
}

impl AlbumStore {
    /// Reads the collection-name list (one name per line, blank lines
    /// ignored) and prepares the manifest directory.
    pub async fn open(dir: PathBuf, names_file: &Path) -> Result<Self, ManifestError> {
        let contents = tokio::fs::read_to_string(names_file).await?;
        let names: HashSet<String> = contents
            .lines()
            .map(album_key)
            .filter(|key| !key.is_empty())
            .collect();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Tracking {} albums under {}", names.len(), dir.display());
        Ok(Self { dir, names })
    }

    pub fn names(&self) -> &HashSet<String> {
        &self.names
    }

    pub fn contains(&self, key: &str) -> bool {
        self.names.contains(key)
    }

    pub fn manifest_path(&self, key: &str) -> PathBuf {
        self.dir.join(manifest_file_name(key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        let mut name = manifest_file_name(key);
        name.push_str(".lock");
        self.dir.join(name)
    }

    /// Appends `items` to the collection's manifest, dropping any whose
    /// `fullPath` is already present. Safe against concurrent callers.
    pub async fn merge_items(
        &self,
        collection: &str,
        items: Vec<AlbumItem>,
    ) -> Result<usize, ManifestError> {
        let lock = self.acquire_lock(collection).await?;
        let result = self.merge_locked(collection, items).await;
        lock.release().await;
        result
    }

    async fn acquire_lock(&self, key: &str) -> Result<LockFile, ManifestError> {
        let path = self.lock_path(key);
        let mut delay = LOCK_INITIAL_DELAY;
        for attempt in 1..=LOCK_ATTEMPTS {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(_) => return Ok(LockFile::new(path)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt == LOCK_ATTEMPTS {
                        break;
                    }
                    debug!(
                        "Manifest for '{}' is locked (attempt {}); retrying in {:?}",
                        key, attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(ManifestError::Io(err)),
            }
        }
        Err(ManifestError::LockBusy {
            attempts: LOCK_ATTEMPTS,
        })
    }

    async fn merge_locked(
        &self,
        key: &str,
        items: Vec<AlbumItem>,
    ) -> Result<usize, ManifestError> {
        let path = self.manifest_path(key);
        let mut current = read_manifest(&path).await?;

        let mut seen: HashSet<String> = current
            .iter()
            .map(|item| item.full_path.clone())
            .collect();
        let mut added = 0usize;
        for item in items {
            if !seen.insert(item.full_path.clone()) {
                continue;
            }
            current.push(item);
            added += 1;
        }
        if added == 0 {
            return Ok(0);
        }

        let data = serde_json::to_vec_pretty(&current)?;
        tokio::fs::write(&path, data).await?;
        Ok(added)
    }
}

async fn read_manifest(path: &Path) -> Result<Vec<AlbumItem>, ManifestError> {
    match tokio::fs::read(path).await {
        Ok(data) if data.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(ManifestError::Io(err)),
    }
}

fn manifest_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 5);
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out.push_str(".json");
    out
}

/// Released explicitly on every merge exit path; the `Drop` fallback covers
/// panics so a wedged lock cannot survive the owning task.
struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            warn!(
                "Failed to remove lock file {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[derive(Debug)]
pub enum ManifestError {
    Io(io::Error),
    Json(serde_json::Error),
    LockBusy { attempts: u32 },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Io(err) => write!(f, "io error: {}", err),
            ManifestError::Json(err) => write!(f, "manifest json error: {}", err),
            ManifestError::LockBusy { attempts } => {
                write!(f, "manifest still locked after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for ManifestError {}

impl From<io::Error> for ManifestError {
    fn from(err: io::Error) -> Self {
        ManifestError::Io(err)
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(err: serde_json::Error) -> Self {
        ManifestError::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{AlbumStore, ManifestError};
    use common::AlbumItem;
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;

    async fn store(dir: &Path, names: &[&str]) -> AlbumStore {
        let names_file = dir.join("albums.txt");
        fs::write(&names_file, names.join("\n")).unwrap();
        AlbumStore::open(dir.join("albums"), &names_file)
            .await
            .unwrap()
    }

    fn item(n: usize) -> AlbumItem {
        AlbumItem {
            name: format!("img_{}.jpg", n),
            relative_path: format!("pictures/img_{}.jpg", n),
            full_path: format!("/out/pictures/img_{}.jpg", n),
        }
    }

    #[tokio::test]
    async fn name_list_is_trimmed_lowercased_and_deblanked() {
        let dir = tempfile::tempdir().unwrap();
        let names_file = dir.path().join("albums.txt");
        fs::write(&names_file, "Summer 2023\n\n  Winter Trip  \n").unwrap();
        let store = AlbumStore::open(dir.path().join("albums"), &names_file)
            .await
            .unwrap();
        assert!(store.contains("summer 2023"));
        assert!(store.contains("winter trip"));
        assert_eq!(store.names().len(), 2);
    }

    #[tokio::test]
    async fn merge_is_idempotent_per_full_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), &["trip"]).await;

        let added = store.merge_items("trip", vec![item(1), item(1)]).await.unwrap();
        assert_eq!(added, 1);
        let added = store.merge_items("trip", vec![item(1), item(2)]).await.unwrap();
        assert_eq!(added, 1);

        let data = fs::read(store.manifest_path("trip")).unwrap();
        let manifest: Vec<AlbumItem> = serde_json::from_slice(&data).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(!store.lock_path("trip").exists());
    }

    #[tokio::test]
    async fn merge_treats_missing_and_empty_manifests_alike() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), &["trip"]).await;
        fs::write(store.manifest_path("trip"), b"  \n").unwrap();

        let added = store.merge_items("trip", vec![item(1)]).await.unwrap();
        assert_eq!(added, 1);
    }

    #[tokio::test]
    async fn held_lock_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), &["trip"]).await;
        fs::write(store.lock_path("trip"), b"").unwrap();

        let err = store.merge_items("trip", vec![item(1)]).await.unwrap_err();
        assert!(matches!(err, ManifestError::LockBusy { attempts: 5 }));
        // The foreign lock stays; only the owner removes it.
        assert!(store.lock_path("trip").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_merges_lose_no_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), &["trip"]).await;

        let mut tasks = tokio::task::JoinSet::new();
        for batch in 0..4usize {
            let store = store.clone();
            tasks.spawn(async move {
                let items = vec![item(batch * 2), item(batch * 2 + 1)];
                store.merge_items("trip", items).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let data = fs::read(store.manifest_path("trip")).unwrap();
        let manifest: Vec<AlbumItem> = serde_json::from_slice(&data).unwrap();
        let paths: HashSet<_> = manifest.iter().map(|i| i.full_path.clone()).collect();
        assert_eq!(manifest.len(), 8);
        assert_eq!(paths.len(), 8);
        assert!(!store.lock_path("trip").exists());
    }
}
