//! Durable record of published items.
//!
//! One key per line, appended and fsync'd. Item keys are the bare item id;
//! per-platform completions use `<item-id>@<platform>`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use reel_models::{ItemId, Platform};

use crate::error::{WorkerError, WorkerResult};

/// Ledger key of a platform completion.
pub fn platform_key(item_id: &ItemId, platform: Platform) -> String {
    format!("{}@{}", normalize(item_id.as_str()), platform)
}

/// Stored form of a key, shared by lookups and appends.
fn normalize(key: &str) -> &str {
    key.trim()
}

/// Parse ledger text: a legacy JSON array, or one key per line.
///
/// Blank lines and duplicates are ignored. A final line without a newline
/// is treated as torn by a crash and dropped.
fn parse(contents: &str) -> (HashSet<String>, bool) {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('[') {
        if let Ok(ids) = serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            let keys = ids
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            return (keys, true);
        }
    }

    let complete = match contents.rfind('\n') {
        Some(idx) => &contents[..idx],
        None => "",
    };
    let keys = complete
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    (keys, false)
}

/// File-backed set of completed keys.
pub struct Ledger {
    path: PathBuf,
    keys: Mutex<HashSet<String>>,
}

impl Ledger {
    /// Open the ledger at `path`, creating parent directories as needed.
    pub async fn open(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let contents = match fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let (keys, legacy) = parse(&contents);
        if legacy {
            info!(path = %path.display(), count = keys.len(), "Importing legacy JSON ledger");
            rewrite(&path, &keys).await?;
        } else if !contents.is_empty() && !contents.ends_with('\n') {
            warn!(path = %path.display(), "Dropping torn final ledger line");
            rewrite(&path, &keys).await?;
        }

        debug!(path = %path.display(), count = keys.len(), "Ledger loaded");
        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the item completed every required platform.
    pub async fn seen(&self, item_id: &ItemId) -> bool {
        self.contains(item_id.as_str()).await
    }

    /// Check if the item already published to `platform`.
    pub async fn seen_platform(&self, item_id: &ItemId, platform: Platform) -> bool {
        self.contains(&platform_key(item_id, platform)).await
    }

    /// Record the item as done. Idempotent.
    pub async fn mark(&self, item_id: &ItemId) -> WorkerResult<()> {
        self.append(item_id.as_str()).await
    }

    /// Record a single platform completion. Idempotent.
    pub async fn mark_platform(&self, item_id: &ItemId, platform: Platform) -> WorkerResult<()> {
        self.append(&platform_key(item_id, platform)).await
    }

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.lock().await.is_empty()
    }

    async fn contains(&self, key: &str) -> bool {
        self.keys.lock().await.contains(normalize(key))
    }

    async fn append(&self, key: &str) -> WorkerResult<()> {
        let key = normalize(key);
        if key.is_empty() || key.contains('\n') {
            return Err(WorkerError::ledger(format!("invalid ledger key {key:?}")));
        }

        // Held across the write so appends never interleave
        let mut keys = self.keys.lock().await;
        if keys.contains(key) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{key}\n").as_bytes()).await?;
        file.sync_all().await?;

        keys.insert(key.to_string());
        debug!(key, "Ledger entry appended");
        Ok(())
    }
}

/// Replace the ledger file with the line format, via a temp file and rename.
async fn rewrite(path: &Path, keys: &HashSet<String>) -> WorkerResult<()> {
    let mut sorted: Vec<&String> = keys.iter().collect();
    sorted.sort();
    let mut body = String::new();
    for key in sorted {
        body.push_str(key);
        body.push('\n');
    }

    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(body.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mark_is_idempotent_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("published.ledger");
        let id = ItemId::from(42u64);

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(!ledger.seen(&id).await);
        for _ in 0..5 {
            ledger.mark(&id).await.unwrap();
        }
        assert!(ledger.seen(&id).await);

        let reloaded = Ledger::open(&path).await.unwrap();
        assert!(reloaded.seen(&id).await);
        assert_eq!(reloaded.len().await, 1);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "42\n");
    }

    #[tokio::test]
    async fn test_platform_keys_are_separate() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("l")).await.unwrap();
        let id = ItemId::from(7u64);

        ledger.mark_platform(&id, Platform::FeedVideo).await.unwrap();
        assert!(ledger.seen_platform(&id, Platform::FeedVideo).await);
        assert!(!ledger.seen_platform(&id, Platform::ShortForm).await);
        assert!(!ledger.seen(&id).await);
    }

    #[tokio::test]
    async fn test_tolerates_blank_duplicate_and_torn_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("published.ledger");
        std::fs::write(&path, "1\n\n2\n1\n  \n3").unwrap();

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.seen(&ItemId::from(1u64)).await);
        assert!(ledger.seen(&ItemId::from(2u64)).await);
        assert!(!ledger.seen(&ItemId::from(3u64)).await);
        assert_eq!(ledger.len().await, 2);

        // Appends after a torn line start on a fresh line
        ledger.mark(&ItemId::from(4u64)).await.unwrap();
        let reloaded = Ledger::open(&path).await.unwrap();
        assert!(reloaded.seen(&ItemId::from(4u64)).await);
        assert_eq!(reloaded.len().await, 3);
    }

    #[tokio::test]
    async fn test_imports_legacy_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.json");
        std::fs::write(&path, r#"["10", "11", 12]"#).unwrap();

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.seen(&ItemId::from(10u64)).await);
        assert!(ledger.seen(&ItemId::from(12u64)).await);

        ledger.mark(&ItemId::from(13u64)).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "10\n11\n12\n13\n");
    }

    #[tokio::test]
    async fn test_missing_file_and_parent_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("published.ledger");

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.is_empty().await);
        ledger.mark(&ItemId::from(1u64)).await.unwrap();
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_padded_ids_match_their_stored_form() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("published.ledger");
        let padded = ItemId::new(" 42 ");

        let ledger = Ledger::open(&path).await.unwrap();
        ledger.mark(&padded).await.unwrap();
        ledger.mark_platform(&padded, Platform::ShortForm).await.unwrap();
        assert!(ledger.seen(&padded).await);
        assert!(ledger.seen(&ItemId::from(42u64)).await);
        assert!(ledger.seen_platform(&padded, Platform::ShortForm).await);

        let reloaded = Ledger::open(&path).await.unwrap();
        assert!(reloaded.seen(&padded).await);
        assert!(reloaded.seen_platform(&ItemId::from(42u64), Platform::ShortForm).await);
    }

    #[tokio::test]
    async fn test_rejects_invalid_keys() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("l")).await.unwrap();
        assert!(ledger.mark(&ItemId::new("a\nb")).await.is_err());
        assert!(ledger.mark(&ItemId::new("  ")).await.is_err());
    }
}
