use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::formats::ContentDocument;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub book_id: String,
    pub page_id: String,
}

impl CacheKey {
    pub fn new(book_id: impl Into<String>, page_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            page_id: page_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedPage {
    pub content: ContentDocument,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PageCache: Send + Sync {
    async fn load(&self, key: &CacheKey) -> anyhow::Result<Option<CachedPage>>;
    async fn store(&self, key: &CacheKey, content: &ContentDocument) -> anyhow::Result<()>;
    async fn contains(&self, key: &CacheKey) -> anyhow::Result<bool>;
    async fn remove(&self, key: &CacheKey) -> anyhow::Result<bool>;
    async fn clear_book(&self, book_id: &str) -> anyhow::Result<usize>;
    async fn stats(&self, book_id: &str) -> anyhow::Result<CacheStats>;
    /// Drops every entry (all books) cached before `now - max_age`, plus any
    /// entry that no longer parses. Returns the number of files removed.
    async fn invalidate_older_than(&self, max_age: chrono::Duration) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone)]
pub struct LocalFsPageCache {
    base_dir: PathBuf,
}

impl LocalFsPageCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn books_dir(&self) -> PathBuf {
        self.base_dir.join("books")
    }

    // Ids are hex-encoded so arbitrary API ids are safe as file names.
    fn book_dir(&self, book_id: &str) -> PathBuf {
        self.books_dir().join(hex::encode(book_id))
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.book_dir(&key.book_id)
            .join(format!("{}.json", hex::encode(&key.page_id)))
    }
}

#[async_trait]
impl PageCache for LocalFsPageCache {
    async fn load(&self, key: &CacheKey) -> anyhow::Result<Option<CachedPage>> {
        let path = self.entry_path(key);
        match read_entry(&path).await? {
            Entry::Missing => Ok(None),
            Entry::Valid(page, _) => Ok(Some(page)),
            Entry::Corrupt(err) => {
                tracing::warn!(
                    book_id = %key.book_id,
                    page_id = %key.page_id,
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "evicting unreadable cache entry"
                );
                remove_if_exists(&path).await?;
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &CacheKey, content: &ContentDocument) -> anyhow::Result<()> {
        let path = self.entry_path(key);
        let entry = CachedPage {
            content: content.clone(),
            cached_at: Utc::now(),
        };
        persist_entry(&path, &entry)
            .await
            .with_context(|| format!("write cache entry: {}", path.display()))
    }

    async fn contains(&self, key: &CacheKey) -> anyhow::Result<bool> {
        let path = self.entry_path(key);
        fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))
    }

    async fn remove(&self, key: &CacheKey) -> anyhow::Result<bool> {
        remove_if_exists(&self.entry_path(key)).await
    }

    async fn clear_book(&self, book_id: &str) -> anyhow::Result<usize> {
        let dir = self.book_dir(book_id);
        let files = entry_files(&dir).await?;
        let mut removed = 0;
        for path in &files {
            if remove_if_exists(path).await? {
                removed += 1;
            }
        }
        match fs::remove_dir(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "cache dir not removed");
            }
        }
        tracing::info!(book_id, removed, "cleared cached pages");
        Ok(removed)
    }

    async fn stats(&self, book_id: &str) -> anyhow::Result<CacheStats> {
        let mut stats = CacheStats::default();
        for path in entry_files(&self.book_dir(book_id)).await? {
            let Entry::Valid(page, len) = read_entry(&path).await? else {
                continue;
            };
            stats.entries += 1;
            stats.total_bytes += len;
            stats.oldest = Some(match stats.oldest {
                Some(t) => t.min(page.cached_at),
                None => page.cached_at,
            });
            stats.newest = Some(match stats.newest {
                Some(t) => t.max(page.cached_at),
                None => page.cached_at,
            });
        }
        Ok(stats)
    }

    async fn invalidate_older_than(&self, max_age: chrono::Duration) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;
        for book_dir in subdirs(&self.books_dir()).await? {
            for path in entry_files(&book_dir).await? {
                let expired = match read_entry(&path).await? {
                    Entry::Missing => false,
                    Entry::Valid(page, _) => page.cached_at < cutoff,
                    Entry::Corrupt(_) => true,
                };
                if expired && remove_if_exists(&path).await? {
                    removed += 1;
                }
            }
        }
        tracing::info!(removed, %cutoff, "swept page cache");
        Ok(removed)
    }
}

enum Entry {
    Missing,
    Valid(CachedPage, u64),
    Corrupt(anyhow::Error),
}

async fn read_entry(path: &Path) -> anyhow::Result<Entry> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Entry::Missing),
        Err(err) => {
            return Err(anyhow::Error::new(err).context(format!("read: {}", path.display())));
        }
    };
    let len = bytes.len() as u64;
    match serde_json::from_slice::<CachedPage>(&bytes) {
        Ok(page) => Ok(Entry::Valid(page, len)),
        Err(err) => Ok(Entry::Corrupt(anyhow::Error::new(err).context("parse cache entry"))),
    }
}

async fn remove_if_exists(path: &Path) -> anyhow::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(anyhow::Error::new(err).context(format!("remove: {}", path.display()))),
    }
}

async fn read_dir_paths(dir: &Path) -> anyhow::Result<Vec<(PathBuf, std::fs::FileType)>> {
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(anyhow::Error::new(err).context(format!("read dir: {}", dir.display())));
        }
    };
    let mut out = Vec::new();
    while let Some(entry) = rd
        .next_entry()
        .await
        .with_context(|| format!("read dir entry: {}", dir.display()))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("file type: {}", entry.path().display()))?;
        out.push((entry.path(), file_type));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

async fn subdirs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    Ok(read_dir_paths(dir)
        .await?
        .into_iter()
        .filter(|(_, ty)| ty.is_dir())
        .map(|(path, _)| path)
        .collect())
}

// Entries are staged as `.<name>.<uuid>.tmp` beside the target and never listed.
async fn entry_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    Ok(read_dir_paths(dir)
        .await?
        .into_iter()
        .filter(|(path, ty)| ty.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .map(|(path, _)| path)
        .collect())
}

fn staging_path(path: &Path) -> anyhow::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("cache entry path has no file name: {}", path.display()))?;
    let staged = format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    );
    Ok(path.with_file_name(staged))
}

/// Stages the entry next to `path` and renames it into place, so readers see
/// either the old entry or the new one. The staged file is removed when the
/// write or the rename fails.
async fn persist_entry(path: &Path, entry: &CachedPage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create cache dir: {}", parent.display()))?;
    }

    let bytes = serde_json::to_vec(entry).context("serialize cache entry")?;
    let staged = staging_path(path)?;
    let result = match fs::write(&staged, &bytes).await {
        Ok(()) => fs::rename(&staged, path)
            .await
            .with_context(|| format!("move {} into place", staged.display())),
        Err(err) => Err(err).with_context(|| format!("write {}", staged.display())),
    };
    if result.is_err()
        && let Err(err) = fs::remove_file(&staged).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %staged.display(), error = %err, "failed to remove staged cache entry");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> anyhow::Result<ContentDocument> {
        Ok(serde_json::from_value(serde_json::json!({
            "time": 1,
            "blocks": [{ "type": "paragraph", "data": { "text": text } }],
        }))?)
    }

    #[tokio::test]
    async fn store_then_load_round_trips_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = LocalFsPageCache::new(dir.path());
        let key = CacheKey::new("book/1", "page 7");

        assert!(cache.load(&key).await?.is_none());
        assert!(!cache.contains(&key).await?);

        cache.store(&key, &doc("hello")?).await?;
        assert!(cache.contains(&key).await?);
        let cached = cache.load(&key).await?.expect("cached");
        assert_eq!(cached.content, doc("hello")?);

        cache.store(&key, &doc("fresh")?).await?;
        let cached = cache.load(&key).await?.expect("cached");
        assert_eq!(cached.content, doc("fresh")?);

        assert!(cache.remove(&key).await?);
        assert!(!cache.remove(&key).await?);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_entry_is_evicted_as_a_miss() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = LocalFsPageCache::new(dir.path());
        let key = CacheKey::new("b1", "p1");

        let path = cache.entry_path(&key);
        std::fs::create_dir_all(path.parent().expect("parent"))?;
        std::fs::write(&path, b"{not json")?;

        assert!(cache.load(&key).await?.is_none());
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn stats_and_clear_are_scoped_to_one_book() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = LocalFsPageCache::new(dir.path());
        cache.store(&CacheKey::new("b1", "p1"), &doc("a")?).await?;
        cache.store(&CacheKey::new("b1", "p2"), &doc("b")?).await?;
        cache.store(&CacheKey::new("b2", "p1"), &doc("c")?).await?;

        let stats = cache.stats("b1").await?;
        assert_eq!(stats.entries, 2);
        assert!(stats.total_bytes > 0);
        assert!(stats.oldest <= stats.newest);

        assert_eq!(cache.clear_book("b1").await?, 2);
        assert_eq!(cache.stats("b1").await?, CacheStats::default());
        assert_eq!(cache.stats("b2").await?.entries, 1);
        assert_eq!(cache.clear_book("missing").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_corrupt_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = LocalFsPageCache::new(dir.path());
        let fresh = CacheKey::new("b1", "fresh");
        let stale = CacheKey::new("b1", "stale");
        let broken = CacheKey::new("b2", "broken");

        cache.store(&fresh, &doc("x")?).await?;
        let old = CachedPage {
            content: doc("y")?,
            cached_at: Utc::now() - chrono::Duration::days(10),
        };
        persist_entry(&cache.entry_path(&stale), &old).await?;
        let broken_path = cache.entry_path(&broken);
        std::fs::create_dir_all(broken_path.parent().expect("parent"))?;
        std::fs::write(&broken_path, b"[]")?;

        let removed = cache.invalidate_older_than(chrono::Duration::days(7)).await?;
        assert_eq!(removed, 2);
        assert!(cache.contains(&fresh).await?);
        assert!(!cache.contains(&stale).await?);
        assert!(!cache.contains(&broken).await?);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_on_missing_dir_is_a_no_op() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = LocalFsPageCache::new(dir.path().join("nope"));
        assert_eq!(cache.invalidate_older_than(chrono::Duration::days(1)).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_store_leaves_no_staged_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = LocalFsPageCache::new(dir.path());
        let key = CacheKey::new("book-1", "p1");

        // A non-empty directory at the entry path makes the rename fail.
        let entry_path = cache.entry_path(&key);
        std::fs::create_dir_all(entry_path.join("occupied"))?;

        assert!(cache.store(&key, &doc("one")?).await.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(entry_path.parent().expect("book dir"))?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");

        std::fs::remove_dir_all(&entry_path)?;
        cache.store(&key, &doc("two")?).await?;
        assert!(cache.contains(&key).await?);
        Ok(())
    }
}
