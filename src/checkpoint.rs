use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::formats::{ChapterRecord, FailedFetch};

/// On-disk checkpoint document. Every field defaults so that older or
/// hand-seeded files load cleanly; an absent key is an empty collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointData {
    pub book_id: Option<String>,
    pub completed_pages: BTreeSet<u32>,
    pub completed_chapters: Vec<String>,
    pub chapters: Vec<ChapterRecord>,
    pub failed: Vec<FailedFetch>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Durable record of scraping progress for one book. Every mutation writes
/// the whole document back to disk before returning, so a crash at any point
/// leaves the file consistent with whatever finished last.
pub struct Checkpoint {
    path: PathBuf,
    data: CheckpointData,
    seen: HashSet<String>,
}

impl Checkpoint {
    /// Load from disk. A missing, unreadable or invalid file starts fresh;
    /// corruption is logged, never fatal.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CheckpointData>(&raw) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "checkpoint invalid; starting fresh");
                    CheckpointData::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CheckpointData::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "checkpoint unreadable; starting fresh");
                CheckpointData::default()
            }
        };

        let seen = data.chapters.iter().map(|c| c.url.clone()).collect();
        Self { path, data, seen }
    }

    /// Open the checkpoint for a book: optionally discard same-book progress
    /// first, then bind it to `book_id` (which resets on mismatch).
    pub fn open(path: impl Into<PathBuf>, book_id: &str, fresh: bool) -> anyhow::Result<Self> {
        let mut checkpoint = Self::load(path);
        if fresh {
            checkpoint.clear()?;
        }
        checkpoint.reset(book_id)?;
        Ok(checkpoint)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn book_id(&self) -> Option<&str> {
        self.data.book_id.as_deref()
    }

    /// Bind the checkpoint to a book. Progress recorded for a different book
    /// is discarded, never mixed; same book is a no-op that still persists.
    pub fn reset(&mut self, book_id: &str) -> anyhow::Result<()> {
        match self.data.book_id.as_deref() {
            Some(current) if current == book_id => {}
            Some(current) => {
                tracing::warn!(
                    stored = current,
                    requested = book_id,
                    "checkpoint belongs to a different book; discarding its progress"
                );
                self.data = CheckpointData::default();
                self.seen.clear();
            }
            None => {}
        }
        self.data.book_id = Some(book_id.to_owned());
        self.save()
    }

    /// Explicitly discard all progress (the `--fresh` path).
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.data = CheckpointData::default();
        self.seen.clear();
        self.save()
    }

    pub fn is_page_complete(&self, page: u32) -> bool {
        self.data.completed_pages.contains(&page)
    }

    pub fn mark_page_complete(&mut self, page: u32) -> anyhow::Result<()> {
        self.data.completed_pages.insert(page);
        self.save()
    }

    /// Idempotent upsert keyed by url. A new url appends (insertion order is
    /// the canonical chapter order); a known url at most gains content once.
    /// Content-bearing records are never overwritten and `order_index` is
    /// never reassigned.
    pub fn record_chapter(&mut self, chapter: ChapterRecord) -> anyhow::Result<()> {
        let chapter_has_content = chapter.has_content();
        if self.seen.contains(&chapter.url) {
            if let Some(existing) = self
                .data
                .chapters
                .iter_mut()
                .find(|c| c.url == chapter.url)
            {
                if !existing.has_content() && chapter.has_content() {
                    existing.title = chapter.title;
                    existing.content = chapter.content;
                }
            }
        } else {
            self.seen.insert(chapter.url.clone());
            self.data.completed_chapters.push(chapter.url.clone());
            self.data.chapters.push(chapter.clone());
        }

        if chapter_has_content {
            self.data.failed.retain(|f| f.url != chapter.url);
        }

        self.save()
    }

    /// Complete means content-bearing; a link-only record still needs its
    /// fetch.
    pub fn is_chapter_complete(&self, url: &str) -> bool {
        self.data
            .chapters
            .iter()
            .any(|c| c.url == url && c.has_content())
    }

    pub fn record_failure(&mut self, url: &str, reason: &str) -> anyhow::Result<()> {
        if let Some(existing) = self.data.failed.iter_mut().find(|f| f.url == url) {
            existing.reason = reason.to_owned();
        } else {
            self.data.failed.push(FailedFetch {
                url: url.to_owned(),
                reason: reason.to_owned(),
            });
        }
        self.save()
    }

    pub fn chapters(&self) -> &[ChapterRecord] {
        &self.data.chapters
    }

    pub fn completed_chapters(&self) -> &[String] {
        &self.data.completed_chapters
    }

    pub fn failed(&self) -> &[FailedFetch] {
        &self.data.failed
    }

    pub fn set_metadata(&mut self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.data.metadata.insert(key.to_owned(), value);
        self.save()
    }

    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.metadata.get(key)
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("create checkpoint dir: {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data).context("serialize checkpoint")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write checkpoint: {}", self.path.display()))
    }
}
