use serde::{Deserialize, Serialize};

/// One chapter of a collection. Link-only until the content fetch succeeds;
/// a record with non-empty content is complete and is never re-fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub order_index: usize,
}

impl ChapterRecord {
    pub fn link(url: impl Into<String>, title: impl Into<String>, order_index: usize) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: None,
            order_index,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFetch {
    pub url: String,
    pub reason: String,
}

/// On-disk shape of the links file written by `links` and read by `chapters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksFile {
    pub book_id: String,
    pub links: Vec<ChapterRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookInfo {
    pub book_id: String,
    pub title: String,
    pub total_chapters: usize,
    pub exported_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookExport {
    pub book_info: BookInfo,
    pub chapters: Vec<ChapterRecord>,
}
