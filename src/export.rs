use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use rusqlite::{Connection, params};

use crate::checkpoint::Checkpoint;
use crate::clean;
use crate::cli::OutputFormat;
use crate::formats::{BookExport, BookInfo, ChapterRecord};

/// Export the checkpoint's content-bearing chapters to `base` with an
/// extension per format. Safe to call repeatedly: every writer overwrites or
/// upserts by book id, never appends duplicates.
pub fn write_outputs(
    format: OutputFormat,
    base: &Path,
    checkpoint: &Checkpoint,
) -> anyhow::Result<()> {
    let book_id = checkpoint.book_id().unwrap_or("unknown").to_owned();
    let book_title = checkpoint
        .get_metadata("book_title")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Book {book_id}"));

    let chapters: Vec<ChapterRecord> = checkpoint
        .chapters()
        .iter()
        .filter(|c| c.has_content())
        .cloned()
        .collect();

    let book_info = BookInfo {
        book_id,
        title: book_title,
        total_chapters: chapters.len(),
        exported_at: chrono::Utc::now().to_rfc3339(),
    };

    match format {
        OutputFormat::Json => export_json(&base.with_extension("json"), &book_info, &chapters)?,
        OutputFormat::Sqlite => export_sqlite(&base.with_extension("db"), &book_info, &chapters)?,
        OutputFormat::Txt => export_txt(&base.with_extension("txt"), &book_info, &chapters)?,
        OutputFormat::All => {
            export_json(&base.with_extension("json"), &book_info, &chapters)?;
            export_sqlite(&base.with_extension("db"), &book_info, &chapters)?;
            export_txt(&base.with_extension("txt"), &book_info, &chapters)?;
        }
    }

    Ok(())
}

pub fn export_json(
    path: &Path,
    book_info: &BookInfo,
    chapters: &[ChapterRecord],
) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let export = BookExport {
        book_info: book_info.clone(),
        chapters: chapters.to_vec(),
    };
    let json = serde_json::to_string_pretty(&export).context("serialize book json")?;
    std::fs::write(path, json).with_context(|| format!("write book json: {}", path.display()))?;
    tracing::info!(count = chapters.len(), path = %path.display(), "exported json");
    Ok(())
}

/// Reader-app compatible schema; rows for this book are replaced wholesale.
pub fn export_sqlite(
    path: &Path,
    book_info: &BookInfo,
    chapters: &[ChapterRecord],
) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let mut conn =
        Connection::open(path).with_context(|| format!("open chapters db: {}", path.display()))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            order_index INTEGER NOT NULL,
            url TEXT
        )",
    )
    .context("create chapters table")?;

    let tx = conn.transaction().context("begin chapters transaction")?;
    tx.execute(
        "DELETE FROM chapters WHERE book_id = ?1",
        params![book_info.book_id],
    )
    .context("clear existing chapters")?;
    for chapter in chapters {
        tx.execute(
            "INSERT INTO chapters (book_id, title, content, order_index, url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                book_info.book_id,
                chapter.title,
                chapter.content.as_deref().unwrap_or_default(),
                chapter.order_index as i64,
                chapter.url,
            ],
        )
        .context("insert chapter")?;
    }
    tx.commit().context("commit chapters transaction")?;

    tracing::info!(count = chapters.len(), path = %path.display(), "exported sqlite");
    Ok(())
}

pub fn export_txt(
    path: &Path,
    book_info: &BookInfo,
    chapters: &[ChapterRecord],
) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("create book txt: {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);

    writeln!(out, "Book: {}", book_info.title)?;
    writeln!(out, "ID: {}", book_info.book_id)?;
    writeln!(out, "{}", "=".repeat(80))?;
    writeln!(out)?;

    for chapter in chapters {
        let number =
            clean::extract_chapter_number(&chapter.title).unwrap_or(chapter.order_index as u32 + 1);
        writeln!(out, "Chapter {number}")?;
        writeln!(out, "{}", chapter.title)?;
        writeln!(out, "{}", "-".repeat(80))?;
        writeln!(out)?;
        writeln!(out, "{}", chapter.content.as_deref().unwrap_or_default())?;
        writeln!(out)?;
        writeln!(out, "{}", "=".repeat(80))?;
        writeln!(out)?;
    }

    out.flush()
        .with_context(|| format!("flush book txt: {}", path.display()))?;
    tracing::info!(count = chapters.len(), path = %path.display(), "exported txt");
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }
    }
    Ok(())
}
