use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::access::{AccessLayer, PageFetcher};
use crate::checkpoint::Checkpoint;
use crate::clean;
use crate::cli::ChaptersArgs;
use crate::collect;
use crate::config::{Config, SelectorConfig};
use crate::export;
use crate::formats::{ChapterRecord, LinksFile};
use crate::parse;

/// Slice of the link list one run works through. Narrowing the range never
/// touches checkpoint semantics; it only shrinks the iteration domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemRange {
    pub start: usize,
    pub end: Option<usize>,
    pub limit: Option<usize>,
}

impl ItemRange {
    pub fn slice<'a>(&self, items: &'a [ChapterRecord]) -> &'a [ChapterRecord] {
        let start = self.start.min(items.len());
        let end = self.end.unwrap_or(items.len()).min(items.len()).max(start);
        let sliced = &items[start..end];
        match self.limit {
            Some(limit) => &sliced[..limit.min(sliced.len())],
            None => sliced,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub async fn run(args: ChaptersArgs) -> anyhow::Result<()> {
    let config = Config::load(Path::new(&args.config))?;

    let raw = std::fs::read_to_string(&args.links)
        .with_context(|| format!("read links file: {}", args.links))?;
    let links_file: LinksFile =
        serde_json::from_str(&raw).with_context(|| format!("parse links file: {}", args.links))?;
    let book_id = links_file.book_id.clone();
    if links_file.links.is_empty() {
        anyhow::bail!("no links found in {}", args.links);
    }
    tracing::info!(count = links_file.links.len(), book_id = %book_id, "loaded chapter links");

    let checkpoint_path = args
        .checkpoint
        .map(PathBuf::from)
        .unwrap_or_else(|| collect::default_checkpoint_path(&book_id));
    let mut checkpoint = Checkpoint::open(checkpoint_path, &book_id, args.fresh)?;

    let out_base = args
        .out
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_base(&book_id));
    let range = ItemRange {
        start: args.start,
        end: args.end,
        limit: args.limit,
    };

    let mut access = AccessLayer::new(&config)?;
    let result = fetch_chapters(
        &mut access,
        &mut checkpoint,
        &config,
        &links_file.links,
        range,
        &mut |checkpoint| export::write_outputs(args.format, &out_base, checkpoint),
    )
    .await;
    access.shutdown().await;
    let stats = result?;

    export::write_outputs(args.format, &out_base, &checkpoint)?;
    report(&checkpoint, stats);

    Ok(())
}

pub fn default_output_base(book_id: &str) -> PathBuf {
    PathBuf::from(format!("output/chapters_{book_id}"))
}

pub fn report(checkpoint: &Checkpoint, stats: FetchStats) {
    tracing::info!(
        completed = stats.completed,
        skipped = stats.skipped,
        failed = stats.failed,
        "chapter fetch finished"
    );
    if !checkpoint.failed().is_empty() {
        tracing::warn!(
            count = checkpoint.failed().len(),
            "some chapters failed; re-run to retry them"
        );
        for failure in checkpoint.failed() {
            tracing::warn!(url = %failure.url, reason = %failure.reason, "failed chapter");
        }
    }
}

/// Fetch content for every link in the range, in discovery order. Completed
/// urls are skipped, one bad item never stops the loop, and every success is
/// committed to the checkpoint before the next item starts.
pub async fn fetch_chapters(
    fetcher: &mut dyn PageFetcher,
    checkpoint: &mut Checkpoint,
    config: &Config,
    links: &[ChapterRecord],
    range: ItemRange,
    flush: &mut dyn FnMut(&Checkpoint) -> anyhow::Result<()>,
) -> anyhow::Result<FetchStats> {
    let slice = range.slice(links);
    tracing::info!(total = links.len(), selected = slice.len(), "fetching chapter content");

    let mut stats = FetchStats::default();
    let mut first = true;

    for link in slice {
        if checkpoint.is_chapter_complete(&link.url) {
            tracing::debug!(url = %link.url, "chapter already fetched; skipping");
            stats.skipped += 1;
            continue;
        }

        if !first {
            tokio::time::sleep(config.rate_limit.delay(config.rate_limit.chapter_multiplier)).await;
        }
        first = false;

        tracing::info!(index = link.order_index, title = %link.title, "fetching chapter");

        let mut html = fetcher.fetch(&link.url, false).await?;
        if html.is_none() {
            tracing::warn!(url = %link.url, "http transport failed; retrying with browser transport");
            html = fetcher.fetch(&link.url, true).await?;
        }
        let Some(html) = html else {
            checkpoint.record_failure(&link.url, "failed to fetch")?;
            stats.failed += 1;
            continue;
        };

        // Parse and clean behind a per-item boundary: a bad page is a failed
        // item, never a dead run.
        match build_chapter(&html, link, &config.selectors) {
            Ok(chapter) => {
                checkpoint.record_chapter(chapter)?;
                stats.completed += 1;

                if config.output.flush_every > 0 && stats.completed % config.output.flush_every == 0
                {
                    if let Err(err) = flush(checkpoint) {
                        tracing::warn!(error = %format!("{err:#}"), "snapshot flush failed");
                    }
                }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                tracing::warn!(url = %link.url, reason = %reason, "chapter parse failed");
                checkpoint.record_failure(&link.url, &reason)?;
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

fn build_chapter(
    html: &str,
    link: &ChapterRecord,
    selectors: &SelectorConfig,
) -> anyhow::Result<ChapterRecord> {
    let parsed = parse::parse_chapter_content(html, selectors);

    let content = clean::clean_text(&parsed.content);
    if content.is_empty() {
        anyhow::bail!("no chapter content extracted");
    }

    let title = if parsed.title.trim().is_empty() {
        link.title.clone()
    } else {
        clean::normalize_title(&parsed.title)
    };

    Ok(ChapterRecord {
        url: link.url.clone(),
        title,
        content: Some(content),
        order_index: link.order_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(n: usize) -> Vec<ChapterRecord> {
        (0..n)
            .map(|i| ChapterRecord::link(format!("https://x/{i}.html"), format!("ch {i}"), i))
            .collect()
    }

    #[test]
    fn range_slices_without_renumbering() {
        let all = links(10);

        let range = ItemRange { start: 2, end: Some(7), limit: None };
        let slice = range.slice(&all);
        assert_eq!(slice.len(), 5);
        assert_eq!(slice[0].order_index, 2);

        let range = ItemRange { start: 2, end: None, limit: Some(3) };
        assert_eq!(range.slice(&all).len(), 3);

        let range = ItemRange { start: 20, end: None, limit: None };
        assert!(range.slice(&all).is_empty());

        let range = ItemRange { start: 5, end: Some(3), limit: None };
        assert!(range.slice(&all).is_empty());
    }
}
