use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::access::{AccessLayer, PageFetcher};
use crate::checkpoint::Checkpoint;
use crate::cli::LinksArgs;
use crate::config::Config;
use crate::formats::{ChapterRecord, LinksFile};
use crate::parse;

pub async fn run(args: LinksArgs) -> anyhow::Result<()> {
    let config = Config::load(Path::new(&args.config))?;
    let book_id = resolve_book_id(args.book_id.as_deref(), args.url.as_deref())?;

    let checkpoint_path = args
        .checkpoint
        .map(PathBuf::from)
        .unwrap_or_else(|| default_checkpoint_path(&book_id));
    let mut checkpoint = Checkpoint::open(checkpoint_path, &book_id, args.fresh)?;

    let mut access = AccessLayer::new(&config)?;
    let result = collect_links(&mut access, &mut checkpoint, &config, &book_id, args.max_pages).await;
    access.shutdown().await;
    let links = result?;

    let out_path = args
        .out
        .map(PathBuf::from)
        .unwrap_or_else(|| default_links_path(&book_id));
    write_links_file(&out_path, &book_id, &links)?;
    tracing::info!(count = links.len(), path = %out_path.display(), "chapter links saved");

    Ok(())
}

pub fn resolve_book_id(book_id: Option<&str>, url: Option<&str>) -> anyhow::Result<String> {
    if let Some(id) = book_id {
        return Ok(id.to_owned());
    }
    if let Some(url) = url {
        return parse::extract_book_id_from_url(url)
            .ok_or_else(|| anyhow::anyhow!("could not extract a book id from url: {url}"));
    }
    anyhow::bail!("either --book-id or --url is required")
}

pub fn default_checkpoint_path(book_id: &str) -> PathBuf {
    PathBuf::from(format!("output/checkpoint_{book_id}.json"))
}

pub fn default_links_path(book_id: &str) -> PathBuf {
    PathBuf::from(format!("output/chapter_links_{book_id}.json"))
}

pub fn write_links_file(path: &Path, book_id: &str, links: &[ChapterRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create links dir: {}", parent.display()))?;
        }
    }
    let file = LinksFile {
        book_id: book_id.to_owned(),
        links: links
            .iter()
            .map(|link| ChapterRecord::link(link.url.clone(), link.title.clone(), link.order_index))
            .collect(),
    };
    let json = serde_json::to_string_pretty(&file).context("serialize links file")?;
    std::fs::write(path, json).with_context(|| format!("write links file: {}", path.display()))
}

/// Walk the paginated chapter list, recording every newly seen link in the
/// checkpoint as it is discovered. Page 1 is fetched first to learn the
/// total page count; already-completed pages are skipped on resume and
/// `order_index` only ever appends.
pub async fn collect_links(
    fetcher: &mut dyn PageFetcher,
    checkpoint: &mut Checkpoint,
    config: &Config,
    book_id: &str,
    max_pages: Option<u32>,
) -> anyhow::Result<Vec<ChapterRecord>> {
    let first_url = config.site.first_page_url(book_id);
    tracing::info!(url = %first_url, "fetching first chapter list page");

    // Chapter lists are rendered client-side; the browser transport is
    // mandatory here.
    let Some(first_html) = fetcher.fetch(&first_url, true).await? else {
        anyhow::bail!("no chapters found: failed to fetch first list page {first_url}");
    };

    if checkpoint.get_metadata("book_title").is_none() {
        if let Some(title) = parse::detect_book_title(&first_html) {
            tracing::info!(title = %title, "detected book title");
            checkpoint.set_metadata("book_title", serde_json::Value::String(title))?;
        }
    }

    let mut total = parse::detect_total_pages(&first_html);
    if total > config.pagination.max_pages_cap {
        tracing::warn!(
            detected = total,
            cap = config.pagination.max_pages_cap,
            "detected page count exceeds safety cap"
        );
        total = config.pagination.max_pages_cap;
    }
    if let Some(limit) = max_pages {
        total = total.min(limit.max(1));
    }
    tracing::info!(total, "chapter list pages to scan");

    let mut collected: Vec<ChapterRecord> = checkpoint.chapters().to_vec();
    let mut seen: HashSet<String> = collected.iter().map(|c| c.url.clone()).collect();
    if !collected.is_empty() {
        tracing::info!(count = collected.len(), "resuming with chapters from checkpoint");
    }

    for page in 1..=total {
        if checkpoint.is_page_complete(page) {
            tracing::debug!(page, "list page already collected; skipping");
            continue;
        }

        let page_url = if page == 1 {
            first_url.clone()
        } else {
            config.site.page_url(book_id, page)
        };

        let html = if page == 1 {
            Some(first_html.clone())
        } else {
            tokio::time::sleep(config.rate_limit.delay(config.rate_limit.list_multiplier)).await;
            fetcher.fetch(&page_url, true).await?
        };
        let Some(html) = html else {
            tracing::warn!(page, "failed to fetch list page; it stays pending for the next run");
            continue;
        };

        let (mut items, _next) =
            parse::parse_chapter_list(&html, &config.site.base_url, &config.selectors);

        if items.is_empty() {
            // One extended-wait retry; a transient render failure must not
            // silently truncate the collection.
            tracing::warn!(page, "no chapters extracted; retrying once after extended wait");
            tokio::time::sleep(config.retry.empty_page_wait()).await;
            if let Some(retry_html) = fetcher.fetch(&page_url, true).await? {
                (items, _) =
                    parse::parse_chapter_list(&retry_html, &config.site.base_url, &config.selectors);
            }
            if items.is_empty() {
                tracing::warn!(page, "list page still empty after retry; accepting as exhausted");
            }
        }

        let mut new_count = 0usize;
        for item in items {
            if seen.contains(&item.url) {
                continue;
            }
            let record = ChapterRecord::link(item.url.clone(), item.title, collected.len());
            seen.insert(item.url);
            checkpoint.record_chapter(record.clone())?;
            collected.push(record);
            new_count += 1;
        }
        tracing::info!(page, new = new_count, total = collected.len(), "collected chapter links");

        checkpoint.mark_page_complete(page)?;
    }

    Ok(collected)
}
