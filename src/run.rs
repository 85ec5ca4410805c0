use std::path::{Path, PathBuf};

use crate::access::AccessLayer;
use crate::checkpoint::Checkpoint;
use crate::cli::RunArgs;
use crate::collect;
use crate::config::Config;
use crate::export;
use crate::fetch::{self, ItemRange};

/// Both phases in one invocation: walk the paginated list, then fetch every
/// chapter, sharing one browser session and one checkpoint.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = Config::load(Path::new(&args.config))?;
    let book_id = collect::resolve_book_id(args.book_id.as_deref(), args.url.as_deref())?;

    let checkpoint_path = args
        .checkpoint
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| collect::default_checkpoint_path(&book_id));
    let mut checkpoint = Checkpoint::open(checkpoint_path, &book_id, args.fresh)?;

    let mut access = AccessLayer::new(&config)?;
    let result = run_phases(&mut access, &mut checkpoint, &config, &book_id, &args).await;
    access.shutdown().await;
    result
}

async fn run_phases(
    access: &mut AccessLayer,
    checkpoint: &mut Checkpoint,
    config: &Config,
    book_id: &str,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let links =
        collect::collect_links(access, checkpoint, config, book_id, args.max_pages).await?;
    if links.is_empty() {
        anyhow::bail!("no chapters found for book {book_id}");
    }

    let links_path = collect::default_links_path(book_id);
    collect::write_links_file(&links_path, book_id, &links)?;
    tracing::info!(count = links.len(), path = %links_path.display(), "chapter links saved");

    let out_base = args
        .out
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| fetch::default_output_base(book_id));
    let range = ItemRange {
        start: args.start,
        end: args.end,
        limit: args.limit,
    };

    let stats = fetch::fetch_chapters(
        access,
        checkpoint,
        config,
        &links,
        range,
        &mut |checkpoint| export::write_outputs(args.format, &out_base, checkpoint),
    )
    .await?;

    export::write_outputs(args.format, &out_base, checkpoint)?;
    fetch::report(checkpoint, stats);

    Ok(())
}
