use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect chapter links from the paginated list and save them to JSON.
    Links(LinksArgs),
    /// Fetch chapter content for links collected by `links`.
    Chapters(ChaptersArgs),
    /// Collect links and fetch chapter content in one invocation.
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Sqlite,
    Txt,
    All,
}

#[derive(Debug, Args)]
#[command(group = ArgGroup::new("book").required(true).args(["book_id", "url"]))]
pub struct LinksArgs {
    /// Book id on the source site (e.g. 133485).
    #[arg(long)]
    pub book_id: Option<String>,

    /// Novel URL; the book id is extracted from it.
    #[arg(long)]
    pub url: Option<String>,

    /// Configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub config: String,

    /// Checkpoint file (default: output/checkpoint_<book-id>.json).
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Output links file (default: output/chapter_links_<book-id>.json).
    #[arg(long)]
    pub out: Option<String>,

    /// Limit the number of list pages scanned.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Discard prior progress for this book before starting.
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// Links file produced by the `links` command.
    #[arg(long)]
    pub links: String,

    /// Configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub config: String,

    /// Checkpoint file (default: output/checkpoint_<book-id>.json).
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Output base path, extension per format (default: output/chapters_<book-id>).
    #[arg(long)]
    pub out: Option<String>,

    /// Export format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// First link index to fetch (0-based, inclusive).
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Last link index to fetch (0-based, exclusive).
    #[arg(long)]
    pub end: Option<usize>,

    /// Fetch at most this many links this run.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Discard prior progress for this book before starting.
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Args)]
#[command(group = ArgGroup::new("book").required(true).args(["book_id", "url"]))]
pub struct RunArgs {
    /// Book id on the source site (e.g. 133485).
    #[arg(long)]
    pub book_id: Option<String>,

    /// Novel URL; the book id is extracted from it.
    #[arg(long)]
    pub url: Option<String>,

    /// Configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub config: String,

    /// Checkpoint file (default: output/checkpoint_<book-id>.json).
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Output base path, extension per format (default: output/chapters_<book-id>).
    #[arg(long)]
    pub out: Option<String>,

    /// Export format.
    #[arg(long, value_enum, default_value_t = OutputFormat::All)]
    pub format: OutputFormat,

    /// Limit the number of list pages scanned.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// First link index to fetch (0-based, inclusive).
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Last link index to fetch (0-based, exclusive).
    #[arg(long)]
    pub end: Option<usize>,

    /// Fetch at most this many links this run.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Discard prior progress for this book before starting.
    #[arg(long)]
    pub fresh: bool,
}
