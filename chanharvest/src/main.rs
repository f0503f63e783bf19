use anyhow::Result;
use chanharvest::cli;
use chanharvest::config::HarvesterConfig;
use chanharvest::telemetry;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Imports boards, threads, posts, and media from a chan-style upstream API"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest a single thread: `thread g 12345678` or `thread <url>`
    Thread {
        /// Board slug, or a full thread URL when no number is given
        board: String,
        thread_no: Option<i64>,
        /// Skip media downloads
        #[arg(long)]
        no_media: bool,
        /// Skip thumbnail generation
        #[arg(long)]
        no_thumbs: bool,
    },
    /// Harvest a board's catalog (OP posts only)
    Catalog {
        board: String,
        #[arg(long)]
        no_media: bool,
    },
    /// Harvest an entire board: catalog, optional archive, full threads
    Board {
        board: String,
        /// Include archived threads
        #[arg(long)]
        archive: bool,
        /// Max threads to harvest (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long)]
        no_media: bool,
        #[arg(long)]
        no_thumbs: bool,
    },
    /// Harvest several boards sequentially
    Multi {
        #[arg(required = true)]
        boards: Vec<String>,
        #[arg(long)]
        archive: bool,
        /// Max threads per board (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long)]
        no_media: bool,
        #[arg(long)]
        no_thumbs: bool,
    },
    /// List the boards advertised by the upstream API
    ListBoards,
    /// Show a board's catalog without importing anything
    Preview {
        board: String,
        /// Number of threads to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();
    let mut config = HarvesterConfig::from_env()?;

    match args.command {
        Command::Thread {
            board,
            thread_no,
            no_media,
            no_thumbs,
        } => {
            config.media.download_media = !no_media;
            config.media.generate_thumbnails = !no_thumbs;
            cli::run_thread(&config, &board, thread_no).await
        }
        Command::Catalog { board, no_media } => {
            config.media.download_media = !no_media;
            cli::run_catalog(&config, &board).await
        }
        Command::Board {
            board,
            archive,
            limit,
            no_media,
            no_thumbs,
        } => {
            config.media.download_media = !no_media;
            config.media.generate_thumbnails = !no_thumbs;
            cli::run_board(&config, &board, archive, limit).await
        }
        Command::Multi {
            boards,
            archive,
            limit,
            no_media,
            no_thumbs,
        } => {
            config.media.download_media = !no_media;
            config.media.generate_thumbnails = !no_thumbs;
            cli::run_multi(&config, &boards, archive, limit).await
        }
        Command::ListBoards => cli::run_list_boards(&config).await,
        Command::Preview { board, limit } => cli::run_preview(&config, &board, limit).await,
    }
}
