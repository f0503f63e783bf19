//! Command implementations for the chanharvest binary.

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

use std::sync::Arc;

use crate::api::ChanClient;
use crate::config::HarvesterConfig;
use crate::database::Database;
use crate::harvester::{Harvester, HarvestStats};
use crate::media::MediaService;
use crate::storage::MediaStorage;

pub async fn build_harvester(config: &HarvesterConfig) -> Result<Harvester> {
    let database = Database::connect(&config.db_path)?;
    database.ensure_migrations()?;
    let client = Arc::new(ChanClient::new(config.upstream.clone())?);
    let media = if config.media.download_media {
        let storage =
            MediaStorage::connect(&config.storage, config.media.thumbnail_max_px).await?;
        Some(MediaService::new(
            client.clone(),
            database.clone(),
            storage,
            config.media.generate_thumbnails,
        ))
    } else {
        None
    };
    Ok(Harvester::new(client, database, media))
}

/// Harvest one thread, addressed as `<board> <no>` or as a full thread URL.
pub async fn run_thread(
    config: &HarvesterConfig,
    target: &str,
    thread_no: Option<i64>,
) -> Result<()> {
    let (board, thread_no) = resolve_target(target, thread_no)?;
    let mut harvester = build_harvester(config).await?;
    println!("Harvesting /{board}/{thread_no} ...");
    let imported = harvester.harvest_thread(&board, thread_no).await?;
    print_stats(&harvester.stats);
    if !imported {
        bail!("thread /{board}/{thread_no} not found or empty");
    }
    println!("Imported thread /{board}/{thread_no}");
    Ok(())
}

pub async fn run_catalog(config: &HarvesterConfig, board: &str) -> Result<()> {
    let mut harvester = build_harvester(config).await?;
    println!("Harvesting catalog for /{board}/ ...");
    let count = harvester.harvest_catalog(board).await?;
    println!("Imported {count} new threads from /{board}/ catalog");
    print_stats(&harvester.stats);
    Ok(())
}

pub async fn run_board(
    config: &HarvesterConfig,
    board: &str,
    include_archive: bool,
    limit: usize,
) -> Result<()> {
    let mut harvester = build_harvester(config).await?;
    println!("Harvesting board /{board}/ ...");
    let count = harvester.harvest_board(board, include_archive, limit).await?;
    println!("Imported {count} threads from /{board}/");
    print_stats(&harvester.stats);
    Ok(())
}

pub async fn run_multi(
    config: &HarvesterConfig,
    boards: &[String],
    include_archive: bool,
    limit: usize,
) -> Result<()> {
    let mut harvester = build_harvester(config).await?;
    println!("Harvesting {} boards", boards.len());
    let results = harvester
        .harvest_boards(boards, include_archive, limit)
        .await?;
    for (slug, count) in &results {
        println!("  /{slug}/: {count} threads");
    }
    print_stats(&harvester.stats);
    Ok(())
}

/// List the boards advertised by the upstream API without importing.
pub async fn run_list_boards(config: &HarvesterConfig) -> Result<()> {
    let client = ChanClient::new(config.upstream.clone())?;
    let mut boards = client.boards().await.context("failed to fetch board list")?;
    boards.sort_by(|a, b| a.board.cmp(&b.board));

    println!("{:<10} {:<48} {}", "Board", "Title", "SFW");
    for board in &boards {
        let slug = format!("/{}/", board.board);
        let sfw = if board.ws_board != 0 { "yes" } else { "no" };
        println!("{:<10} {:<48} {}", slug, board.title, sfw);
    }
    println!("{} boards", boards.len());
    Ok(())
}

/// Show the first entries of a board's catalog without importing.
pub async fn run_preview(config: &HarvesterConfig, board: &str, limit: usize) -> Result<()> {
    let client = ChanClient::new(config.upstream.clone())?;
    let catalog = client
        .catalog(board)
        .await
        .with_context(|| format!("failed to fetch catalog for /{board}/"))?;

    println!("{:>10}  {:>7}  {:>6}  {:<5} Subject", "No", "Replies", "Images", "File");
    let mut shown = 0usize;
    'pages: for page in &catalog {
        for thread in &page.threads {
            if shown >= limit {
                break 'pages;
            }
            let subject = thread
                .sub
                .clone()
                .or_else(|| thread.com.clone())
                .unwrap_or_default();
            let subject: String = subject.chars().take(40).collect();
            println!(
                "{:>10}  {:>7}  {:>6}  {:<5} {}",
                thread.no,
                thread.replies.unwrap_or(0),
                thread.images.unwrap_or(0),
                if thread.tim.is_some() { "yes" } else { "" },
                subject
            );
            shown += 1;
        }
    }
    Ok(())
}

fn print_stats(stats: &HarvestStats) {
    println!("Harvest summary:");
    println!("  threads: {}", stats.threads);
    println!("  posts:   {}", stats.posts);
    println!("  images:  {}", stats.images);
    println!("  skipped: {}", stats.skipped);
    println!("  errors:  {}", stats.errors);
}

fn resolve_target(target: &str, thread_no: Option<i64>) -> Result<(String, i64)> {
    match thread_no {
        Some(no) => Ok((target.to_string(), no)),
        None => parse_thread_url(target),
    }
}

/// Accepts a full thread URL such as
/// `https://boards.example.org/g/thread/12345678` and extracts the board
/// slug and thread number.
fn parse_thread_url(url: &str) -> Result<(String, i64)> {
    let pattern = Regex::new(r"/([a-z0-9]+)/thread/(\d+)").expect("valid pattern");
    let captures = pattern
        .captures(url)
        .ok_or_else(|| anyhow!("unable to parse thread URL: {url}"))?;
    let board = captures.get(1).expect("board capture").as_str().to_string();
    let thread_no = captures
        .get(2)
        .expect("thread capture")
        .as_str()
        .parse()
        .context("thread number out of range")?;
    Ok((board, thread_no))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thread_urls() {
        let (board, no) =
            parse_thread_url("https://boards.4chan.org/g/thread/12345678").expect("parse");
        assert_eq!(board, "g");
        assert_eq!(no, 12_345_678);

        let (board, no) =
            parse_thread_url("http://localhost:8080/diy/thread/42#p43").expect("parse");
        assert_eq!(board, "diy");
        assert_eq!(no, 42);
    }

    #[test]
    fn rejects_non_thread_urls() {
        assert!(parse_thread_url("https://example.org/about").is_err());
    }

    #[test]
    fn explicit_thread_number_wins() {
        let (board, no) = resolve_target("g", Some(99)).expect("resolve");
        assert_eq!(board, "g");
        assert_eq!(no, 99);
    }
}
