//! Core harvesting logic — walks upstream catalogs, threads, and archives
//! and drives idempotent persistence plus content-addressed media storage.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use html2text::from_read;

use crate::api::{ApiPost, ChanClient};
use crate::database::models::{NewMediaObject, NewPost, PostMedia, ThreadRecord};
use crate::database::repositories::{
    BoardRepository, MediaObjectRepository, PostRepository, ThreadRepository,
};
use crate::database::Database;
use crate::media::{MediaResolution, MediaService};
use crate::utils::{epoch_to_iso, now_utc_iso};

/// Running counters accumulated across harvest operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub threads: u64,
    pub posts: u64,
    pub images: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// One post ready for persistence. `pending_hash` links the draft to a
/// media row that is inserted in the same transaction; the row id is not
/// known until then.
struct PostDraft {
    post: NewPost,
    pending_hash: Option<String>,
}

/// Orchestrates the upstream → relational store → blob store pipeline.
///
/// All network work for a thread happens first; the row writes then go
/// through a single transaction so a failed thread leaves nothing behind.
pub struct Harvester {
    client: Arc<ChanClient>,
    database: Database,
    media: Option<MediaService>,
    pub stats: HarvestStats,
}

impl Harvester {
    pub fn new(client: Arc<ChanClient>, database: Database, media: Option<MediaService>) -> Self {
        Self {
            client,
            database,
            media,
            stats: HarvestStats::default(),
        }
    }

    /// Harvest a single thread. Returns `Ok(false)` when the thread is
    /// absent or empty upstream; nothing is written in that case.
    pub async fn harvest_thread(&mut self, board_slug: &str, thread_no: i64) -> Result<bool> {
        let board_id = self
            .database
            .with_repositories(|repos| repos.boards().ensure(board_slug, "", false))?;
        self.harvest_thread_on_board(board_slug, board_id, thread_no)
            .await
    }

    async fn harvest_thread_on_board(
        &mut self,
        board_slug: &str,
        board_id: i64,
        thread_no: i64,
    ) -> Result<bool> {
        let Some(response) = self.client.thread(board_slug, thread_no).await? else {
            tracing::warn!(board = board_slug, thread = thread_no, "thread not found");
            return Ok(false);
        };
        if response.posts.is_empty() {
            tracing::warn!(board = board_slug, thread = thread_no, "thread has no posts");
            return Ok(false);
        }

        let thread = thread_record_from_op(thread_no, board_id, &response.posts[0]);

        let mut pending: HashMap<String, NewMediaObject> = HashMap::new();
        let mut drafts = Vec::with_capacity(response.posts.len());
        let mut max_post_no = 0i64;
        for post in &response.posts {
            max_post_no = max_post_no.max(post.no);
            let draft = self
                .map_post(board_slug, thread_no, post, &mut pending)
                .await?;
            drafts.push(draft);
        }
        let post_count = drafts.len();

        self.database.with_transaction(|repos| {
            repos.threads().upsert(&thread)?;
            let mut media_ids: HashMap<String, i64> = HashMap::new();
            for (hash, media) in &pending {
                media_ids.insert(hash.clone(), repos.media_objects().insert(media)?);
            }
            for draft in drafts.iter_mut() {
                if let Some(hash) = &draft.pending_hash {
                    if let Some(media_id) = media_ids.get(hash) {
                        draft.post.media.media_id = Some(media_id.to_string());
                    }
                }
                let post_id = repos.posts().upsert(&draft.post)?;
                if draft.post.is_op {
                    repos.threads().set_op_post(thread_no, post_id)?;
                }
            }
            repos.boards().advance_post_counter(board_id, max_post_no)?;
            Ok(())
        })?;

        self.stats.threads += 1;
        self.stats.posts += post_count as u64;
        tracing::info!(
            board = board_slug,
            thread = thread_no,
            posts = post_count,
            "harvested thread"
        );
        Ok(true)
    }

    /// Harvest a board's catalog: OP-only summaries. Threads already in
    /// the store are skipped without re-fetching. Returns the number of
    /// newly inserted threads.
    pub async fn harvest_catalog(&mut self, board_slug: &str) -> Result<u64> {
        let board_id = self
            .database
            .with_repositories(|repos| repos.boards().ensure(board_slug, "", false))?;
        let catalog = self.client.catalog(board_slug).await?;

        let mut inserted = 0u64;
        for page in &catalog {
            for summary in &page.threads {
                let thread_no = summary.no;
                let known = self
                    .database
                    .with_repositories(|repos| repos.threads().exists(thread_no))?;
                if known {
                    tracing::debug!(thread = thread_no, "thread already known, skipping");
                    self.stats.skipped += 1;
                    continue;
                }

                let thread = thread_record_from_op(thread_no, board_id, summary);
                let mut pending: HashMap<String, NewMediaObject> = HashMap::new();
                let mut draft = self
                    .map_post(board_slug, thread_no, summary, &mut pending)
                    .await?;

                self.database.with_transaction(|repos| {
                    repos.threads().upsert(&thread)?;
                    if let Some(hash) = &draft.pending_hash {
                        if let Some(media) = pending.get(hash) {
                            let media_id = repos.media_objects().insert(media)?;
                            draft.post.media.media_id = Some(media_id.to_string());
                        }
                    }
                    let post_id = repos.posts().upsert(&draft.post)?;
                    repos.threads().set_op_post(thread_no, post_id)?;
                    Ok(())
                })?;

                self.stats.threads += 1;
                self.stats.posts += 1;
                inserted += 1;
            }
        }
        tracing::info!(
            board = board_slug,
            new_threads = inserted,
            "catalog harvest complete"
        );
        Ok(inserted)
    }

    /// Harvest an entire board: thread numbers from the catalog, union the
    /// archive when requested, then one full thread harvest per number in
    /// ascending order. A failure on one thread is logged, counted, and
    /// isolated; the remaining threads still run.
    pub async fn harvest_board(
        &mut self,
        board_slug: &str,
        include_archive: bool,
        limit: usize,
    ) -> Result<u64> {
        let board_id = self
            .database
            .with_repositories(|repos| repos.boards().ensure(board_slug, "", false))?;

        let catalog = self.client.catalog(board_slug).await?;
        let mut thread_nos: Vec<i64> = catalog
            .iter()
            .flat_map(|page| page.threads.iter().map(|t| t.no))
            .collect();
        if include_archive {
            thread_nos.extend(self.client.archive(board_slug).await?);
        }
        thread_nos.sort_unstable();
        thread_nos.dedup();
        if limit > 0 && thread_nos.len() > limit {
            thread_nos.truncate(limit);
        }

        let total = thread_nos.len();
        let mut harvested = 0u64;
        for thread_no in thread_nos {
            match self
                .harvest_thread_on_board(board_slug, board_id, thread_no)
                .await
            {
                Ok(true) => harvested += 1,
                Ok(false) => self.stats.skipped += 1,
                Err(err) => {
                    tracing::error!(
                        board = board_slug,
                        thread = thread_no,
                        error = format!("{err:#}"),
                        "error harvesting thread"
                    );
                    self.stats.errors += 1;
                }
            }
        }

        tracing::info!(
            board = board_slug,
            harvested,
            total,
            "board harvest complete"
        );
        Ok(harvested)
    }

    /// Harvest multiple boards sequentially; no interleaving.
    pub async fn harvest_boards(
        &mut self,
        slugs: &[String],
        include_archive: bool,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        let mut results = Vec::with_capacity(slugs.len());
        for slug in slugs {
            tracing::info!(board = %slug, "starting board harvest");
            let count = self.harvest_board(slug, include_archive, limit).await?;
            results.push((slug.clone(), count));
        }
        Ok(results)
    }

    async fn map_post(
        &mut self,
        board_slug: &str,
        thread_no: i64,
        post: &ApiPost,
        pending: &mut HashMap<String, NewMediaObject>,
    ) -> Result<PostDraft> {
        let (media, pending_hash) = match self.media.as_ref() {
            Some(service) => {
                match service.materialize(board_slug, post, pending).await? {
                    MediaResolution::Absent => (PostMedia::default(), None),
                    MediaResolution::Failed => {
                        self.stats.errors += 1;
                        (PostMedia::default(), None)
                    }
                    MediaResolution::Reused(fields) => {
                        self.stats.skipped += 1;
                        (fields, None)
                    }
                    MediaResolution::Deduplicated { fields, hash } => {
                        self.stats.skipped += 1;
                        (fields, Some(hash))
                    }
                    MediaResolution::Uploaded { fields, hash } => {
                        self.stats.images += 1;
                        (fields, Some(hash))
                    }
                }
            }
            None => (PostMedia::default(), None),
        };

        Ok(PostDraft {
            post: NewPost {
                thread_id: thread_no,
                board_post_no: post.no,
                created_at: epoch_to_iso(post.time),
                updated_at: Some(now_utc_iso()),
                content: clean_body(post.com.as_deref()),
                content_html: post.com.clone(),
                is_op: post.is_op(),
                author_name: post
                    .name
                    .clone()
                    .unwrap_or_else(|| "Anonymous".to_string()),
                tripcode: post.trip.clone(),
                capcode: post.capcode.clone(),
                subject: post.sub.clone(),
                email: post.email.clone(),
                country_code: post.country.clone(),
                country_name: post.country_name.clone(),
                poster_id: post.id.clone(),
                media,
                spoiler_image: post.spoiler.unwrap_or(0) != 0,
            },
            pending_hash,
        })
    }
}

fn clean_body(html: Option<&str>) -> String {
    html.map(|raw| {
        let text = from_read(raw.as_bytes(), 120);
        text.trim().replace('\u{a0}', " ")
    })
    .unwrap_or_default()
}

fn thread_record_from_op(thread_no: i64, board_id: i64, op: &ApiPost) -> ThreadRecord {
    let created_at = epoch_to_iso(op.time);
    ThreadRecord {
        id: thread_no,
        board_id,
        created_at: created_at.clone(),
        updated_at: Some(now_utc_iso()),
        bumped_at: Some(created_at),
        sticky: op.sticky.unwrap_or(0) != 0,
        locked: op.closed.unwrap_or(0) != 0,
        archived: op.archived.unwrap_or(0) != 0,
        archived_at: op.archived_on.map(epoch_to_iso),
        reply_count: op.replies.unwrap_or(0),
        image_count: op.images.unwrap_or(0),
        op_post_id: None,
    }
}
