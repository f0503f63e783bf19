//! Media materialization — turns a post's raw media reference into
//! deduplicated, durable storage plus the fields the owning post row needs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiPost, ChanClient};
use crate::database::models::{NewMediaObject, PostMedia};
use crate::database::repositories::MediaObjectRepository;
use crate::database::Database;
use crate::storage::MediaStorage;

/// Outcome of materializing one post's media reference.
pub enum MediaResolution {
    /// The post carries no media reference.
    Absent,
    /// The download failed; the post is persisted without media.
    Failed,
    /// Identical content is already persisted; its storage keys are reused
    /// and no bytes are uploaded.
    Reused(PostMedia),
    /// Identical content was already uploaded earlier in this batch; the
    /// row id resolves when the batch commits.
    Deduplicated { fields: PostMedia, hash: String },
    /// Fresh content, uploaded now; the row insert is pending with the
    /// batch under `hash`.
    Uploaded { fields: PostMedia, hash: String },
}

/// Downloads media payloads, deduplicates them by content hash against
/// both the store and the current batch, and uploads fresh content.
pub struct MediaService {
    client: Arc<ChanClient>,
    database: Database,
    storage: MediaStorage,
    generate_thumbnails: bool,
}

impl MediaService {
    pub fn new(
        client: Arc<ChanClient>,
        database: Database,
        storage: MediaStorage,
        generate_thumbnails: bool,
    ) -> Self {
        Self {
            client,
            database,
            storage,
            generate_thumbnails,
        }
    }

    /// Fetch, hash, dedup, and (when new) upload one post's media.
    /// Fresh uploads register their `media_objects` row in `pending` so
    /// the caller can insert it inside the same transaction as the post.
    pub async fn materialize(
        &self,
        board_slug: &str,
        post: &ApiPost,
        pending: &mut HashMap<String, NewMediaObject>,
    ) -> Result<MediaResolution> {
        let (Some(tim), Some(ext)) = (post.tim, post.ext.as_deref()) else {
            return Ok(MediaResolution::Absent);
        };
        let filename = post.filename.clone().unwrap_or_else(|| tim.to_string());

        let data = match self.client.download_media(board_slug, tim, ext).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::warn!(board = board_slug, tim, ext, "media missing upstream");
                return Ok(MediaResolution::Failed);
            }
            Err(err) => {
                tracing::warn!(
                    board = board_slug, tim, ext, error = %err,
                    "media download failed"
                );
                return Ok(MediaResolution::Failed);
            }
        };

        let hash = MediaStorage::sha256_hex(&data);

        if let Some(media) = pending.get(&hash) {
            let fields = self.media_fields(
                media.storage_key.as_deref(),
                media.thumb_key.as_deref(),
                media.file_size,
                None,
                &filename,
                ext,
                post,
            );
            return Ok(MediaResolution::Deduplicated { fields, hash });
        }

        let existing = self
            .database
            .with_repositories(|repos| repos.media_objects().find_by_hash(&hash))?;
        if let Some(existing) = existing {
            tracing::debug!(hash = %existing.hash_sha256, "media already stored, reusing");
            let fields = self.media_fields(
                existing.storage_key.as_deref(),
                existing.thumb_key.as_deref(),
                existing.file_size,
                Some(existing.id),
                &filename,
                ext,
                post,
            );
            return Ok(MediaResolution::Reused(fields));
        }

        let info = self
            .storage
            .store(&data, ext, self.generate_thumbnails)
            .await
            .context("failed to store media payload")?;

        let fields = PostMedia {
            media_url: Some(info.media_url.clone()),
            thumb_url: info.thumb_url.clone(),
            media_filename: Some(format!("{filename}{ext}")),
            media_size: post.fsize.or(Some(info.file_size)),
            media_dimensions: dims_label(post),
            media_hash: post.md5.clone(),
            media_id: None, // assigned when the row is inserted
        };
        pending.insert(
            hash.clone(),
            NewMediaObject {
                hash_sha256: info.hash_sha256,
                mime_type: Some(info.mime_type),
                file_size: Some(info.file_size),
                width: info.width.or(post.w),
                height: info.height.or(post.h),
                storage_key: Some(info.storage_key),
                thumb_key: info.thumb_key,
                original_filename: Some(format!("{filename}{ext}")),
            },
        );
        Ok(MediaResolution::Uploaded { fields, hash })
    }

    #[allow(clippy::too_many_arguments)]
    fn media_fields(
        &self,
        storage_key: Option<&str>,
        thumb_key: Option<&str>,
        file_size: Option<i64>,
        media_id: Option<i64>,
        filename: &str,
        ext: &str,
        post: &ApiPost,
    ) -> PostMedia {
        PostMedia {
            media_url: storage_key.map(|key| self.storage.url_for(key)),
            thumb_url: thumb_key.map(|key| self.storage.url_for(key)),
            media_filename: Some(format!("{filename}{ext}")),
            media_size: post.fsize.or(file_size),
            media_dimensions: dims_label(post),
            media_hash: post.md5.clone(),
            media_id: media_id.map(|id| id.to_string()),
        }
    }
}

fn dims_label(post: &ApiPost) -> Option<String> {
    match (post.w, post.h) {
        (Some(w), Some(h)) => Some(format!("{w}x{h}")),
        _ => None,
    }
}
