use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::models::{NewPost, PostMedia, PostRecord};

pub(super) struct SqlitePostRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::PostRepository for SqlitePostRepository<'conn> {
    fn upsert(&self, post: &NewPost) -> Result<i64> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO posts (
                thread_id, board_post_no, created_at, updated_at,
                content, content_html, is_op,
                author_name, tripcode, capcode, subject, email,
                country_code, country_name, poster_id,
                media_url, thumb_url, media_filename,
                media_size, media_dimensions, media_hash, media_id,
                spoiler_image
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15,
                ?16, ?17, ?18,
                ?19, ?20, ?21, ?22,
                ?23
            )
            ON CONFLICT(thread_id, board_post_no) DO UPDATE SET
                content          = excluded.content,
                content_html     = excluded.content_html,
                media_url        = COALESCE(excluded.media_url, posts.media_url),
                thumb_url        = COALESCE(excluded.thumb_url, posts.thumb_url),
                media_filename   = COALESCE(excluded.media_filename, posts.media_filename),
                media_size       = COALESCE(excluded.media_size, posts.media_size),
                media_dimensions = COALESCE(excluded.media_dimensions, posts.media_dimensions),
                media_hash       = COALESCE(excluded.media_hash, posts.media_hash),
                media_id         = COALESCE(excluded.media_id, posts.media_id),
                updated_at       = excluded.updated_at
            RETURNING id
            "#,
            params![
                post.thread_id,
                post.board_post_no,
                post.created_at,
                post.updated_at,
                post.content,
                post.content_html,
                if post.is_op { 1 } else { 0 },
                post.author_name,
                post.tripcode,
                post.capcode,
                post.subject,
                post.email,
                post.country_code,
                post.country_name,
                post.poster_id,
                post.media.media_url,
                post.media.thumb_url,
                post.media.media_filename,
                post.media.media_size,
                post.media.media_dimensions,
                post.media.media_hash,
                post.media.media_id,
                if post.spoiler_image { 1 } else { 0 },
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn exists(&self, thread_id: i64, board_post_no: i64) -> Result<bool> {
        let row = self
            .conn
            .query_row(
                "SELECT 1 FROM posts WHERE thread_id = ?1 AND board_post_no = ?2",
                params![thread_id, board_post_no],
                |_| Ok(()),
            )
            .optional()?;
        Ok(row.is_some())
    }

    fn get(&self, thread_id: i64, board_post_no: i64) -> Result<Option<PostRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, thread_id, board_post_no, created_at, content, content_html,
                       is_op, author_name, subject,
                       media_url, thumb_url, media_filename, media_size,
                       media_dimensions, media_hash, media_id, spoiler_image
                FROM posts
                WHERE thread_id = ?1 AND board_post_no = ?2
                "#,
                params![thread_id, board_post_no],
                map_post_row,
            )
            .optional()?)
    }

    fn count_for_thread(&self, thread_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_post_row(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        board_post_no: row.get(2)?,
        created_at: row.get(3)?,
        content: row.get(4)?,
        content_html: row.get(5)?,
        is_op: row.get::<_, i64>(6)? != 0,
        author_name: row.get(7)?,
        subject: row.get(8)?,
        media: PostMedia {
            media_url: row.get(9)?,
            thumb_url: row.get(10)?,
            media_filename: row.get(11)?,
            media_size: row.get(12)?,
            media_dimensions: row.get(13)?,
            media_hash: row.get(14)?,
            media_id: row.get(15)?,
        },
        spoiler_image: row.get::<_, i64>(16)? != 0,
    })
}
