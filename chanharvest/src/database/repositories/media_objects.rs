use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::models::{MediaObjectRecord, NewMediaObject};
use crate::utils::now_utc_iso;

pub(super) struct SqliteMediaObjectRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::MediaObjectRepository for SqliteMediaObjectRepository<'conn> {
    fn find_by_hash(&self, hash_sha256: &str) -> Result<Option<MediaObjectRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, hash_sha256, mime_type, file_size, width, height,
                       storage_key, thumb_key, original_filename, created_at
                FROM media_objects
                WHERE hash_sha256 = ?1
                "#,
                params![hash_sha256],
                |row| {
                    Ok(MediaObjectRecord {
                        id: row.get(0)?,
                        hash_sha256: row.get(1)?,
                        mime_type: row.get(2)?,
                        file_size: row.get(3)?,
                        width: row.get(4)?,
                        height: row.get(5)?,
                        storage_key: row.get(6)?,
                        thumb_key: row.get(7)?,
                        original_filename: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                },
            )
            .optional()?)
    }

    fn insert(&self, media: &NewMediaObject) -> Result<i64> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO media_objects
                (hash_sha256, mime_type, file_size, width, height,
                 storage_key, thumb_key, original_filename, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(hash_sha256) DO UPDATE SET hash_sha256 = excluded.hash_sha256
            RETURNING id
            "#,
            params![
                media.hash_sha256,
                media.mime_type,
                media.file_size,
                media.width,
                media.height,
                media.storage_key,
                media.thumb_key,
                media.original_filename,
                now_utc_iso(),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM media_objects", [], |row| row.get(0))?;
        Ok(count)
    }
}
