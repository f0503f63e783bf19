use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::models::BoardRecord;
use crate::utils::now_utc_iso;

pub(super) struct SqliteBoardRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::BoardRepository for SqliteBoardRepository<'conn> {
    fn ensure(&self, slug: &str, title: &str, nsfw: bool) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM boards WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let title = if title.is_empty() { slug } else { title };
        let id = self.conn.query_row(
            r#"
            INSERT INTO boards (slug, title, nsfw, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(slug) DO UPDATE SET slug = excluded.slug
            RETURNING id
            "#,
            params![slug, title, if nsfw { 1 } else { 0 }, now_utc_iso()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_by_slug(&self, slug: &str) -> Result<Option<BoardRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, slug, title, nsfw, next_post_no, created_at
                FROM boards
                WHERE slug = ?1
                "#,
                params![slug],
                |row| {
                    Ok(BoardRecord {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        title: row.get(2)?,
                        nsfw: row.get::<_, i64>(3)? != 0,
                        next_post_no: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    fn advance_post_counter(&self, board_id: i64, min_no: i64) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE boards
            SET next_post_no = MAX(next_post_no, ?1)
            WHERE id = ?2
            "#,
            params![min_no + 1, board_id],
        )?;
        Ok(())
    }

    fn next_post_no(&self, board_id: i64) -> Result<i64> {
        let next: i64 = self.conn.query_row(
            r#"
            SELECT next_post_no
            FROM boards
            WHERE id = ?1
            "#,
            params![board_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }
}
