use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::models::ThreadRecord;

pub(super) struct SqliteThreadRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::ThreadRepository for SqliteThreadRepository<'conn> {
    fn upsert(&self, record: &ThreadRecord) -> Result<i64> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO threads (id, board_id, created_at, updated_at, bumped_at,
                                 sticky, locked, archived, archived_at,
                                 reply_count, image_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                reply_count = excluded.reply_count,
                image_count = excluded.image_count,
                sticky      = excluded.sticky,
                locked      = excluded.locked,
                archived    = excluded.archived,
                archived_at = excluded.archived_at,
                updated_at  = excluded.updated_at
            RETURNING id
            "#,
            params![
                record.id,
                record.board_id,
                record.created_at,
                record.updated_at,
                record.bumped_at,
                if record.sticky { 1 } else { 0 },
                if record.locked { 1 } else { 0 },
                if record.archived { 1 } else { 0 },
                record.archived_at,
                record.reply_count,
                record.image_count,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn exists(&self, thread_no: i64) -> Result<bool> {
        let row = self
            .conn
            .query_row(
                "SELECT 1 FROM threads WHERE id = ?1",
                params![thread_no],
                |_| Ok(()),
            )
            .optional()?;
        Ok(row.is_some())
    }

    fn get(&self, thread_no: i64) -> Result<Option<ThreadRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, board_id, created_at, updated_at, bumped_at,
                       sticky, locked, archived, archived_at,
                       reply_count, image_count, op_post_id
                FROM threads
                WHERE id = ?1
                "#,
                params![thread_no],
                |row| {
                    Ok(ThreadRecord {
                        id: row.get(0)?,
                        board_id: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                        bumped_at: row.get(4)?,
                        sticky: row.get::<_, i64>(5)? != 0,
                        locked: row.get::<_, i64>(6)? != 0,
                        archived: row.get::<_, i64>(7)? != 0,
                        archived_at: row.get(8)?,
                        reply_count: row.get(9)?,
                        image_count: row.get(10)?,
                        op_post_id: row.get(11)?,
                    })
                },
            )
            .optional()?)
    }

    fn set_op_post(&self, thread_no: i64, post_id: i64) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE threads
            SET op_post_id = ?1
            WHERE id = ?2
            "#,
            params![post_id, thread_no],
        )?;
        Ok(())
    }
}
