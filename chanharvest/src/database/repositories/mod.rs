mod boards;
mod media_objects;
mod posts;
mod threads;

use anyhow::Result;
use rusqlite::Connection;

use super::models::{
    BoardRecord, MediaObjectRecord, NewMediaObject, NewPost, PostRecord, ThreadRecord,
};

pub trait BoardRepository {
    /// Get-or-create a board by slug, returning its stable internal id.
    fn ensure(&self, slug: &str, title: &str, nsfw: bool) -> Result<i64>;
    fn get_by_slug(&self, slug: &str) -> Result<Option<BoardRecord>>;
    /// Raises `next_post_no` to at least `min_no + 1`. Monotonic and
    /// idempotent; calls with stale lower values are no-ops.
    fn advance_post_counter(&self, board_id: i64, min_no: i64) -> Result<()>;
    fn next_post_no(&self, board_id: i64) -> Result<i64>;
}

pub trait ThreadRepository {
    /// Upsert keyed on the source thread number. On conflict the mutable
    /// fields (flags, counts, timestamps) are overwritten; `op_post_id`
    /// and `created_at` keep their first-seen values.
    fn upsert(&self, record: &ThreadRecord) -> Result<i64>;
    fn exists(&self, thread_no: i64) -> Result<bool>;
    fn get(&self, thread_no: i64) -> Result<Option<ThreadRecord>>;
    fn set_op_post(&self, thread_no: i64, post_id: i64) -> Result<()>;
}

pub trait PostRepository {
    /// Upsert keyed on `(thread_id, board_post_no)`. On conflict the
    /// content fields are overwritten while each media column keeps its
    /// existing value unless the new row supplies a non-null one.
    fn upsert(&self, post: &NewPost) -> Result<i64>;
    fn exists(&self, thread_id: i64, board_post_no: i64) -> Result<bool>;
    fn get(&self, thread_id: i64, board_post_no: i64) -> Result<Option<PostRecord>>;
    fn count_for_thread(&self, thread_id: i64) -> Result<i64>;
}

pub trait MediaObjectRepository {
    fn find_by_hash(&self, hash_sha256: &str) -> Result<Option<MediaObjectRecord>>;
    /// Insert-or-reuse keyed on the content hash; a conflict is a no-op
    /// that returns the existing row's id.
    fn insert(&self, media: &NewMediaObject) -> Result<i64>;
    fn count(&self) -> Result<i64>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn boards(&self) -> impl BoardRepository + '_ {
        boards::SqliteBoardRepository { conn: self.conn }
    }

    pub fn threads(&self) -> impl ThreadRepository + '_ {
        threads::SqliteThreadRepository { conn: self.conn }
    }

    pub fn posts(&self) -> impl PostRepository + '_ {
        posts::SqlitePostRepository { conn: self.conn }
    }

    pub fn media_objects(&self) -> impl MediaObjectRepository + '_ {
        media_objects::SqliteMediaObjectRepository { conn: self.conn }
    }

    pub fn conn(&self) -> &'conn Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::PostMedia;
    use crate::database::MIGRATIONS;
    use crate::utils::now_utc_iso;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        conn.execute_batch(MIGRATIONS).expect("migrations");
        conn
    }

    fn sample_post(thread_id: i64, board_post_no: i64) -> NewPost {
        NewPost {
            thread_id,
            board_post_no,
            created_at: now_utc_iso(),
            updated_at: Some(now_utc_iso()),
            content: "hello".into(),
            content_html: Some("<p>hello</p>".into()),
            is_op: board_post_no == thread_id,
            author_name: "Anonymous".into(),
            tripcode: None,
            capcode: None,
            subject: None,
            email: None,
            country_code: None,
            country_name: None,
            poster_id: None,
            media: PostMedia::default(),
            spoiler_image: false,
        }
    }

    fn seed_thread(repos: &SqliteRepositories<'_>, thread_no: i64) -> i64 {
        let board_id = repos.boards().ensure("g", "Technology", false).unwrap();
        let record = ThreadRecord {
            id: thread_no,
            board_id,
            created_at: now_utc_iso(),
            updated_at: Some(now_utc_iso()),
            bumped_at: None,
            sticky: false,
            locked: false,
            archived: false,
            archived_at: None,
            reply_count: 0,
            image_count: 0,
            op_post_id: None,
        };
        repos.threads().upsert(&record).unwrap();
        board_id
    }

    #[test]
    fn ensure_board_is_idempotent() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        let first = repos.boards().ensure("g", "Technology", false).unwrap();
        let second = repos.boards().ensure("g", "", false).unwrap();
        assert_eq!(first, second);

        let board = repos.boards().get_by_slug("g").unwrap().unwrap();
        assert_eq!(board.title, "Technology");
        assert_eq!(board.next_post_no, 1);
    }

    #[test]
    fn empty_title_defaults_to_slug() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.boards().ensure("a", "", true).unwrap();
        let board = repos.boards().get_by_slug("a").unwrap().unwrap();
        assert_eq!(board.title, "a");
        assert!(board.nsfw);
    }

    #[test]
    fn post_counter_never_decreases() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        let board_id = repos.boards().ensure("g", "Technology", false).unwrap();

        repos.boards().advance_post_counter(board_id, 500).unwrap();
        assert_eq!(repos.boards().next_post_no(board_id).unwrap(), 501);

        repos.boards().advance_post_counter(board_id, 100).unwrap();
        assert_eq!(repos.boards().next_post_no(board_id).unwrap(), 501);

        repos.boards().advance_post_counter(board_id, 500).unwrap();
        assert_eq!(repos.boards().next_post_no(board_id).unwrap(), 501);

        repos.boards().advance_post_counter(board_id, 600).unwrap();
        assert_eq!(repos.boards().next_post_no(board_id).unwrap(), 601);
    }

    #[test]
    fn thread_upsert_overwrites_mutable_fields_only() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        let board_id = repos.boards().ensure("g", "Technology", false).unwrap();

        let mut record = ThreadRecord {
            id: 100,
            board_id,
            created_at: "2024-01-01T00:00:00+00:00".into(),
            updated_at: Some("2024-01-01T00:00:00+00:00".into()),
            bumped_at: Some("2024-01-01T00:00:00+00:00".into()),
            sticky: false,
            locked: false,
            archived: false,
            archived_at: None,
            reply_count: 1,
            image_count: 0,
            op_post_id: None,
        };
        repos.threads().upsert(&record).unwrap();
        repos.threads().set_op_post(100, 42).unwrap();

        record.sticky = true;
        record.locked = true;
        record.archived = true;
        record.archived_at = Some("2024-06-01T00:00:00+00:00".into());
        record.reply_count = 10;
        record.image_count = 3;
        record.created_at = "2030-01-01T00:00:00+00:00".into();
        repos.threads().upsert(&record).unwrap();

        let fetched = repos.threads().get(100).unwrap().unwrap();
        assert!(fetched.sticky && fetched.locked && fetched.archived);
        assert_eq!(fetched.reply_count, 10);
        assert_eq!(fetched.image_count, 3);
        // first-seen values survive the merge
        assert_eq!(fetched.created_at, "2024-01-01T00:00:00+00:00");
        assert_eq!(fetched.op_post_id, Some(42));
    }

    #[test]
    fn post_upsert_keeps_row_count_and_id() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        seed_thread(&repos, 100);

        let first_id = repos.posts().upsert(&sample_post(100, 100)).unwrap();
        let mut updated = sample_post(100, 100);
        updated.content = "edited".into();
        let second_id = repos.posts().upsert(&updated).unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(repos.posts().count_for_thread(100).unwrap(), 1);
        let fetched = repos.posts().get(100, 100).unwrap().unwrap();
        assert_eq!(fetched.content, "edited");
    }

    #[test]
    fn post_upsert_never_regresses_media_fields() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        seed_thread(&repos, 100);

        let mut with_media = sample_post(100, 101);
        with_media.media = PostMedia {
            media_url: Some("http://store/2024/01/01/abc.png".into()),
            thumb_url: Some("http://store/2024/01/01/abc_thumb.png".into()),
            media_filename: Some("pic.png".into()),
            media_size: Some(512),
            media_dimensions: Some("800x600".into()),
            media_hash: Some("md5base64".into()),
            media_id: Some("7".into()),
        };
        repos.posts().upsert(&with_media).unwrap();

        // a later harvest without resolved media must not blank the links
        let mut without_media = sample_post(100, 101);
        without_media.content = "refetched".into();
        repos.posts().upsert(&without_media).unwrap();

        let fetched = repos.posts().get(100, 101).unwrap().unwrap();
        assert_eq!(fetched.content, "refetched");
        assert_eq!(
            fetched.media.media_url.as_deref(),
            Some("http://store/2024/01/01/abc.png")
        );
        assert_eq!(fetched.media.media_id.as_deref(), Some("7"));
        assert_eq!(fetched.media.media_size, Some(512));

        // but a harvest that does carry media overwrites
        let mut fresh = sample_post(100, 101);
        fresh.media.media_url = Some("http://store/2024/02/02/def.png".into());
        repos.posts().upsert(&fresh).unwrap();
        let fetched = repos.posts().get(100, 101).unwrap().unwrap();
        assert_eq!(
            fetched.media.media_url.as_deref(),
            Some("http://store/2024/02/02/def.png")
        );
    }

    #[test]
    fn post_exists_probe() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        seed_thread(&repos, 100);
        assert!(!repos.posts().exists(100, 100).unwrap());
        repos.posts().upsert(&sample_post(100, 100)).unwrap();
        assert!(repos.posts().exists(100, 100).unwrap());
    }

    #[test]
    fn media_insert_reuses_existing_hash() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);

        let media = NewMediaObject {
            hash_sha256: "a".repeat(64),
            mime_type: Some("image/png".into()),
            file_size: Some(1024),
            width: Some(800),
            height: Some(600),
            storage_key: Some("2024/01/01/aaaa.png".into()),
            thumb_key: None,
            original_filename: Some("pic.png".into()),
        };
        let first = repos.media_objects().insert(&media).unwrap();
        let second = repos.media_objects().insert(&media).unwrap();
        assert_eq!(first, second);
        assert_eq!(repos.media_objects().count().unwrap(), 1);

        let found = repos
            .media_objects()
            .find_by_hash(&"a".repeat(64))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first);
        assert_eq!(found.storage_key.as_deref(), Some("2024/01/01/aaaa.png"));
    }
}
