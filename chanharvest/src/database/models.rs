use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub nsfw: bool,
    pub next_post_no: i64,
    pub created_at: String,
}

/// One thread row. `id` is the source's thread number, used directly as
/// the primary key — there is no separate surrogate key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: i64,
    pub board_id: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub bumped_at: Option<String>,
    pub sticky: bool,
    pub locked: bool,
    pub archived: bool,
    pub archived_at: Option<String>,
    pub reply_count: i64,
    pub image_count: i64,
    pub op_post_id: Option<i64>,
}

/// Media reference columns on a post. All optional; on re-harvest each one
/// keeps its existing value unless the new harvest supplies a non-null one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostMedia {
    pub media_url: Option<String>,
    pub thumb_url: Option<String>,
    pub media_filename: Option<String>,
    pub media_size: Option<i64>,
    pub media_dimensions: Option<String>,
    pub media_hash: Option<String>,
    pub media_id: Option<String>,
}

/// Insert/upsert payload for one post. The internal row id is assigned by
/// the store and returned from the upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub thread_id: i64,
    pub board_post_no: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub content: String,
    pub content_html: Option<String>,
    pub is_op: bool,
    pub author_name: String,
    pub tripcode: Option<String>,
    pub capcode: Option<String>,
    pub subject: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub poster_id: Option<String>,
    pub media: PostMedia,
    pub spoiler_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub thread_id: i64,
    pub board_post_no: i64,
    pub created_at: String,
    pub content: String,
    pub content_html: Option<String>,
    pub is_op: bool,
    pub author_name: String,
    pub subject: Option<String>,
    pub media: PostMedia,
    pub spoiler_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMediaObject {
    pub hash_sha256: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub storage_key: Option<String>,
    pub thumb_key: Option<String>,
    pub original_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaObjectRecord {
    pub id: i64,
    pub hash_sha256: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub storage_key: Option<String>,
    pub thumb_key: Option<String>,
    pub original_filename: Option<String>,
    pub created_at: String,
}
