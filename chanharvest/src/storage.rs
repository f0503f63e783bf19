//! Content-addressed media storage — S3-compatible object storage or a
//! local directory, with hash-keyed dedup and thumbnail derivation.

use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::config::{DiskConfig, S3Config, StorageConfig, StorageDriverKind};

/// Extensions with no safe raster decode; stored as-is, never thumbnailed.
const NON_RASTER_EXTS: &[&str] = &[".webm", ".pdf", ".svg"];

/// Result of materializing one media payload, shaped after the
/// `media_objects` columns plus the public URLs for the owning post.
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub hash_sha256: String,
    pub mime_type: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub storage_key: String,
    pub thumb_key: Option<String>,
    pub media_url: String,
    pub thumb_url: Option<String>,
}

pub struct MediaStorage {
    driver: Driver,
    thumb_max: u32,
}

enum Driver {
    S3(S3Store),
    Disk(DiskStore),
}

impl MediaStorage {
    pub async fn connect(cfg: &StorageConfig, thumb_max: u32) -> Result<Self> {
        let driver = match cfg.driver {
            StorageDriverKind::S3 => Driver::S3(S3Store::connect(&cfg.s3).await),
            StorageDriverKind::Disk => Driver::Disk(DiskStore::connect(&cfg.disk).await?),
        };
        Ok(Self { driver, thumb_max })
    }

    pub fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Public URL for an already-stored key, used on dedup hits where no
    /// bytes are re-uploaded.
    pub fn url_for(&self, key: &str) -> String {
        match &self.driver {
            Driver::S3(s3) => s3.url_for(key),
            Driver::Disk(disk) => disk.url_for(key),
        }
    }

    /// Uploads `data` under a date-partitioned content-addressed key and
    /// derives a thumbnail when the payload has a raster decode larger
    /// than the configured bound. Decode failures are logged and leave the
    /// media stored without thumbnail or dimensions.
    pub async fn store(&self, data: &[u8], ext: &str, generate_thumb: bool) -> Result<UploadInfo> {
        let ext = ext.to_lowercase();
        let hash = Self::sha256_hex(data);
        let mime = guess_mime(&ext, data);
        let storage_key = date_key(&hash, &ext);

        self.put(&storage_key, data, mime).await?;
        let media_url = self.url_for(&storage_key);

        let decoded = decode_raster(data, &ext);
        let (width, height) = match &decoded {
            Some(img) => (Some(img.width() as i64), Some(img.height() as i64)),
            None => (None, None),
        };

        let mut thumb_key = None;
        let mut thumb_url = None;
        if generate_thumb {
            if let Some(img) = &decoded {
                if img.width() > self.thumb_max || img.height() > self.thumb_max {
                    let thumb = img.thumbnail(self.thumb_max, self.thumb_max);
                    match encode_thumbnail(&thumb, &ext) {
                        Ok((bytes, thumb_ext, thumb_mime)) => {
                            let key = date_key(&hash, &format!("_thumb{thumb_ext}"));
                            self.put(&key, &bytes, thumb_mime).await?;
                            thumb_url = Some(self.url_for(&key));
                            thumb_key = Some(key);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "thumbnail encoding failed");
                        }
                    }
                }
            }
        }

        Ok(UploadInfo {
            hash_sha256: hash,
            mime_type: mime.to_string(),
            file_size: data.len() as i64,
            width,
            height,
            storage_key,
            thumb_key,
            media_url,
            thumb_url,
        })
    }

    async fn put(&self, key: &str, data: &[u8], mime: &str) -> Result<()> {
        match &self.driver {
            Driver::S3(s3) => s3.put(key, data, mime).await,
            Driver::Disk(disk) => disk.put(key, data).await,
        }
    }
}

struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint: String,
}

impl S3Store {
    async fn connect(cfg: &S3Config) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
            None,
            None,
            "chanharvest",
        );
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()))
            .endpoint_url(cfg.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        let store = Self {
            client: aws_sdk_s3::Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        };
        store.ensure_bucket().await;
        store
    }

    async fn ensure_bucket(&self) {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return;
        }
        match self
            .client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => tracing::info!(bucket = %self.bucket, "created storage bucket"),
            Err(err) => tracing::warn!(
                bucket = %self.bucket, error = %err,
                "could not ensure storage bucket exists"
            ),
        }
    }

    async fn put(&self, key: &str, data: &[u8], mime: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
            .content_type(mime)
            .send()
            .await
            .with_context(|| format!("failed to upload {key}"))?;
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

struct DiskStore {
    root: PathBuf,
    url_prefix: String,
}

impl DiskStore {
    async fn connect(cfg: &DiskConfig) -> Result<Self> {
        fs::create_dir_all(&cfg.root)
            .await
            .with_context(|| format!("failed to create media root {}", cfg.root.display()))?;
        Ok(Self {
            root: cfg.root.clone(),
            url_prefix: cfg.url_prefix.trim_end_matches('/').to_string(),
        })
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create media directory {}", parent.display()))?;
        }
        fs::write(&path, data)
            .await
            .with_context(|| format!("failed to write media file {}", path.display()))?;
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, key)
    }
}

fn date_key(hash: &str, suffix: &str) -> String {
    format!("{}/{hash}{suffix}", Utc::now().format("%Y/%m/%d"))
}

fn guess_mime(ext: &str, data: &[u8]) -> &'static str {
    match ext {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webm" => "video/webm",
        ".webp" => "image/webp",
        ".svg" => "image/svg+xml",
        ".pdf" => "application/pdf",
        _ => infer::get(data)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream"),
    }
}

fn decode_raster(data: &[u8], ext: &str) -> Option<DynamicImage> {
    if NON_RASTER_EXTS.contains(&ext) {
        return None;
    }
    let reader = match ImageReader::new(Cursor::new(data)).with_guessed_format() {
        Ok(reader) => reader,
        Err(err) => {
            tracing::warn!(error = %err, "could not sniff media format");
            return None;
        }
    };
    match reader.decode() {
        Ok(img) => Some(img),
        Err(err) => {
            tracing::warn!(error = %err, "media decode failed, storing without thumbnail");
            None
        }
    }
}

/// JPEG sources thumbnail to JPEG (flattened to RGB — JPEG carries no
/// alpha); everything else to PNG.
fn encode_thumbnail(
    thumb: &DynamicImage,
    ext: &str,
) -> image::ImageResult<(Vec<u8>, &'static str, &'static str)> {
    let mut buf = Cursor::new(Vec::new());
    if ext == ".jpg" || ext == ".jpeg" {
        DynamicImage::ImageRgb8(thumb.to_rgb8()).write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok((buf.into_inner(), ".jpg", "image/jpeg"))
    } else {
        thumb.write_to(&mut buf, ImageFormat::Png)?;
        Ok((buf.into_inner(), ".png", "image/png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::runtime::Runtime;

    fn disk_storage(root: &std::path::Path) -> StorageConfig {
        StorageConfig {
            driver: StorageDriverKind::Disk,
            s3: S3Config::default(),
            disk: DiskConfig {
                root: root.to_path_buf(),
                url_prefix: "/media".into(),
            },
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([120, 40, 200, 255]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
        buf.into_inner()
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            MediaStorage::sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn small_image_produces_no_thumbnail() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let storage = MediaStorage::connect(&disk_storage(temp.path()), 250)
                .await
                .expect("storage");
            let info = storage
                .store(&png_bytes(16, 16), ".png", true)
                .await
                .expect("store");
            assert_eq!(info.width, Some(16));
            assert_eq!(info.height, Some(16));
            assert!(info.thumb_key.is_none());
            assert!(info.thumb_url.is_none());
            assert!(info.storage_key.ends_with(&format!("{}.png", info.hash_sha256)));
            assert!(temp.path().join(&info.storage_key).exists());
        });
    }

    #[test]
    fn oversized_image_gets_bounded_thumbnail() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let storage = MediaStorage::connect(&disk_storage(temp.path()), 100)
                .await
                .expect("storage");
            let info = storage
                .store(&png_bytes(600, 400), ".png", true)
                .await
                .expect("store");
            assert_eq!(info.width, Some(600));
            let thumb_key = info.thumb_key.expect("thumbnail produced");
            let thumb_path = temp.path().join(&thumb_key);
            assert!(thumb_path.exists());
            let thumb = image::open(&thumb_path).expect("decode thumbnail");
            assert!(thumb.width() <= 100 && thumb.height() <= 100);
        });
    }

    #[test]
    fn thumbnails_disabled_by_flag() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let storage = MediaStorage::connect(&disk_storage(temp.path()), 100)
                .await
                .expect("storage");
            let info = storage
                .store(&png_bytes(600, 400), ".png", false)
                .await
                .expect("store");
            assert!(info.thumb_key.is_none());
        });
    }

    #[test]
    fn video_payload_is_stored_without_decode() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let storage = MediaStorage::connect(&disk_storage(temp.path()), 250)
                .await
                .expect("storage");
            let info = storage
                .store(b"\x1a\x45\xdf\xa3 not really a video", ".webm", true)
                .await
                .expect("store");
            assert_eq!(info.mime_type, "video/webm");
            assert_eq!(info.width, None);
            assert_eq!(info.height, None);
            assert!(info.thumb_key.is_none());
        });
    }

    #[test]
    fn corrupt_image_is_stored_without_thumbnail() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let storage = MediaStorage::connect(&disk_storage(temp.path()), 250)
                .await
                .expect("storage");
            let info = storage
                .store(b"definitely not a png", ".png", true)
                .await
                .expect("store");
            assert_eq!(info.mime_type, "image/png");
            assert_eq!(info.width, None);
            assert!(info.thumb_key.is_none());
            assert!(temp.path().join(&info.storage_key).exists());
        });
    }

    #[test]
    fn identical_content_maps_to_identical_key() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let storage = MediaStorage::connect(&disk_storage(temp.path()), 250)
                .await
                .expect("storage");
            let data = png_bytes(16, 16);
            let first = storage.store(&data, ".png", true).await.expect("store");
            let second = storage.store(&data, ".png", true).await.expect("store");
            assert_eq!(first.storage_key, second.storage_key);
            assert_eq!(first.media_url, second.media_url);
        });
    }
}
