use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Top-level configuration assembled from `CHANHARVEST_*` environment
/// variables. Every knob has a default so a bare invocation works against
/// a local MinIO + the public upstream API.
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    pub db_path: PathBuf,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub media: MediaConfig,
}

impl HarvesterConfig {
    pub fn from_env() -> Result<Self> {
        let db_path = env::var("CHANHARVEST_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/chanharvest.db"));
        Ok(Self {
            db_path,
            upstream: UpstreamConfig::from_env(),
            storage: StorageConfig::from_env(),
            media: MediaConfig::from_env(),
        })
    }
}

/// Upstream API endpoints and politeness settings. The upstream enforces
/// an aggressive per-client rate limit, so the delay stays above one
/// second unless explicitly overridden.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_base: String,
    pub media_base: String,
    pub request_delay: Duration,
    pub retry_backoff: Duration,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://a.4cdn.org".to_string(),
            media_base: "https://i.4cdn.org".to_string(),
            request_delay: Duration::from_millis(1100),
            retry_backoff: Duration::from_secs(1),
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl UpstreamConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env_string("CHANHARVEST_API_BASE", &defaults.api_base),
            media_base: env_string("CHANHARVEST_MEDIA_BASE", &defaults.media_base),
            request_delay: Duration::from_millis(env_parse("CHANHARVEST_REQUEST_DELAY_MS", 1100)),
            retry_backoff: Duration::from_millis(env_parse("CHANHARVEST_RETRY_BACKOFF_MS", 1000)),
            max_retries: env_parse("CHANHARVEST_MAX_RETRIES", defaults.max_retries),
            timeout: Duration::from_secs(env_parse("CHANHARVEST_TIMEOUT_SECS", 30)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDriverKind {
    S3,
    Disk,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub driver: StorageDriverKind,
    pub s3: S3Config,
    pub disk: DiskConfig,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let driver = match env::var("CHANHARVEST_STORAGE_DRIVER").as_deref() {
            Ok("disk") => StorageDriverKind::Disk,
            _ => StorageDriverKind::S3,
        };
        Self {
            driver,
            s3: S3Config::from_env(),
            disk: DiskConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "chanharvest".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

impl S3Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_string("CHANHARVEST_S3_ENDPOINT", &defaults.endpoint),
            access_key: env_string("CHANHARVEST_S3_ACCESS_KEY", &defaults.access_key),
            secret_key: env_string("CHANHARVEST_S3_SECRET_KEY", &defaults.secret_key),
            bucket: env_string("CHANHARVEST_S3_BUCKET", &defaults.bucket),
            region: env_string("CHANHARVEST_S3_REGION", &defaults.region),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiskConfig {
    pub root: PathBuf,
    pub url_prefix: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/media"),
            url_prefix: "/media".to_string(),
        }
    }
}

impl DiskConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: env::var("CHANHARVEST_DISK_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            url_prefix: env_string("CHANHARVEST_DISK_URL_PREFIX", &defaults.url_prefix),
        }
    }
}

/// Media pipeline toggles. Thumbnails are bounded to a square of
/// `thumbnail_max_px`; sources already inside the bound keep no thumbnail.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub download_media: bool,
    pub generate_thumbnails: bool,
    pub thumbnail_max_px: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            download_media: true,
            generate_thumbnails: true,
            thumbnail_max_px: 250,
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        Self {
            download_media: env_flag("CHANHARVEST_DOWNLOAD_MEDIA", true),
            generate_thumbnails: env_flag("CHANHARVEST_GENERATE_THUMBNAILS", true),
            thumbnail_max_px: env_parse("CHANHARVEST_THUMBNAIL_MAX_PX", 250u32),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => {
            let raw = raw.to_lowercase();
            raw == "1" || raw == "true" || raw == "yes"
        }
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = UpstreamConfig::default();
        assert!(cfg.request_delay >= Duration::from_secs(1));
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn env_flag_parses_truthy_values() {
        assert!(env_flag("CHANHARVEST_TEST_FLAG_UNSET", true));
        assert!(!env_flag("CHANHARVEST_TEST_FLAG_UNSET", false));
    }
}
