//! Collaborators: object storage for artifacts and the per-session record.
//!
//! Both are traits so the service can run against a directory tree (CLI,
//! tests) or a hosted backend without the orchestrator knowing which.

use crate::error::StorageError;
use crate::output::DeckResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

// ─── ObjectStorage ──────────────────────────────────────────────────────────

/// Stores a local file under `bucket/destination` and returns its URL.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        destination: &str,
    ) -> Result<String, StorageError>;
}

/// MIME type sent with an upload, from the destination's extension.
pub fn content_type_for_destination(destination: &str) -> &'static str {
    match destination.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "svg" => "image/svg+xml",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Reject absolute keys and any `..` segment.
pub(crate) fn validate_destination(destination: &str) -> Result<(), StorageError> {
    let path = Path::new(destination);
    let ok = !destination.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidDestination(destination.to_string()))
    }
}

/// Buckets are directories under `root`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalStorage {
    /// URLs are `file://` paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_url: None,
        }
    }

    /// URLs are `{base_url}/{bucket}/{destination}`, e.g. when `root` is
    /// served by a static file server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        destination: &str,
    ) -> Result<String, StorageError> {
        validate_destination(bucket)?;
        validate_destination(destination)?;

        let target = self.root.join(bucket).join(destination);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| StorageError::Io {
                path: local_path.to_path_buf(),
                source: e,
            })?;
        debug!("Stored {} → {}", local_path.display(), target.display());

        Ok(match self.base_url {
            Some(ref base) => format!("{}/{}/{}", base, bucket, destination),
            None => {
                let abs = std::path::absolute(&target).unwrap_or(target);
                format!("file://{}", abs.display())
            }
        })
    }
}

/// Supabase Storage over its REST API.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Public URL of an object in a public bucket.
    pub fn public_url(&self, bucket: &str, destination: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.url, bucket, destination
        )
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        destination: &str,
    ) -> Result<String, StorageError> {
        validate_destination(bucket)?;
        validate_destination(destination)?;

        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::Io {
                path: local_path.to_path_buf(),
                source: e,
            })?;
        let endpoint = format!("{}/storage/v1/object/{}/{}", self.url, bucket, destination);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type_for_destination(destination),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Request {
                url: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                url: endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok(self.public_url(bucket, destination))
    }
}

// ─── SessionStore ───────────────────────────────────────────────────────────

/// Per-session state visible to the front end.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record the deck's slide count as soon as it is known.
    async fn set_slide_count(&self, session_id: &str, slide_count: usize)
        -> Result<(), StorageError>;

    /// Store a completed result, replacing any earlier one for the session.
    async fn put_result(&self, session_id: &str, result: DeckResult) -> Result<(), StorageError>;

    async fn get_result(&self, session_id: &str) -> Result<Option<DeckResult>, StorageError>;
}

#[derive(Debug, Default, Clone)]
struct SessionRecord {
    slide_count: Option<usize>,
    result: Option<DeckResult>,
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn slide_count(&self, session_id: &str) -> Option<usize> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|r| r.slide_count)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn set_slide_count(
        &self,
        session_id: &str,
        slide_count: usize,
    ) -> Result<(), StorageError> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .slide_count = Some(slide_count);
        Ok(())
    }

    async fn put_result(&self, session_id: &str, result: DeckResult) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_default();
        record.slide_count = Some(result.slide_count);
        record.result = Some(result);
        Ok(())
    }

    async fn get_result(&self, session_id: &str) -> Result<Option<DeckResult>, StorageError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .and_then(|r| r.result.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DeckStats;
    use chrono::Utc;

    #[test]
    fn destinations_must_be_relative() {
        assert!(validate_destination("s1/slides/slide_1.svg").is_ok());
        assert!(validate_destination("../escape.svg").is_err());
        assert!(validate_destination("s1/../../x").is_err());
        assert!(validate_destination("/abs/path").is_err());
        assert!(validate_destination("").is_err());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for_destination("a/slide_1.svg"), "image/svg+xml");
        assert_eq!(content_type_for_destination("a/slide_1.PNG"), "image/png");
        assert_eq!(content_type_for_destination("a/result.json"), "application/json");
        assert_eq!(content_type_for_destination("a/blob"), "application/octet-stream");
    }

    #[test]
    fn supabase_public_url() {
        let s = SupabaseStorage::new("https://proj.supabase.co/", "key");
        assert_eq!(
            s.public_url("slide-visuals", "s1/slides/slide_1.svg"),
            "https://proj.supabase.co/storage/v1/object/public/slide-visuals/s1/slides/slide_1.svg"
        );
    }

    #[tokio::test]
    async fn local_storage_copies_into_bucket_tree() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("slide.svg");
        std::fs::write(&src, "<svg/>").unwrap();

        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path());
        let url = storage
            .upload(&src, "slide-visuals", "s1/slides/slide_1.svg")
            .await
            .unwrap();

        let stored = root.path().join("slide-visuals/s1/slides/slide_1.svg");
        assert_eq!(std::fs::read_to_string(&stored).unwrap(), "<svg/>");
        assert!(url.starts_with("file://"), "got {url}");
        assert!(url.ends_with("slide-visuals/s1/slides/slide_1.svg"));
    }

    #[tokio::test]
    async fn local_storage_base_url() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("t.png");
        std::fs::write(&src, [0u8; 4]).unwrap();
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path()).with_base_url("http://cdn.local/");
        let url = storage.upload(&src, "b", "s/t.png").await.unwrap();
        assert_eq!(url, "http://cdn.local/b/s/t.png");
    }

    #[tokio::test]
    async fn local_storage_rejects_traversal() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path());
        let err = storage
            .upload(Path::new("/dev/null"), "b", "../../etc/x")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDestination(_)));
    }

    #[test]
    fn session_results_are_superseded() {
        let store = InMemorySessionStore::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(store.set_slide_count("s1", 3).await);
            assert_eq!(store.slide_count("s1").await, Some(3));
            assert!(tokio_test::assert_ok!(store.get_result("s1").await).is_none());

            let result = |job: &str| DeckResult {
                session_id: "s1".into(),
                job_id: job.into(),
                slide_count: 3,
                slides: vec![],
                stats: DeckStats::default(),
                completed_at: Utc::now(),
            };
            tokio_test::assert_ok!(store.put_result("s1", result("first")).await);
            tokio_test::assert_ok!(store.put_result("s1", result("second")).await);
            let latest = tokio_test::assert_ok!(store.get_result("s1").await);
            assert_eq!(latest.map(|r| r.job_id).as_deref(), Some("second"));
        });
    }
}
