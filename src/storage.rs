use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Upload URLs stay valid for ten minutes.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);
/// Download URLs stay valid for five minutes.
const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(300);

/// Content types accepted as compliance evidence, with the extension used in the key.
pub const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/heic", "heic"),
];

/// Extension for an accepted content type, `None` when the type is not allowed.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(ct, _)| ct.eq_ignore_ascii_case(content_type))
        .map(|(_, ext)| *ext)
}

/// document_key
///
/// Object key for a new document. The client-supplied filename never reaches the key;
/// only the organization, issue and a fresh UUID do.
pub fn document_key(organization_id: Uuid, issue_id: Uuid, extension: &str) -> String {
    format!(
        "organizations/{}/issues/{}/{}.{}",
        organization_id,
        issue_id,
        Uuid::new_v4(),
        extension
    )
}

/// StorageService
///
/// Object storage for compliance documents. Swappable between the real S3 client and
/// the in-memory mock without touching handlers.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if missing. Used for the local MinIO setup.
    async fn ensure_bucket_exists(&self);

    /// Signed URL for a single PUT of `key`, constrained to `content_type`.
    async fn get_presigned_upload_url(&self, key: &str, content_type: &str) -> Result<String, String>;

    /// Signed URL for a single GET of `key`.
    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String>;
}

/// S3StorageClient
///
/// AWS SDK client pointed at S3, MinIO or any S3-compatible gateway.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials = s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // MinIO and most gateways only support path-style addressing.
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self.client.create_bucket().bucket(&self.bucket_name).send().await {
            // Already-exists errors land here too.
            tracing::debug!("create_bucket({}): {:?}", self.bucket_name, e);
        }
    }

    async fn get_presigned_upload_url(&self, key: &str, content_type: &str) -> Result<String, String> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL).map_err(|e| e.to_string())?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| e.to_string())?;

        Ok(request.uri().to_string())
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String> {
        let presigning = PresigningConfig::expires_in(DOWNLOAD_URL_TTL).map_err(|e| e.to_string())?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| e.to_string())?;

        Ok(request.uri().to_string())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a key can never climb out of its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Deterministic URLs for tests, no network.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(&self, key: &str, _content_type: &str) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake&method=PUT",
            sanitize_key(key)
        ))
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake&method=GET",
            sanitize_key(key)
        ))
    }
}

pub type StorageState = Arc<dyn StorageService>;
