use crate::config::ObjectStoreConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Prefix every directly uploaded object lives under
pub const PUBLIC_PREFIX: &str = "public";

/// Reference to an object after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Path of the object inside the bucket
    pub path: String,
}

/// Blob storage addressed by path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `path`. Identical paths overwrite.
    async fn put(
        &self,
        path: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject, StoreError>;

    /// Publicly resolvable URL for a stored path
    fn public_url(&self, path: &str) -> String;
}

/// Object path for a user-supplied file name: `public/<filename>`
pub fn object_path(file_name: &str) -> String {
    format!("{}/{}", PUBLIC_PREFIX, sanitize_file_name(file_name))
}

/// Replace anything outside `[A-Za-z0-9._-]` so a name cannot escape its prefix
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        // ".", ".." and "" are not usable object names
        cleaned.replace('.', "_") + "_"
    } else {
        cleaned
    }
}

/// Build a public URL from the store configuration
fn build_public_url(config: &ObjectStoreConfig, path: &str) -> String {
    let base = match (&config.public_base_url, &config.endpoint_url) {
        (Some(base), _) => base.trim_end_matches('/').to_string(),
        (None, Some(endpoint)) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        (None, None) => format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        ),
    };
    format!("{}/{}", base, path.trim_start_matches('/'))
}

/// Split a body into multipart parts. A zero part size is treated as one byte.
fn parts(data: &[u8], part_size: usize) -> std::slice::Chunks<'_, u8> {
    data.chunks(part_size.max(1))
}

/// S3-compatible object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    config: ObjectStoreConfig,
}

impl S3ObjectStore {
    /// Create a new S3 object store client
    pub async fn new(config: &ObjectStoreConfig) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Single-part upload for small files
    async fn simple_upload(
        &self,
        path: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(
        &self,
        path: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StoreError::Backend("No upload ID in response".to_string()))?;

        if let Err(e) = self.upload_parts(path, upload_id, data).await {
            // Leave no incomplete multipart upload behind
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(path)
                .upload_id(upload_id)
                .send()
                .await
            {
                warn!(
                    path = %path,
                    error = %DisplayErrorContext(&abort_err),
                    "Failed to abort multipart upload"
                );
            }
            return Err(e);
        }

        Ok(())
    }

    /// Upload every part and complete the multipart upload
    async fn upload_parts(
        &self,
        path: &str,
        upload_id: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let mut completed_parts = Vec::new();

        for (index, chunk) in parts(data, self.config.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(path)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

            completed_parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        let completed_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data), fields(bucket = %self.bucket, size_bytes = data.len()))]
    async fn put(
        &self,
        path: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject, StoreError> {
        if data.len() > self.config.multipart_threshold_bytes {
            self.multipart_upload(path, content_type, data).await?;
        } else {
            self.simple_upload(path, content_type, data).await?;
        }

        debug!(path = %path, "Object written");

        Ok(StoredObject {
            path: path.to_string(),
        })
    }

    fn public_url(&self, path: &str) -> String {
        build_public_url(&self.config, path)
    }
}

/// Process-local object store for development and tests
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Bytes stored under `path`
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(path).cloned())
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        _content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject, StoreError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Backend("object store lock poisoned".to_string()))?;
        objects.insert(path.to_string(), data.to_vec());

        Ok(StoredObject {
            path: path.to_string(),
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
