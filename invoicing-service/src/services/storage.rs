use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use service_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;

/// Stored artifact plus the content type recorded at upload time, when the
/// backend keeps one.
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Artifact store for invoice XML/PDF blobs. Callers never branch on the
/// backend; `url_for` yields whatever public URL the backend serves from.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, AppError>;
    async fn get(&self, key: &str) -> Result<StoredObject, AppError>;
    fn url_for(&self, key: &str) -> String;
}

pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: String,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url,
        })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        // Keys come from our own issuance or from the download query; refuse
        // anything that could climb out of the base directory.
        if key.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(AppError::BadRequest(anyhow!("Invalid artifact key: {}", key)));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<String, AppError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data)
            .await
            .map_err(|e| AppError::StorageError(anyhow!("local write failed: {}", e)))?;
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<StoredObject, AppError> {
        let path = self.resolve(key)?;
        if !path.exists() {
            return Err(AppError::NotFound(anyhow!("Artifact not found: {}", key)));
        }
        let bytes = fs::read(path)
            .await
            .map_err(|e| AppError::StorageError(anyhow!("local read failed: {}", e)))?;
        Ok(StoredObject {
            bytes,
            content_type: None,
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!(
            "{}/invoices/download?name={}",
            self.public_base_url.trim_end_matches('/'),
            key
        )
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    region: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow!("S3 upload failed: {}", e)))?;
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<StoredObject, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow!("S3 download failed: {}", e)))?;

        let content_type = output.content_type().map(|s| s.to_string());
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::StorageError(anyhow!("S3 body collection failed: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}
