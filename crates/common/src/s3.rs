use std::{io, path::Path};

use aws_sdk_s3::{
    config::{Builder, Credentials, Region},
    primitives::ByteStream,
    Client,
};
use derive_more::{Display, Error, From};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

use crate::config::{self, MissingConfig};

/// Content type used for uploaded workspace archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Object storage errors.
#[derive(Debug, Display, From, Error)]
pub enum StorageError {
    /// S3 API error.
    S3(aws_sdk_s3::Error),

    /// Local file IO error.
    Io(io::Error),

    /// Storage configuration is incomplete.
    Config(MissingConfig),
}

/// Configured S3 client bound to a single bucket.
pub struct ConfiguredClient {
    bucket: String,
    client: Client,
}

impl ConfiguredClient {
    /// Create new [`ConfiguredClient`] from the provided [`Storage`] configuration.
    ///
    /// Path-style addressing is always used, so that S3-compatible
    /// providers behind a custom endpoint work without DNS tricks.
    ///
    /// [`Storage`]: config::Storage
    pub async fn new(config: &config::Storage) -> Result<ConfiguredClient, StorageError> {
        let bucket = config.bucket.clone().ok_or(MissingConfig("AWS_BUCKET"))?;

        let mut loader = aws_config::from_env();

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "ci-helper",
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = Builder::from(&sdk_config).force_path_style(true).build();

        Ok(ConfiguredClient {
            bucket,
            client: Client::from_conf(s3_config),
        })
    }

    /// Bucket name used by this client.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload the local file at `path` with the provided object key.
    ///
    /// The file is streamed from disk.
    pub async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        debug!(bucket = %self.bucket, key, "object uploaded");

        Ok(())
    }

    /// Download the object with the provided key into a local file at `path`.
    ///
    /// Returns the amount of downloaded bytes.
    pub async fn download_file(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        let mut body = object.body.into_async_read();
        let mut file = File::create(path).await?;
        let size = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        debug!(bucket = %self.bucket, key, size, "object downloaded");

        Ok(size)
    }
}
