use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::config::AppConfig;

/// Durable object store for rendered proposal documents. `put_object`
/// returns the URL under which the object is retrievable afterwards.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    base_url: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            base_url: base_url.into(),
        }
    }

    /// Builds the S3 client from the application configuration. Path-style
    /// addressing and the endpoint/credential overrides keep localstack and
    /// minio targets working.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let region = Region::new(config.aws_region.clone());
        let region_provider = RegionProviderChain::first_try(Some(region))
            .or_default_provider()
            .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);

        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(credentials);
        }

        let base_config = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(true)
            .build();

        Ok(Self::new(
            S3Client::from_conf(s3_config),
            config.s3_bucket.clone(),
            config.object_base_url(),
        ))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(self.object_url(key))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download object from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }
}
