//! S3-compatible [`ObjectStore`] backed by the AWS SDK.

use crate::config::StoreConfig;
use crate::models::object::{ObjectUpload, StoredObject};
use crate::services::object_store::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    config::Credentials,
    error::DisplayErrorContext,
    operation::get_object::GetObjectError,
    primitives::ByteStream,
};
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the gateway's store settings.
    ///
    /// Unset endpoint, region or credentials fall back to the SDK's default
    /// provider chains.
    pub async fn connect(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key_id), Some(secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret,
                None,
                None,
                "image-gateway-static",
            ));
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }

    fn backend_error(key: &str, err: impl std::error::Error) -> StoreError {
        StoreError::Backend {
            key: key.to_string(),
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> StoreResult<StoredObject> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                return match err.into_service_error() {
                    GetObjectError::NoSuchKey(_) => Err(StoreError::NotFound(key.to_string())),
                    other => Err(Self::backend_error(key, other)),
                };
            }
        };

        debug!(
            key,
            content_type = output.content_type(),
            content_length = output.content_length(),
            "fetched object"
        );

        let content_type = output.content_type().map(str::to_string);
        let content_length = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let etag = output.e_tag().map(str::to_string);
        let cache_control = output.cache_control().map(str::to_string);

        let body = ReaderStream::new(output.body.into_async_read());

        Ok(StoredObject {
            body: Box::pin(body),
            content_type,
            content_length,
            etag,
            cache_control,
        })
    }

    async fn put(&self, upload: ObjectUpload) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&upload.key)
            .content_type(upload.content_type)
            .cache_control(upload.cache_control)
            .body(ByteStream::from(upload.bytes))
            .send()
            .await
            .map_err(|err| Self::backend_error(&upload.key, err))?;
        Ok(())
    }
}
