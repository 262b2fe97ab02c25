//! Cache-aside request flow for originals and resized variants.
//!
//! 1. Look the path up verbatim. A hit is streamed back as is.
//! 2. On a miss, read the path as `{original}/{axis}/{size}`.
//! 3. Fetch the original, resize it, write the variant back under
//!    `{original}/{axis}/{size}` and answer with the generated bytes.
//!
//! The store is the only cache. Two concurrent misses for the same variant
//! both generate and both write; the writes are equivalent, last one wins.

use crate::{
    errors::AppError,
    models::{
        key::{ObjectKey, VariantDescriptor},
        object::{ObjectUpload, ServedObject},
    },
    services::{
        image_transformer::{ImageTransformer, ResizeSpec, SourceKind},
        object_store::{ObjectStore, StoreError, collect_body},
    },
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Clone)]
pub struct GatewayService {
    store: Arc<dyn ObjectStore>,
    transformer: ImageTransformer,
    default_cache_control: String,
}

impl GatewayService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transformer: ImageTransformer,
        default_cache_control: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transformer,
            default_cache_control: default_cache_control.into(),
        }
    }

    /// The source object's directive, or the configured default.
    pub fn effective_cache_control(&self, source: Option<&str>) -> String {
        source
            .map(str::to_string)
            .unwrap_or_else(|| self.default_cache_control.clone())
    }

    /// Resolve a request path (leading `/` already stripped) to a response.
    pub async fn fetch(&self, path: &str) -> Result<ServedObject, AppError> {
        let key = ObjectKey::parse(path).ok_or(AppError::EmptyPath)?;

        match self.store.get(key.as_str()).await {
            Ok(object) => {
                debug!(key = %key, "direct hit");
                let cache_control = self.effective_cache_control(object.cache_control.as_deref());
                return Ok(ServedObject::from_stored(object, cache_control));
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(AppError::Store(err)),
        }

        let variant = VariantDescriptor::from_key(&key)?;
        self.generate(&variant).await
    }

    async fn generate(&self, variant: &VariantDescriptor) -> Result<ServedObject, AppError> {
        let base_key = variant.base_key();
        let original = self.store.get(base_key.as_str()).await.map_err(|err| {
            if err.is_not_found() {
                AppError::NotFound(base_key.to_string())
            } else {
                AppError::Store(err)
            }
        })?;

        let kind = SourceKind::classify(original.content_type.as_deref())
            .ok_or_else(|| AppError::NotAnImage(base_key.to_string()))?;
        // classify() only succeeds when a content type is present
        let source_type = original.content_type.clone().unwrap_or_default();
        let cache_control = self.effective_cache_control(original.cache_control.as_deref());

        let source = collect_body(original.body, original.content_length)
            .await
            .map_err(|err| AppError::Store(StoreError::Io(err)))?;

        let spec = ResizeSpec {
            axis: variant.axis(),
            size: variant.size(),
        };
        let transformed = self
            .transformer
            .transform(source, kind, &source_type, spec)
            .await?;

        let variant_key = variant.store_key();
        let upload = ObjectUpload {
            key: variant_key.to_string(),
            bytes: transformed.bytes.clone(),
            content_type: transformed.content_type.clone(),
            cache_control: cache_control.clone(),
        };
        match self.store.put(upload).await {
            Ok(()) => info!(
                key = %variant_key,
                bytes = transformed.bytes.len(),
                "stored generated variant"
            ),
            Err(err) => error!(
                key = %variant_key,
                error = %err,
                "failed to store generated variant, serving it anyway"
            ),
        }

        Ok(ServedObject::generated(
            transformed.bytes,
            transformed.content_type,
            cache_control,
        ))
    }
}
