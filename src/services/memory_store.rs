//! In-process [`ObjectStore`] used by the test suite.

use crate::models::object::{ObjectBody, ObjectUpload, StoredObject};
use crate::services::object_store::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;

/// Bodies are handed out in chunks of this size to behave like a network stream.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug)]
struct MemoryObject {
    bytes: Bytes,
    content_type: Option<String>,
    cache_control: Option<String>,
    etag: String,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a gateway write.
    pub async fn insert(
        &self,
        key: impl Into<String>,
        bytes: impl Into<Bytes>,
        content_type: Option<&str>,
        cache_control: Option<&str>,
    ) {
        let bytes = bytes.into();
        let object = MemoryObject {
            etag: etag_for(&bytes),
            bytes,
            content_type: content_type.map(str::to_string),
            cache_control: cache_control.map(str::to_string),
        };
        self.objects.write().await.insert(key.into(), object);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn bytes(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).map(|o| o.bytes.clone())
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .and_then(|o| o.content_type.clone())
    }

    pub async fn cache_control(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .and_then(|o| o.cache_control.clone())
    }

    /// Number of successful `put` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<StoredObject> {
        let object = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(StoredObject {
            content_length: Some(object.bytes.len() as u64),
            body: chunked(object.bytes),
            content_type: object.content_type,
            etag: Some(object.etag),
            cache_control: object.cache_control,
        })
    }

    async fn put(&self, upload: ObjectUpload) -> StoreResult<()> {
        let object = MemoryObject {
            etag: etag_for(&upload.bytes),
            bytes: upload.bytes,
            content_type: Some(upload.content_type),
            cache_control: Some(upload.cache_control),
        };
        self.objects.write().await.insert(upload.key, object);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn etag_for(bytes: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(bytes))
}

fn chunked(bytes: Bytes) -> ObjectBody {
    let chunks: Vec<io::Result<Bytes>> = (0..bytes.len())
        .step_by(CHUNK_SIZE)
        .map(|start| Ok(bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len()))))
        .collect();
    Box::pin(stream::iter(chunks))
}
