//! The store abstraction the gateway reads originals from and writes variants to.

use crate::models::object::{ObjectBody, ObjectUpload, StoredObject};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object store request for `{key}` failed: {message}")]
    Backend { key: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Upper bound on the up-front buffer reserved from a reported body length.
pub const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// Key/value blob service addressed by string keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object and its metadata. A missing key is [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> StoreResult<StoredObject>;

    /// Create or overwrite an object.
    async fn put(&self, upload: ObjectUpload) -> StoreResult<()>;
}

/// Drain an object body into memory.
///
/// `size_hint` comes from the store and is only trusted up to
/// [`MAX_PREALLOCATION`]; larger bodies grow the buffer as they stream in.
pub async fn collect_body(mut body: ObjectBody, size_hint: Option<u64>) -> io::Result<Bytes> {
    let capacity = size_hint
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or_default()
        .min(MAX_PREALLOCATION);
    let mut buffer = BytesMut::with_capacity(capacity);
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}
