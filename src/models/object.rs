//! Objects as they move between the store and the HTTP layer.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::{fmt, io};

/// Lazy, finite, non-restartable object payload.
///
/// Dropping it releases whatever upstream connection backs it.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// An object read from the store.
///
/// Metadata is optional because the store may omit any of it.
pub struct StoredObject {
    pub body: ObjectBody,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Entity tag exactly as the store reported it (usually already quoted).
    pub etag: Option<String>,
    pub cache_control: Option<String>,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("etag", &self.etag)
            .field("cache_control", &self.cache_control)
            .finish_non_exhaustive()
    }
}

/// A fully buffered object written back to the store.
#[derive(Clone, Debug)]
pub struct ObjectUpload {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: String,
    pub cache_control: String,
}

/// Payload of a response: streamed from the store or freshly generated.
pub enum ServedBody {
    Stream(ObjectBody),
    Full(Bytes),
}

/// Everything the HTTP layer needs to answer a successful request.
pub struct ServedObject {
    pub body: ServedBody,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub cache_control: String,
}

impl ServedObject {
    /// A direct hit, passed through with the store's metadata.
    pub fn from_stored(object: StoredObject, cache_control: String) -> Self {
        Self {
            body: ServedBody::Stream(object.body),
            content_type: object.content_type,
            content_length: object.content_length,
            etag: object.etag,
            cache_control,
        }
    }

    /// A variant generated for this request. No ETag is reported for these.
    pub fn generated(bytes: Bytes, content_type: String, cache_control: String) -> Self {
        Self {
            content_length: Some(bytes.len() as u64),
            body: ServedBody::Full(bytes),
            content_type: Some(content_type),
            etag: None,
            cache_control,
        }
    }
}
