//! Store adapters, the image transformer and the gateway flow built on them.

pub mod gateway_service;
pub mod image_transformer;
#[cfg(any(test, feature = "test-util"))]
pub mod memory_store;
pub mod object_store;
pub mod s3_store;
