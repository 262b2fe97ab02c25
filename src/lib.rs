//! HTTP gateway serving objects from an S3-compatible bucket, generating
//! resized image variants on first request and writing them back so later
//! requests are plain lookups.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod runtime;
pub mod services;
