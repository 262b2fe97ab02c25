//! Core data models for the gateway.
//!
//! Keys and variant descriptors are computed per request from the URL path;
//! objects are fetched per request. Nothing here is cached in memory.

pub mod key;
pub mod object;
