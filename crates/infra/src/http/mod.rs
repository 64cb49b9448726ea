//! Shared HTTP client and the HTTP feed source.

pub mod client;
pub mod feed_source;

pub use client::{HttpClient, HttpClientBuilder};
pub use feed_source::HttpFeedSource;
