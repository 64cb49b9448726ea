use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use icalsync_core::FeedSource;
use icalsync_domain::{Result as DomainResult, SyncError};
use tokio::sync::Notify;

/// Serves fixed documents per URL and counts fetches.
#[derive(Default)]
pub struct StaticFeedSource {
    documents: Mutex<HashMap<String, DomainResult<String>>>,
    fetches: AtomicUsize,
}

impl StaticFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, document: impl Into<String>) {
        self.documents.lock().unwrap().insert(url.to_string(), Ok(document.into()));
    }

    pub fn fail(&self, url: &str, error: SyncError) {
        self.documents.lock().unwrap().insert(url.to_string(), Err(error));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch(&self, url: &str) -> DomainResult<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(SyncError::Network(format!("no document for {url}"))))
    }
}

/// Blocks every fetch until released, signalling when a fetch has started.
pub struct GatedFeedSource {
    document: String,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    fetches: AtomicUsize,
}

impl GatedFeedSource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for GatedFeedSource {
    async fn fetch(&self, _url: &str) -> DomainResult<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.document.clone())
    }
}
