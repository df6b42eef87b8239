//! Persistence seam for ingested records.
//!
//! The pipeline only needs three operations from a document store: an
//! unordered bulk insert, a single insert, and a bounded scan. Anything that
//! can provide them (a database driver, a file, an in-memory vector) can sit
//! behind [`RecordStore`].

use crate::record::Record;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document rejected: {0}")]
    Rejected(String),
    #[error("bulk write failed: {failed} of {attempted} documents rejected")]
    BulkWrite { attempted: usize, failed: usize },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert every record, unordered: one rejected document must not stop
    /// the others from being written. Any rejection fails the whole call.
    async fn insert_many(&self, records: &[Record]) -> StoreResult<()>;

    async fn insert_one(&self, record: &Record) -> StoreResult<()>;

    /// Up to `limit` records in the store's natural order.
    async fn find(&self, limit: usize) -> StoreResult<Vec<Record>>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn insert_many(&self, records: &[Record]) -> StoreResult<()> {
        (**self).insert_many(records).await
    }

    async fn insert_one(&self, record: &Record) -> StoreResult<()> {
        (**self).insert_one(record).await
    }

    async fn find(&self, limit: usize) -> StoreResult<Vec<Record>> {
        (**self).find(limit).await
    }
}

type RejectRule = Box<dyn Fn(&Record) -> Option<String> + Send + Sync>;

/// Vector-backed store with an optional document validation rule.
///
/// The rule plays the part of a collection validator or unique index: a
/// record for which it returns `Some(reason)` is refused.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<Record>>,
    reject: Option<RejectRule>,
    unavailable: AtomicBool,
    bulk_calls: AtomicUsize,
    single_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Record) -> Option<String> + Send + Sync + 'static,
    {
        self.reject = Some(Box::new(rule));
        self
    }

    /// Make every call fail as if the backend were down.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<Record> {
        self.docs.lock().await.clone()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn rejection(&self, record: &Record) -> Option<String> {
        self.reject.as_ref().and_then(|rule| rule(record))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("has_rule", &self.reject.is_some())
            .field("bulk_calls", &self.bulk_calls())
            .field("single_calls", &self.single_calls())
            .finish()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_many(&self, records: &[Record]) -> StoreResult<()> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut docs = self.docs.lock().await;
        let mut failed = 0usize;
        for record in records {
            if self.rejection(record).is_some() {
                failed += 1;
            } else {
                docs.push(record.clone());
            }
        }
        if failed > 0 {
            return Err(StoreError::BulkWrite {
                attempted: records.len(),
                failed,
            });
        }
        Ok(())
    }

    async fn insert_one(&self, record: &Record) -> StoreResult<()> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        if let Some(reason) = self.rejection(record) {
            return Err(StoreError::Rejected(reason));
        }
        self.docs.lock().await.push(record.clone());
        Ok(())
    }

    async fn find(&self, limit: usize) -> StoreResult<Vec<Record>> {
        self.check_available()?;
        let docs = self.docs.lock().await;
        Ok(docs.iter().take(limit).cloned().collect())
    }
}
