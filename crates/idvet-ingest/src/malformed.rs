use std::sync::Arc;

use async_trait::async_trait;
use idvet_types::{MalformedRecord, Person};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A record that could not be ingested, with the reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedEntry {
    /// Where the record came from: a source line or a parsed identity.
    pub source: String,
    pub reason: String,
}

impl MalformedEntry {
    pub fn from_record(record: &MalformedRecord) -> Self {
        Self {
            source: format!("line {}: {}", record.line, record.content),
            reason: record.reason.clone(),
        }
    }

    pub fn from_person(person: &Person, reason: impl Into<String>) -> Self {
        Self {
            source: format!("{} ({})", person.id(), person.username()),
            reason: reason.into(),
        }
    }
}

/// Sink for records that failed ingestion.
#[async_trait]
pub trait MalformedRepository: Send + Sync {
    async fn add(&self, entry: MalformedEntry);
}

/// Keeps every entry in memory.
#[derive(Default)]
pub struct InMemoryMalformedRepository {
    entries: Mutex<Vec<MalformedEntry>>,
}

impl InMemoryMalformedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<MalformedEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl MalformedRepository for InMemoryMalformedRepository {
    async fn add(&self, entry: MalformedEntry) {
        debug!(source = %entry.source, reason = %entry.reason, "malformed record stored");
        self.entries.lock().push(entry);
    }
}

/// Hands entries to a background task so callers never wait on the sink.
///
/// Entries are delivered to the inner repository in submission order.
/// [`close`](Self::close) waits until every submitted entry is delivered.
pub struct FireAndForget<R> {
    inner: Arc<R>,
    sender: Mutex<Option<mpsc::UnboundedSender<MalformedEntry>>>,
    consumer: tokio::sync::Mutex<Option<JoinHandle<u64>>>,
}

impl<R: MalformedRepository + 'static> FireAndForget<R> {
    /// Must be called inside a Tokio runtime.
    pub fn spawn(inner: Arc<R>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<MalformedEntry>();
        let sink = Arc::clone(&inner);
        let consumer = tokio::spawn(async move {
            let mut delivered = 0;
            while let Some(entry) = receiver.recv().await {
                sink.add(entry).await;
                delivered += 1;
            }
            delivered
        });
        Self {
            inner,
            sender: Mutex::new(Some(sender)),
            consumer: tokio::sync::Mutex::new(Some(consumer)),
        }
    }

    pub fn inner(&self) -> &Arc<R> {
        &self.inner
    }

    /// Queue an entry without waiting. Entries submitted after `close` are
    /// dropped.
    pub fn submit(&self, entry: MalformedEntry) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(entry);
        }
    }

    /// Stop accepting entries and wait for the backlog to drain. Returns the
    /// number of entries delivered.
    pub async fn close(&self) -> u64 {
        self.sender.lock().take();
        let consumer = self.consumer.lock().await.take();
        match consumer {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

#[async_trait]
impl<R: MalformedRepository + 'static> MalformedRepository for FireAndForget<R> {
    async fn add(&self, entry: MalformedEntry) {
        self.submit(entry);
    }
}

impl<R> Drop for FireAndForget<R> {
    fn drop(&mut self) {
        if self.sender.get_mut().take().is_some() {
            info!("fire-and-forget sink dropped without close; backlog still drains");
        }
    }
}
