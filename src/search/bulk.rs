//! Batching bulk submitter. Items accumulate until a byte threshold or a
//! flush interval fires, then go to the search engine in one `_bulk`
//! request on a background task. Per-item success/failure notifications are
//! demuxed from the response and delivered through a listener, decoupled in
//! time from the tick that enqueued the item.
//!
//! One dispatcher lives for the whole worker lifetime: it is created at
//! startup, shared across ticks, and closed exactly once during shutdown.
//! `close` flushes everything still buffered and waits for in-flight
//! submissions, so all callbacks have fired by the time it returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::{BulkParts, Elasticsearch};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::SearchError;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Index,
    Delete,
}

impl BulkAction {
    pub fn verb(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Delete => "delete",
        }
    }
}

/// One unit of work for the search engine. `outbox_id`, `entity_type` and
/// `op` ride along so the failure channel can record a dead-letter entry
/// long after the enqueuing tick has moved on.
#[derive(Debug, Clone)]
pub struct BulkItem {
    pub action: BulkAction,
    pub index: &'static str,
    pub document_id: String,
    pub outbox_id: i64,
    pub entity_type: String,
    pub op: String,
    /// Document bytes; absent for deletes.
    pub body: Option<Vec<u8>>,
}

impl BulkItem {
    fn encoded_len(&self) -> usize {
        // metadata line + payload line
        self.index.len()
            + self.document_id.len()
            + 32
            + self.body.as_ref().map_or(0, |b| b.len() + 1)
    }
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Max buffered bytes before a forced flush.
    pub flush_bytes: usize,
    /// Max wait before a non-empty buffer is flushed.
    pub flush_interval: Duration,
    /// Parallel submission fan-out.
    pub num_workers: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            flush_bytes: 5 << 20,
            flush_interval: Duration::from_secs(2),
            // UPSERTs carry full state, so last-writer-wins is safe within
            // one submission; a single worker keeps enqueue order intact on
            // the wire as well.
            num_workers: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkResponseItem>>,
}

/// One entry of a `_bulk` response, keyed by action verb in the wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponseItem {
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponseError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Seam to the engine's `_bulk` endpoint.
#[async_trait]
pub trait BulkTransport: Send + Sync + 'static {
    async fn send_bulk(&self, body: String) -> Result<BulkResponse, SearchError>;
}

pub struct EsBulkTransport {
    client: Elasticsearch,
}

impl EsBulkTransport {
    pub fn new(client: Elasticsearch) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BulkTransport for EsBulkTransport {
    async fn send_bulk(&self, body: String) -> Result<BulkResponse, SearchError> {
        let response = self
            .client
            .bulk(BulkParts::None)
            .body(vec![body])
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchError::BulkStatus(status.as_u16()));
        }

        Ok(response.json::<BulkResponse>().await?)
    }
}

/// Per-item notifications. Implementations must be safe to run concurrently
/// with subsequent enqueue ticks.
#[async_trait]
pub trait BulkListener: Send + Sync + 'static {
    async fn on_success(&self, item: &BulkItem, response: &BulkResponseItem);
    async fn on_failure(
        &self,
        item: &BulkItem,
        response: Option<&BulkResponseItem>,
        error: Option<&SearchError>,
    );
}

/// Synthesize the error string for a failed item: transport error first,
/// then the engine's `type: reason`, then the bare status code.
pub fn failure_message(
    response: Option<&BulkResponseItem>,
    error: Option<&SearchError>,
) -> String {
    if let Some(err) = error {
        return err.to_string();
    }
    if let Some(res) = response {
        if let Some(detail) = &res.error {
            return match &detail.reason {
                Some(reason) => format!("{}: {}", detail.kind, reason),
                None => detail.kind.clone(),
            };
        }
        return format!("status={}", res.status);
    }
    "bulk item response missing".to_string()
}

#[derive(Debug, Default)]
struct BulkStats {
    flushed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct BulkStatsSnapshot {
    pub flushed: u64,
    pub failed: u64,
}

enum Command {
    Item(BulkItem),
    Close(oneshot::Sender<()>),
}

/// Cheap-to-clone handle over the accumulator task.
#[derive(Clone)]
pub struct BulkDispatcher {
    tx: mpsc::Sender<Command>,
    closed: Arc<AtomicBool>,
    stats: Arc<BulkStats>,
}

impl BulkDispatcher {
    pub fn new(
        transport: Arc<dyn BulkTransport>,
        listener: Arc<dyn BulkListener>,
        config: BulkConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stats = Arc::new(BulkStats::default());

        let accumulator = Accumulator {
            rx,
            transport,
            listener,
            config,
            stats: stats.clone(),
        };
        tokio::spawn(accumulator.run());

        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    /// Enqueue one item. May wait on channel capacity; order of accepted
    /// items equals call order.
    pub async fn add(&self, item: BulkItem) -> Result<(), SearchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SearchError::DispatcherClosed);
        }
        self.tx
            .send(Command::Item(item))
            .await
            .map_err(|_| SearchError::DispatcherClosed)
    }

    pub fn stats(&self) -> BulkStatsSnapshot {
        BulkStatsSnapshot {
            flushed: self.stats.flushed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Flush everything still buffered and wait for in-flight submissions;
    /// every callback has fired by the time this returns. Idempotent, but
    /// only the first call does the work.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

struct Accumulator {
    rx: mpsc::Receiver<Command>,
    transport: Arc<dyn BulkTransport>,
    listener: Arc<dyn BulkListener>,
    config: BulkConfig,
    stats: Arc<BulkStats>,
}

impl Accumulator {
    async fn run(mut self) {
        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let mut inflight: JoinSet<()> = JoinSet::new();
        let mut buffer: Vec<BulkItem> = Vec::new();
        let mut buffered_bytes = 0usize;

        // first tick one interval out, not immediately
        let mut ticker = interval_at(
            Instant::now() + self.config.flush_interval,
            self.config.flush_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Item(item)) => {
                        buffered_bytes += item.encoded_len();
                        buffer.push(item);
                        if buffered_bytes >= self.config.flush_bytes {
                            self.spawn_flush(&mut inflight, &semaphore, std::mem::take(&mut buffer));
                            buffered_bytes = 0;
                        }
                    }
                    Some(Command::Close(ack)) => {
                        if !buffer.is_empty() {
                            self.spawn_flush(&mut inflight, &semaphore, std::mem::take(&mut buffer));
                        }
                        while inflight.join_next().await.is_some() {}
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        if !buffer.is_empty() {
                            self.spawn_flush(&mut inflight, &semaphore, std::mem::take(&mut buffer));
                        }
                        while inflight.join_next().await.is_some() {}
                        return;
                    }
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        self.spawn_flush(&mut inflight, &semaphore, std::mem::take(&mut buffer));
                        buffered_bytes = 0;
                    }
                }
                // reap finished submissions so the set stays bounded
                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            }
        }
    }

    fn spawn_flush(
        &self,
        inflight: &mut JoinSet<()>,
        semaphore: &Arc<Semaphore>,
        batch: Vec<BulkItem>,
    ) {
        let transport = self.transport.clone();
        let listener = self.listener.clone();
        let stats = self.stats.clone();
        let semaphore = semaphore.clone();

        inflight.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            submit_batch(&*transport, &*listener, &stats, batch).await;
        });
    }
}

async fn submit_batch(
    transport: &dyn BulkTransport,
    listener: &dyn BulkListener,
    stats: &BulkStats,
    batch: Vec<BulkItem>,
) {
    debug!(items = batch.len(), "submitting bulk batch");

    match transport.send_bulk(encode_ndjson(&batch)).await {
        Ok(response) => {
            let mut responses = response.items.into_iter();
            for item in &batch {
                let entry = responses.next().and_then(|mut keyed| {
                    keyed
                        .remove(item.action.verb())
                        .or_else(|| keyed.into_values().next())
                });
                match entry {
                    Some(res) if item_failed(item, &res) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        listener.on_failure(item, Some(&res), None).await;
                    }
                    Some(res) => {
                        stats.flushed.fetch_add(1, Ordering::Relaxed);
                        listener.on_success(item, &res).await;
                    }
                    None => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        listener.on_failure(item, None, None).await;
                    }
                }
            }
        }
        Err(err) => {
            error!(items = batch.len(), error = %err, "bulk request failed");
            for item in &batch {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                listener.on_failure(item, None, Some(&err)).await;
            }
        }
    }
}

/// A missing document on delete is a success: the desired state (absent) is
/// already in place.
fn item_failed(item: &BulkItem, res: &BulkResponseItem) -> bool {
    if item.action == BulkAction::Delete && res.status == 404 {
        return false;
    }
    res.error.is_some() || res.status >= 300
}

fn encode_ndjson(batch: &[BulkItem]) -> String {
    let mut body = String::new();
    for item in batch {
        let meta = match item.action {
            BulkAction::Index => serde_json::json!({
                "index": { "_index": item.index, "_id": item.document_id }
            }),
            BulkAction::Delete => serde_json::json!({
                "delete": { "_index": item.index, "_id": item.document_id }
            }),
        };
        body.push_str(&meta.to_string());
        body.push('\n');
        if let Some(doc) = &item.body {
            body.push_str(&String::from_utf8_lossy(doc));
            body.push('\n');
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::IDX_USERS;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeTransport {
        requests: Mutex<Vec<String>>,
        script: Mutex<VecDeque<Result<BulkResponse, SearchError>>>,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
            })
        }

        fn push_response(&self, response: Result<BulkResponse, SearchError>) {
            self.script.lock().unwrap().push_back(response);
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BulkTransport for FakeTransport {
        async fn send_bulk(&self, body: String) -> Result<BulkResponse, SearchError> {
            self.requests.lock().unwrap().push(body.clone());
            if let Some(scripted) = self.script.lock().unwrap().pop_front() {
                return scripted;
            }

            // default: acknowledge every metadata line with a 200
            let mut items = Vec::new();
            for line in body.lines() {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                let Some(object) = value.as_object() else { continue };
                if object.len() != 1 {
                    continue;
                }
                let (verb, meta) = object.iter().next().unwrap();
                if (verb == "index" || verb == "delete") && meta.get("_index").is_some() {
                    let mut keyed = HashMap::new();
                    keyed.insert(
                        verb.clone(),
                        BulkResponseItem {
                            status: 200,
                            error: None,
                        },
                    );
                    items.push(keyed);
                }
            }
            Ok(BulkResponse { items })
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        successes: Mutex<Vec<String>>,
        failures: Mutex<Vec<(String, String)>>,
    }

    impl RecordingListener {
        fn successes(&self) -> Vec<String> {
            self.successes.lock().unwrap().clone()
        }

        fn failures(&self) -> Vec<(String, String)> {
            self.failures.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BulkListener for RecordingListener {
        async fn on_success(&self, item: &BulkItem, _response: &BulkResponseItem) {
            self.successes
                .lock()
                .unwrap()
                .push(item.document_id.clone());
        }

        async fn on_failure(
            &self,
            item: &BulkItem,
            response: Option<&BulkResponseItem>,
            error: Option<&SearchError>,
        ) {
            self.failures
                .lock()
                .unwrap()
                .push((item.document_id.clone(), failure_message(response, error)));
        }
    }

    fn index_item(id: &str) -> BulkItem {
        BulkItem {
            action: BulkAction::Index,
            index: IDX_USERS,
            document_id: id.into(),
            outbox_id: 1,
            entity_type: "user".into(),
            op: "UPSERT".into(),
            body: Some(br#"{"username":"u"}"#.to_vec()),
        }
    }

    fn delete_item(id: &str) -> BulkItem {
        BulkItem {
            action: BulkAction::Delete,
            index: IDX_USERS,
            document_id: id.into(),
            outbox_id: 2,
            entity_type: "user".into(),
            op: "DELETE".into(),
            body: None,
        }
    }

    fn no_auto_flush() -> BulkConfig {
        BulkConfig {
            flush_bytes: usize::MAX,
            flush_interval: Duration::from_secs(3600),
            num_workers: 1,
        }
    }

    fn response_item(status: u16, error: Option<BulkResponseError>) -> BulkResponseItem {
        BulkResponseItem { status, error }
    }

    fn keyed(verb: &str, item: BulkResponseItem) -> HashMap<String, BulkResponseItem> {
        let mut map = HashMap::new();
        map.insert(verb.to_string(), item);
        map
    }

    #[tokio::test]
    async fn close_flushes_pending_items_and_fires_callbacks() {
        let transport = FakeTransport::new();
        let listener = Arc::new(RecordingListener::default());
        let dispatcher =
            BulkDispatcher::new(transport.clone(), listener.clone(), no_auto_flush());

        for id in ["a", "b", "c"] {
            dispatcher.add(index_item(id)).await.unwrap();
        }
        dispatcher.close().await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1, "one batch for all buffered items");
        assert_eq!(requests[0].matches("\"_index\"").count(), 3);
        assert_eq!(listener.successes(), vec!["a", "b", "c"]);
        assert_eq!(dispatcher.stats().flushed, 3);
        assert_eq!(dispatcher.stats().failed, 0);
    }

    #[tokio::test]
    async fn byte_threshold_forces_flush_without_close() {
        let transport = FakeTransport::new();
        let listener = Arc::new(RecordingListener::default());
        let config = BulkConfig {
            flush_bytes: 1,
            flush_interval: Duration::from_secs(3600),
            num_workers: 1,
        };
        let dispatcher = BulkDispatcher::new(transport.clone(), listener.clone(), config);

        dispatcher.add(index_item("solo")).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while listener.successes().is_empty() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "flush never happened"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.requests().len(), 1);

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn per_item_failures_are_demuxed_in_order() {
        let transport = FakeTransport::new();
        transport.push_response(Ok(BulkResponse {
            items: vec![
                keyed("index", response_item(200, None)),
                keyed(
                    "index",
                    response_item(
                        400,
                        Some(BulkResponseError {
                            kind: "mapper_parsing_exception".into(),
                            reason: Some("failed to parse".into()),
                        }),
                    ),
                ),
                keyed("index", response_item(500, None)),
            ],
        }));
        let listener = Arc::new(RecordingListener::default());
        let dispatcher =
            BulkDispatcher::new(transport.clone(), listener.clone(), no_auto_flush());

        for id in ["ok", "bad-mapping", "upstream"] {
            dispatcher.add(index_item(id)).await.unwrap();
        }
        dispatcher.close().await;

        assert_eq!(listener.successes(), vec!["ok"]);
        assert_eq!(
            listener.failures(),
            vec![
                (
                    "bad-mapping".to_string(),
                    "mapper_parsing_exception: failed to parse".to_string()
                ),
                ("upstream".to_string(), "status=500".to_string()),
            ]
        );
        assert_eq!(dispatcher.stats().flushed, 1);
        assert_eq!(dispatcher.stats().failed, 2);
    }

    #[tokio::test]
    async fn delete_of_missing_document_is_success() {
        let transport = FakeTransport::new();
        transport.push_response(Ok(BulkResponse {
            items: vec![keyed("delete", response_item(404, None))],
        }));
        let listener = Arc::new(RecordingListener::default());
        let dispatcher =
            BulkDispatcher::new(transport.clone(), listener.clone(), no_auto_flush());

        dispatcher.add(delete_item("ghost")).await.unwrap();
        dispatcher.close().await;

        assert_eq!(listener.successes(), vec!["ghost"]);
        assert!(listener.failures().is_empty());
    }

    #[tokio::test]
    async fn transport_error_fails_the_whole_batch() {
        let transport = FakeTransport::new();
        transport.push_response(Err(SearchError::BulkStatus(503)));
        let listener = Arc::new(RecordingListener::default());
        let dispatcher =
            BulkDispatcher::new(transport.clone(), listener.clone(), no_auto_flush());

        dispatcher.add(index_item("x")).await.unwrap();
        dispatcher.add(index_item("y")).await.unwrap();
        dispatcher.close().await;

        let failures = listener.failures();
        assert_eq!(failures.len(), 2);
        for (_, message) in failures {
            assert_eq!(message, "bulk request failed: status=503");
        }
        assert_eq!(dispatcher.stats().failed, 2);
    }

    #[tokio::test]
    async fn add_after_close_is_rejected() {
        let transport = FakeTransport::new();
        let listener = Arc::new(RecordingListener::default());
        let dispatcher =
            BulkDispatcher::new(transport.clone(), listener.clone(), no_auto_flush());

        dispatcher.close().await;
        let result = dispatcher.add(index_item("late")).await;
        assert!(matches!(result, Err(SearchError::DispatcherClosed)));
    }

    #[test]
    fn failure_message_prefers_error_then_detail_then_status() {
        let err = SearchError::BulkStatus(503);
        let detail = response_item(
            400,
            Some(BulkResponseError {
                kind: "mapper_parsing_exception".into(),
                reason: Some("bad field".into()),
            }),
        );

        assert_eq!(
            failure_message(Some(&detail), Some(&err)),
            "bulk request failed: status=503"
        );
        assert_eq!(
            failure_message(Some(&detail), None),
            "mapper_parsing_exception: bad field"
        );

        let no_reason = response_item(
            400,
            Some(BulkResponseError {
                kind: "illegal_argument_exception".into(),
                reason: None,
            }),
        );
        assert_eq!(
            failure_message(Some(&no_reason), None),
            "illegal_argument_exception"
        );

        let bare = response_item(429, None);
        assert_eq!(failure_message(Some(&bare), None), "status=429");
    }

    #[test]
    fn ndjson_has_one_meta_line_per_item_and_bodies_for_indexes() {
        let batch = vec![index_item("a"), delete_item("b")];
        let body = encode_ndjson(&batch);
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(r#""index""#));
        assert!(lines[1].contains("username"));
        assert!(lines[2].contains(r#""delete""#));
        assert!(body.ends_with('\n'));
    }
}
