// Upload queue controller: owns an ordered queue of in-flight file
// transfers and drives each through
// pending -> uploading -> processing -> completed | error.
//
// Concurrency shape: the queue is an arena of items keyed by stable ids.
// All mutation flows through one event channel consumed by a single owner
// task, so a transition for item i can never clobber a concurrent update
// to item j. Observers get snapshots through a watch channel. Each
// accepted item is driven by its own task; dismissal aborts that task and
// removes the slot, after which any event the task had already emitted is
// dropped on arrival (no stale completion can land).

pub mod endpoint;

pub use endpoint::{
    HttpMetadataStore, HttpTransferEndpoint, MetadataStore, ProcessingStatus, TransferEndpoint,
    UploadReceipt,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::processing::validate_upload;

pub type ItemId = u64;

// Coarse progress markers per lifecycle stage
const PROGRESS_PENDING: u8 = 0;
const PROGRESS_UPLOADING: u8 = 40;
const PROGRESS_PROCESSING: u8 = 75;
const PROGRESS_COMPLETED: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Uploading,
    Processing,
    Completed,
    Error,
}

/// One file's upload lifecycle record, as observed by the UI.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub id: ItemId,
    pub filename: String,
    pub size: u64,
    pub state: TransferState,
    pub progress: u8,
    pub error: Option<String>,
    pub file_id: Option<Uuid>,
}

/// A file the user selected or dropped; the bytes move into the driver
/// task once the candidate passes validation.
pub struct UploadCandidate {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Backoff and deadline for polling the metadata store after the
/// endpoint has acknowledged receipt.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadQueueConfig {
    pub project_id: Option<Uuid>,
    pub poll: PollConfig,
}

enum QueueEvent {
    Append {
        batch: Vec<TransferItem>,
        ack: oneshot::Sender<()>,
    },
    Transition {
        id: ItemId,
        state: TransferState,
        progress: u8,
        error: Option<String>,
        file_id: Option<Uuid>,
    },
    Remove {
        id: ItemId,
        ack: oneshot::Sender<bool>,
    },
}

pub struct UploadQueue {
    events: mpsc::UnboundedSender<QueueEvent>,
    queue_rx: watch::Receiver<Vec<TransferItem>>,
    endpoint: Arc<dyn TransferEndpoint>,
    store: Arc<dyn MetadataStore>,
    config: UploadQueueConfig,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<ItemId, JoinHandle<()>>>,
}

impl UploadQueue {
    /// Build the controller. The returned receiver yields the file id of
    /// every item that reaches `completed`.
    pub fn new(
        endpoint: Arc<dyn TransferEndpoint>,
        store: Arc<dyn MetadataStore>,
        config: UploadQueueConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = watch::channel(Vec::new());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_owner(events_rx, queue_tx, completions_tx));

        (
            Self {
                events: events_tx,
                queue_rx,
                endpoint,
                store,
                config,
                next_id: AtomicU64::new(0),
                tasks: Mutex::new(HashMap::new()),
            },
            completions_rx,
        )
    }

    /// Validate and enqueue candidates, preserving submission order, then
    /// start an independent driver task per accepted item. Items that
    /// fail validation enter the queue directly in `error` and never
    /// touch the network.
    pub async fn submit(&self, candidates: Vec<UploadCandidate>) -> Vec<ItemId> {
        let mut batch = Vec::with_capacity(candidates.len());
        let mut to_drive = Vec::new();
        let mut ids = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            ids.push(id);
            let size = candidate.bytes.len() as u64;

            match validate_upload(&candidate.filename, size) {
                Ok(_) => {
                    batch.push(TransferItem {
                        id,
                        filename: candidate.filename.clone(),
                        size,
                        state: TransferState::Pending,
                        progress: PROGRESS_PENDING,
                        error: None,
                        file_id: None,
                    });
                    to_drive.push((id, candidate));
                }
                Err(reason) => {
                    debug!(filename = %candidate.filename, %reason, "Upload candidate rejected");
                    batch.push(TransferItem {
                        id,
                        filename: candidate.filename,
                        size,
                        state: TransferState::Error,
                        progress: 0,
                        error: Some(reason),
                        file_id: None,
                    });
                }
            }
        }

        // Append the whole batch before any driver runs so the queue
        // shows every item in submission order, in pending
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.events.send(QueueEvent::Append { batch, ack: ack_tx }).is_ok() {
            let _ = ack_rx.await;
        }

        for (id, candidate) in to_drive {
            let handle = tokio::spawn(drive_transfer(
                id,
                candidate,
                self.config.project_id,
                self.endpoint.clone(),
                self.store.clone(),
                self.config.poll.clone(),
                self.events.clone(),
            ));
            self.tasks.lock().expect("task map poisoned").insert(id, handle);
        }

        ids
    }

    /// Remove an item regardless of state. The driver task, if still
    /// running, is aborted; returns false when the id is unknown
    /// (dismissing twice is a reported no-op).
    pub async fn dismiss(&self, id: ItemId) -> bool {
        if let Some(handle) = self.tasks.lock().expect("task map poisoned").remove(&id) {
            handle.abort();
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.events.send(QueueEvent::Remove { id, ack: ack_tx }).is_err() {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    /// Current queue contents in submission order.
    pub fn snapshot(&self) -> Vec<TransferItem> {
        self.queue_rx.borrow().clone()
    }

    /// Live view of the queue for UI consumers.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TransferItem>> {
        self.queue_rx.clone()
    }
}

async fn run_owner(
    mut events: mpsc::UnboundedReceiver<QueueEvent>,
    queue_tx: watch::Sender<Vec<TransferItem>>,
    completions: mpsc::UnboundedSender<Uuid>,
) {
    let mut items: Vec<TransferItem> = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::Append { mut batch, ack } => {
                items.append(&mut batch);
                let _ = queue_tx.send(items.clone());
                let _ = ack.send(());
            }
            QueueEvent::Transition {
                id,
                state,
                progress,
                error,
                file_id,
            } => {
                // Events for dismissed ids miss the lookup and are dropped
                if let Some(item) = items.iter_mut().find(|item| item.id == id) {
                    item.state = state;
                    item.progress = progress;
                    item.error = error;
                    if file_id.is_some() {
                        item.file_id = file_id;
                    }
                    if state == TransferState::Completed {
                        if let Some(file_id) = item.file_id {
                            let _ = completions.send(file_id);
                        }
                    }
                    let _ = queue_tx.send(items.clone());
                }
            }
            QueueEvent::Remove { id, ack } => {
                let before = items.len();
                items.retain(|item| item.id != id);
                let removed = items.len() != before;
                if removed {
                    let _ = queue_tx.send(items.clone());
                }
                let _ = ack.send(removed);
            }
        }
    }
}

async fn drive_transfer(
    id: ItemId,
    candidate: UploadCandidate,
    project_id: Option<Uuid>,
    endpoint: Arc<dyn TransferEndpoint>,
    store: Arc<dyn MetadataStore>,
    poll: PollConfig,
    events: mpsc::UnboundedSender<QueueEvent>,
) {
    let send = |state, progress, error, file_id| {
        let _ = events.send(QueueEvent::Transition {
            id,
            state,
            progress,
            error,
            file_id,
        });
    };

    send(TransferState::Uploading, PROGRESS_UPLOADING, None, None);

    let receipt = match endpoint
        .upload(&candidate.filename, candidate.bytes, project_id)
        .await
    {
        Ok(receipt) => receipt,
        Err(e) => {
            let message = non_empty_message(e.to_string(), "Upload failed");
            send(TransferState::Error, 0, Some(message), None);
            return;
        }
    };

    send(
        TransferState::Processing,
        PROGRESS_PROCESSING,
        None,
        Some(receipt.file_id),
    );

    match poll_until_complete(store.as_ref(), receipt.file_id, &poll).await {
        Ok(()) => send(
            TransferState::Completed,
            PROGRESS_COMPLETED,
            None,
            Some(receipt.file_id),
        ),
        Err(message) => send(TransferState::Error, 0, Some(message), Some(receipt.file_id)),
    }
}

/// Poll the metadata store with bounded exponential backoff until the
/// file leaves `processing` or the deadline expires. Transient fetch
/// errors keep polling; the deadline is the hard stop.
async fn poll_until_complete(
    store: &dyn MetadataStore,
    file_id: Uuid,
    poll: &PollConfig,
) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + poll.deadline;
    let mut backoff = poll.initial_backoff;

    loop {
        match store.fetch_status(file_id).await {
            Ok(ProcessingStatus::Completed) => return Ok(()),
            Ok(ProcessingStatus::Failed) => {
                return Err("Processing failed on the server".to_string());
            }
            Ok(ProcessingStatus::Processing) => {}
            Err(e) => {
                debug!(%file_id, "Status poll failed: {}", e);
            }
        }

        if tokio::time::Instant::now() + backoff >= deadline {
            return Err(format!(
                "Timed out waiting for processing after {}s",
                poll.deadline.as_secs()
            ));
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(poll.max_backoff);
    }
}

fn non_empty_message(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    struct MockEndpoint {
        delays: HashMap<String, Duration>,
        failures: HashSet<String>,
        file_ids: Mutex<HashMap<String, Uuid>>,
        calls: AtomicUsize,
    }

    impl MockEndpoint {
        fn new() -> Self {
            Self {
                delays: HashMap::new(),
                failures: HashSet::new(),
                file_ids: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, filename: &str, delay: Duration) -> Self {
            self.delays.insert(filename.to_string(), delay);
            self
        }

        fn failing(mut self, filename: &str) -> Self {
            self.failures.insert(filename.to_string());
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn file_id_for(&self, filename: &str) -> Option<Uuid> {
            self.file_ids.lock().unwrap().get(filename).copied()
        }
    }

    #[async_trait]
    impl TransferEndpoint for MockEndpoint {
        async fn upload(
            &self,
            filename: &str,
            _bytes: Vec<u8>,
            _project_id: Option<Uuid>,
        ) -> Result<UploadReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(filename) {
                tokio::time::sleep(*delay).await;
            }
            if self.failures.contains(filename) {
                return Err(anyhow!("connection reset by peer"));
            }

            let file_id = *self
                .file_ids
                .lock()
                .unwrap()
                .entry(filename.to_string())
                .or_insert_with(Uuid::new_v4);

            Ok(UploadReceipt {
                file_id,
                storage_url: format!("https://storage.example/{}", filename),
                status: "processing".to_string(),
                message: "File uploaded".to_string(),
            })
        }
    }

    struct MockStore {
        terminal: ProcessingStatus,
        polls_until_terminal: usize,
        polls: AtomicUsize,
    }

    impl MockStore {
        fn completing() -> Self {
            Self {
                terminal: ProcessingStatus::Completed,
                polls_until_terminal: 0,
                polls: AtomicUsize::new(0),
            }
        }

        fn completing_after(polls: usize) -> Self {
            Self {
                terminal: ProcessingStatus::Completed,
                polls_until_terminal: polls,
                polls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                terminal: ProcessingStatus::Failed,
                polls_until_terminal: 0,
                polls: AtomicUsize::new(0),
            }
        }

        fn never_completing() -> Self {
            Self {
                terminal: ProcessingStatus::Processing,
                polls_until_terminal: 0,
                polls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetadataStore for MockStore {
        async fn fetch_status(&self, _file_id: Uuid) -> Result<ProcessingStatus> {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            if seen < self.polls_until_terminal {
                Ok(ProcessingStatus::Processing)
            } else {
                Ok(self.terminal)
            }
        }
    }

    fn candidate(filename: &str, size: usize) -> UploadCandidate {
        UploadCandidate {
            filename: filename.to_string(),
            bytes: vec![0u8; size],
        }
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            deadline: Duration::from_secs(30),
        }
    }

    fn queue_with(
        endpoint: Arc<dyn TransferEndpoint>,
        store: Arc<dyn MetadataStore>,
    ) -> (UploadQueue, mpsc::UnboundedReceiver<Uuid>) {
        UploadQueue::new(
            endpoint,
            store,
            UploadQueueConfig {
                project_id: None,
                poll: fast_poll(),
            },
        )
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<Vec<TransferItem>>, predicate: F)
    where
        F: Fn(&[TransferItem]) -> bool,
    {
        loop {
            if predicate(&rx.borrow_and_update()) {
                return;
            }
            rx.changed().await.expect("queue owner dropped");
        }
    }

    fn all_terminal(items: &[TransferItem]) -> bool {
        !items.is_empty()
            && items
                .iter()
                .all(|i| matches!(i.state, TransferState::Completed | TransferState::Error))
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_file_reaches_completed() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::completing_after(2));
        let (queue, mut completions) = queue_with(endpoint.clone(), store);

        queue.submit(vec![candidate("report.csv", 10 * 1024)]).await;

        // the batch is appended before any driver runs
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, TransferState::Pending);
        assert_eq!(snapshot[0].progress, 0);
        assert!(snapshot[0].error.is_none());

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Completed);
        assert_eq!(snapshot[0].progress, 100);
        assert!(snapshot[0].error.is_none());

        let completed_id = completions.recv().await.unwrap();
        assert_eq!(Some(completed_id), endpoint.file_id_for("report.csv"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_extension_never_hits_network() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::completing());
        let (queue, _completions) = queue_with(endpoint.clone(), store);

        queue.submit(vec![candidate("malware.exe", 10)]).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Error);
        assert_eq!(snapshot[0].progress, 0);
        assert!(snapshot[0].error.as_ref().unwrap().contains(".exe"));

        // give any stray task a chance to run before checking
        tokio::task::yield_now().await;
        assert_eq!(endpoint.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_file_cites_ceiling() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::completing());
        let (queue, _completions) = queue_with(endpoint.clone(), store);

        queue
            .submit(vec![candidate("bigdata.xlsx", 60 * 1024 * 1024)])
            .await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Error);
        assert!(snapshot[0].error.as_ref().unwrap().contains("50 MiB"));
        assert_eq!(endpoint.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_order_stable_under_out_of_order_completion() {
        let endpoint = Arc::new(
            MockEndpoint::new()
                .with_delay("a.csv", Duration::from_secs(5))
                .with_delay("b.pdf", Duration::from_millis(10)),
        );
        let store = Arc::new(MockStore::completing());
        let (queue, mut completions) = queue_with(endpoint.clone(), store);

        queue
            .submit(vec![candidate("a.csv", 100), candidate("b.pdf", 100)])
            .await;

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].filename, "a.csv");
        assert_eq!(snapshot[1].filename, "b.pdf");
        assert_eq!(snapshot[0].state, TransferState::Completed);
        assert_eq!(snapshot[1].state, TransferState::Completed);

        // b.pdf resolves first despite being submitted second
        let first_completed = completions.recv().await.unwrap();
        assert_eq!(Some(first_completed), endpoint.file_id_for("b.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_contained_to_one_item() {
        let endpoint = Arc::new(MockEndpoint::new().failing("broken.csv"));
        let store = Arc::new(MockStore::completing());
        let (queue, _completions) = queue_with(endpoint, store);

        queue
            .submit(vec![candidate("broken.csv", 100), candidate("fine.pdf", 100)])
            .await;

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Error);
        assert!(snapshot[0]
            .error
            .as_ref()
            .unwrap()
            .contains("connection reset"));
        assert_eq!(snapshot[0].progress, 0);
        assert_eq!(snapshot[1].state, TransferState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_processing_failure_surfaces() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::failing());
        let (queue, _completions) = queue_with(endpoint, store);

        queue.submit(vec![candidate("report.csv", 100)]).await;

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Error);
        assert!(snapshot[0].error.as_ref().unwrap().contains("Processing failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_deadline_transitions_to_error() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::never_completing());
        let (queue, _completions) = queue_with(endpoint, store);

        queue.submit(vec![candidate("slow.csv", 100)]).await;

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Error);
        assert!(snapshot[0].error.as_ref().unwrap().contains("Timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_middle_item_preserves_order() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::completing());
        let (queue, _completions) = queue_with(endpoint, store);

        let ids = queue
            .submit(vec![
                candidate("one.csv", 10),
                candidate("two.csv", 10),
                candidate("three.csv", 10),
            ])
            .await;

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        assert!(queue.dismiss(ids[1]).await);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].filename, "one.csv");
        assert_eq!(snapshot[1].filename, "three.csv");

        // dismissing again is a reported no-op
        assert!(!queue.dismiss(ids[1]).await);
        assert_eq!(queue.snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_in_flight_item_never_resurfaces() {
        let endpoint =
            Arc::new(MockEndpoint::new().with_delay("slow.csv", Duration::from_secs(60)));
        let store = Arc::new(MockStore::completing());
        let (queue, mut completions) = queue_with(endpoint, store);

        let ids = queue.submit(vec![candidate("slow.csv", 10)]).await;

        let mut rx = queue.subscribe();
        wait_for(&mut rx, |items| {
            items
                .first()
                .is_some_and(|i| i.state == TransferState::Uploading)
        })
        .await;

        assert!(queue.dismiss(ids[0]).await);
        assert!(queue.snapshot().is_empty());

        // let the aborted driver's window pass; nothing may come back
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(queue.snapshot().is_empty());
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_on_success_path() {
        let endpoint =
            Arc::new(MockEndpoint::new().with_delay("report.csv", Duration::from_millis(50)));
        let store = Arc::new(MockStore::completing_after(3));
        let (queue, _completions) = queue_with(endpoint, store);

        queue.submit(vec![candidate("report.csv", 10)]).await;

        let mut rx = queue.subscribe();
        let mut observed = vec![0u8];
        loop {
            let (progress, done) = {
                let items = rx.borrow_and_update();
                match items.first() {
                    Some(item) => (item.progress, item.state == TransferState::Completed),
                    None => (0, false),
                }
            };
            observed.push(progress);
            if done {
                break;
            }
            rx.changed().await.unwrap();
        }

        assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{:?}", observed);
        assert_eq!(*observed.last().unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_batch_keeps_submission_order() {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MockStore::completing());
        let (queue, _completions) = queue_with(endpoint, store);

        queue
            .submit(vec![
                candidate("good.csv", 10),
                candidate("bad.exe", 10),
                candidate("also_good.pdf", 10),
            ])
            .await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[1].filename, "bad.exe");
        assert_eq!(snapshot[1].state, TransferState::Error);

        let mut rx = queue.subscribe();
        wait_for(&mut rx, all_terminal).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].state, TransferState::Completed);
        assert_eq!(snapshot[2].state, TransferState::Completed);
    }
}
