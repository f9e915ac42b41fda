//! Worker pool dispatcher
//!
//! A fixed number of workers write items to the sinks. Workers pull: each one
//! sends a request over a channel and waits for the feeder to answer with the
//! next item from the frontier, or with `None` once the frontier is exhausted.
//! The feeder is the only code touching the frontier, so page fetches stay
//! sequential, and it only advances the frontier when a worker is free.
//!
//! Shutdown needs no sentinel items: a worker answered with `None` drains and
//! exits, dropping its request sender. When the last sender is gone the feeder's
//! receive loop ends and the pool is joined.

use crate::api::Item;
use crate::crawler::frontier::ItemSource;
use crate::sink::{ItemWriter, SinkWriteResult};
use crate::state::WorkerState;
use crate::CrawlError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinSet;

/// Default number of workers
pub const DEFAULT_POOL_SIZE: usize = 4;

type ItemRequest = oneshot::Sender<Option<Item>>;

/// Outcome of one pool run
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Items handed to workers
    pub items_dispatched: u64,
    /// Items acknowledged by every configured sink
    pub items_written: u64,
    /// Items with at least one failed sink
    pub items_failed: u64,
    /// Ids of failed items, in completion order
    pub failed_ids: Vec<i64>,
    /// Largest number of simultaneously busy workers
    pub peak_busy: usize,
    /// Set when the frontier stopped on an error rather than running out,
    /// or when every worker died before it ran out
    pub frontier_error: Option<CrawlError>,
}

impl DispatchReport {
    pub fn is_aborted(&self) -> bool {
        self.frontier_error.is_some()
    }
}

/// Counters shared by the workers
#[derive(Default)]
struct PoolCounters {
    written: AtomicU64,
    failed: AtomicU64,
    busy: AtomicUsize,
    peak_busy: AtomicUsize,
    failed_ids: Mutex<Vec<i64>>,
    /// Item id each slot is writing; an entry left behind belongs to a worker that died
    held: Mutex<HashMap<usize, i64>>,
}

impl PoolCounters {
    fn enter_busy(&self) {
        let now = self.busy.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_busy.fetch_max(now, Ordering::SeqCst);
    }

    fn leave_busy(&self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }

    fn record(&self, result: &SinkWriteResult) {
        if result.is_success() {
            self.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.push_failed(result.item_id());
        }
    }

    fn push_failed(&self, id: i64) {
        match self.failed_ids.lock() {
            Ok(mut ids) => ids.push(id),
            Err(poisoned) => poisoned.into_inner().push(id),
        }
    }

    fn hold(&self, slot: usize, id: i64) {
        match self.held.lock() {
            Ok(mut held) => held.insert(slot, id),
            Err(poisoned) => poisoned.into_inner().insert(slot, id),
        };
    }

    fn release(&self, slot: usize) {
        match self.held.lock() {
            Ok(mut held) => held.remove(&slot),
            Err(poisoned) => poisoned.into_inner().remove(&slot),
        };
    }

    /// Counts every item still held after the pool has been joined as failed
    fn fail_abandoned(&self) {
        let abandoned: Vec<(usize, i64)> = match self.held.lock() {
            Ok(mut held) => held.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };

        for (slot, id) in abandoned {
            tracing::error!("Worker {} died while writing anime {}", slot, id);
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.push_failed(id);
        }
    }
}

/// Ids currently being written, so one id never has two concurrent writers
#[derive(Default)]
struct InFlightIds {
    ids: Mutex<HashSet<i64>>,
    released: Notify,
}

impl InFlightIds {
    fn try_insert(&self, id: i64) -> bool {
        match self.ids.lock() {
            Ok(mut ids) => ids.insert(id),
            Err(poisoned) => poisoned.into_inner().insert(id),
        }
    }

    fn remove(&self, id: i64) {
        match self.ids.lock() {
            Ok(mut ids) => ids.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        self.released.notify_waiters();
    }

    /// Waits until no other worker holds `id`, then claims it
    async fn claim(self: &Arc<Self>, id: i64) -> IdClaim {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // register before checking so a release in between is not missed
            released.as_mut().enable();

            if self.try_insert(id) {
                return IdClaim {
                    registry: Arc::clone(self),
                    id,
                };
            }

            tracing::debug!("Anime {} is already being written, waiting", id);
            released.await;
        }
    }
}

struct IdClaim {
    registry: Arc<InFlightIds>,
    id: i64,
}

impl Drop for IdClaim {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Bounded pool turning a lazy item stream into sink writes
pub struct Dispatcher<W: ItemWriter> {
    writer: Arc<W>,
    pool_size: usize,
}

impl<W: ItemWriter> Dispatcher<W> {
    /// Creates a dispatcher; a pool size of 0 is raised to 1
    pub fn new(writer: Arc<W>, pool_size: usize) -> Self {
        Self {
            writer,
            pool_size: pool_size.max(1),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Processes every item of `source`, returning once all workers have terminated
    ///
    /// Item failures are counted, never fatal. A frontier error stops new
    /// dispatches; items already handed out still finish before this returns.
    pub async fn run<S: ItemSource + ?Sized>(&self, source: &mut S) -> DispatchReport {
        let (request_tx, mut request_rx) = mpsc::channel::<ItemRequest>(self.pool_size);
        let counters = Arc::new(PoolCounters::default());
        let in_flight = Arc::new(InFlightIds::default());

        let mut workers = JoinSet::new();
        for slot in 0..self.pool_size {
            workers.spawn(worker_loop(
                slot,
                request_tx.clone(),
                Arc::clone(&self.writer),
                Arc::clone(&in_flight),
                Arc::clone(&counters),
            ));
        }
        // only workers hold senders from here on
        drop(request_tx);

        let mut dispatched = 0u64;
        let mut exhausted = false;
        let mut frontier_error = None;

        while let Some(reply) = request_rx.recv().await {
            let next = if exhausted {
                None
            } else {
                match source.next_item().await {
                    Ok(Some(item)) => Some(item),
                    Ok(None) => {
                        tracing::info!("Frontier exhausted, draining workers");
                        exhausted = true;
                        None
                    }
                    Err(e) => {
                        tracing::error!("Frontier traversal aborted: {}", e);
                        frontier_error = Some(e);
                        exhausted = true;
                        None
                    }
                }
            };

            match next {
                Some(item) => {
                    dispatched += 1;
                    if let Err(Some(lost)) = reply.send(Some(item)) {
                        tracing::error!("Worker vanished before receiving anime {}", lost.id());
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        counters.push_failed(lost.id());
                    }
                }
                None => {
                    let _ = reply.send(None);
                }
            }
        }

        if !exhausted {
            tracing::error!("Every worker stopped before the frontier was exhausted");
            frontier_error = Some(CrawlError::PoolStopped);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }
        counters.fail_abandoned();

        let failed_ids = match counters.failed_ids.lock() {
            Ok(ids) => ids.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        DispatchReport {
            items_dispatched: dispatched,
            items_written: counters.written.load(Ordering::SeqCst),
            items_failed: counters.failed.load(Ordering::SeqCst),
            failed_ids,
            peak_busy: counters.peak_busy.load(Ordering::SeqCst),
            frontier_error,
        }
    }
}

async fn worker_loop<W: ItemWriter>(
    slot: usize,
    requests: mpsc::Sender<ItemRequest>,
    writer: Arc<W>,
    in_flight: Arc<InFlightIds>,
    counters: Arc<PoolCounters>,
) {
    let mut state = WorkerState::Idle;

    loop {
        let (reply_tx, reply_rx) = oneshot::channel();
        if requests.send(reply_tx).await.is_err() {
            break;
        }

        let item = match reply_rx.await {
            Ok(Some(item)) => item,
            _ => break,
        };

        state = advance(state, WorkerState::Busy, slot);
        counters.enter_busy();
        counters.hold(slot, item.id());

        let result = {
            let _claim = in_flight.claim(item.id()).await;
            writer.write(&item).await
        };

        counters.leave_busy();
        counters.release(slot);
        counters.record(&result);
        log_result(slot, &item, &result);
        drop(item);

        state = advance(state, WorkerState::Idle, slot);
    }

    state = advance(state, WorkerState::Draining, slot);
    // dropping the sender tells the feeder this slot will ask for nothing more
    drop(requests);
    state = advance(state, WorkerState::Terminated, slot);
    tracing::debug!("Worker {} {}", slot, state);
}

fn advance(state: WorkerState, next: WorkerState, slot: usize) -> WorkerState {
    match state.transition(next) {
        Ok(next) => next,
        Err(e) => {
            tracing::error!("Worker {}: {}", slot, e);
            next
        }
    }
}

fn log_result(slot: usize, item: &Item, result: &SinkWriteResult) {
    let title = item.title().unwrap_or("untitled");
    if result.is_success() {
        tracing::info!("Completed anime {} ({})", item.id(), title);
    } else {
        tracing::warn!(
            "Worker {} failed to store anime {} ({}): {}",
            slot,
            item.id(),
            title,
            result.failure_summary()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{SinkError, SinkKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    /// Source over a fixed list, optionally failing after it runs out
    struct VecSource {
        items: VecDeque<Item>,
        fail_at_end: bool,
        pulls: usize,
    }

    impl VecSource {
        fn new(ids: &[i64]) -> Self {
            Self {
                items: ids
                    .iter()
                    .map(|id| Item::from_value(json!({ "id": id })).unwrap())
                    .collect(),
                fail_at_end: false,
                pulls: 0,
            }
        }
    }

    #[async_trait]
    impl ItemSource for VecSource {
        async fn next_item(&mut self) -> Result<Option<Item>, CrawlError> {
            self.pulls += 1;
            match self.items.pop_front() {
                Some(item) => Ok(Some(item)),
                None if self.fail_at_end => {
                    self.fail_at_end = false;
                    Err(CrawlError::ClientError { status: 400 })
                }
                None => Ok(None),
            }
        }
    }

    /// Writer that sleeps, tracks concurrency, and fails chosen ids
    #[derive(Default)]
    struct TestWriter {
        delay: Duration,
        fail_ids: HashSet<i64>,
        busy: AtomicUsize,
        peak: AtomicUsize,
        written: Mutex<Vec<i64>>,
        per_id_busy: Mutex<HashMap<i64, usize>>,
        overlapping_ids: AtomicUsize,
    }

    #[async_trait]
    impl ItemWriter for TestWriter {
        async fn write(&self, item: &Item) -> SinkWriteResult {
            let now = self.busy.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            {
                let mut per_id = self.per_id_busy.lock().unwrap();
                let count = per_id.entry(item.id()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    self.overlapping_ids.fetch_add(1, Ordering::SeqCst);
                }
            }

            tokio::time::sleep(self.delay).await;

            *self.per_id_busy.lock().unwrap().get_mut(&item.id()).unwrap() -= 1;
            self.busy.fetch_sub(1, Ordering::SeqCst);

            let mut result = SinkWriteResult::new(item.id());
            if self.fail_ids.contains(&item.id()) {
                result.record(SinkKind::Filesystem, Err(SinkError::Other("boom".to_string())));
            } else {
                self.written.lock().unwrap().push(item.id());
                result.record(SinkKind::Filesystem, Ok(()));
            }
            result
        }
    }

    #[tokio::test]
    async fn test_all_items_processed() {
        let writer = Arc::new(TestWriter::default());
        let dispatcher = Dispatcher::new(writer.clone(), 3);
        let mut source = VecSource::new(&[1, 2, 3, 4, 5, 6, 7]);

        let report = dispatcher.run(&mut source).await;

        assert_eq!(report.items_dispatched, 7);
        assert_eq!(report.items_written, 7);
        assert_eq!(report.items_failed, 0);
        assert!(!report.is_aborted());
        let mut written = writer.written.lock().unwrap().clone();
        written.sort();
        assert_eq!(written, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_pool_size() {
        let writer = Arc::new(TestWriter {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(writer.clone(), 3);
        let ids: Vec<i64> = (1..=20).collect();
        let mut source = VecSource::new(&ids);

        let report = dispatcher.run(&mut source).await;

        assert_eq!(report.items_written, 20);
        assert!(report.peak_busy <= 3);
        assert!(writer.peak.load(Ordering::SeqCst) <= 3);
        // with slow writes the pool actually fills up
        assert_eq!(writer.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_pool() {
        let writer = Arc::new(TestWriter {
            fail_ids: [3].into_iter().collect(),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(writer.clone(), 2);
        let mut source = VecSource::new(&[1, 2, 3, 4, 5]);

        let report = dispatcher.run(&mut source).await;

        assert_eq!(report.items_written, 4);
        assert_eq!(report.items_failed, 1);
        assert_eq!(report.failed_ids, vec![3]);
        assert!(!report.is_aborted());
    }

    #[tokio::test]
    async fn test_frontier_error_drains_in_flight_items() {
        let writer = Arc::new(TestWriter {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(writer.clone(), 2);
        let mut source = VecSource::new(&[1, 2, 3]);
        source.fail_at_end = true;

        let report = dispatcher.run(&mut source).await;

        assert!(report.is_aborted());
        assert!(matches!(
            report.frontier_error,
            Some(CrawlError::ClientError { status: 400 })
        ));
        assert_eq!(report.items_written, 3);
        // the source is not pulled again after it failed
        assert_eq!(source.pulls, 4);
    }

    #[tokio::test]
    async fn test_empty_frontier_terminates() {
        let writer = Arc::new(TestWriter::default());
        let dispatcher = Dispatcher::new(writer, 4);
        let mut source = VecSource::new(&[]);

        let report = dispatcher.run(&mut source).await;

        assert_eq!(report.items_dispatched, 0);
        assert_eq!(source.pulls, 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_never_written_concurrently() {
        let writer = Arc::new(TestWriter {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(writer.clone(), 4);
        let mut source = VecSource::new(&[8, 8, 8, 9]);

        let report = dispatcher.run(&mut source).await;

        assert_eq!(report.items_written, 4);
        assert_eq!(writer.overlapping_ids.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_pool_size_is_raised() {
        let writer = Arc::new(TestWriter::default());
        let dispatcher = Dispatcher::new(writer, 0);
        assert_eq!(dispatcher.pool_size(), 1);

        let mut source = VecSource::new(&[1, 2]);
        assert_eq!(dispatcher.run(&mut source).await.items_written, 2);
    }

    /// Writer whose task dies on one id
    struct PanickingWriter {
        panic_on: i64,
    }

    #[async_trait]
    impl ItemWriter for PanickingWriter {
        async fn write(&self, item: &Item) -> SinkWriteResult {
            if item.id() == self.panic_on {
                panic!("writer crashed on anime {}", item.id());
            }
            let mut result = SinkWriteResult::new(item.id());
            result.record(SinkKind::Filesystem, Ok(()));
            result
        }
    }

    #[tokio::test]
    async fn test_dead_pool_aborts_and_counts_lost_item() {
        let dispatcher = Dispatcher::new(Arc::new(PanickingWriter { panic_on: 2 }), 1);
        let mut source = VecSource::new(&[1, 2, 3]);

        let report = dispatcher.run(&mut source).await;

        assert_eq!(report.items_dispatched, 2);
        assert_eq!(report.items_written, 1);
        assert_eq!(report.items_failed, 1);
        assert_eq!(report.failed_ids, vec![2]);
        assert!(matches!(report.frontier_error, Some(CrawlError::PoolStopped)));
        // item 3 was never handed out
        assert_eq!(source.items.len(), 1);
    }

    #[tokio::test]
    async fn test_surviving_workers_finish_the_frontier() {
        let dispatcher = Dispatcher::new(Arc::new(PanickingWriter { panic_on: 2 }), 2);
        let mut source = VecSource::new(&[1, 2, 3, 4, 5]);

        let report = dispatcher.run(&mut source).await;

        assert!(!report.is_aborted());
        assert_eq!(report.items_dispatched, 5);
        assert_eq!(report.items_written, 4);
        assert_eq!(report.failed_ids, vec![2]);
    }
}
