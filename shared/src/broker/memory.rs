// ============================================================================
// In-process topic broker
// ============================================================================
//
// Implements the same contract as the AMQP backend so the pipeline can run in
// a single process (tests, local development):
//
// - topic routing with `*` / `#`, one copy per queue
// - exclusive queues disappear with their connection, taking buffered
//   messages with them; durable queues keep buffering
// - unacked deliveries go back to the head of a durable queue when their
//   connection drops, or on nack with requeue, flagged `redelivered`
//
// Prefetch is not modelled; each stream hands out one delivery per poll.
//
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use murmur_types::DomainEvent;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::channel::{
    Acker, BrokerChannel, Connector, Delivery, DeliveryStream, QueueIdentity, SubscriptionSpec,
};
use super::error::BrokerError;
use super::topic::topic_matches;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to one in-process broker. Clones talk to the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerState>,
}

struct BrokerState {
    reachable: AtomicBool,
    connects: AtomicUsize,
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, Arc<MemoryConnection>>>,
    exchanges: Mutex<HashSet<String>>,
    topology: Mutex<Topology>,
    published: Mutex<Vec<DomainEvent>>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            exchanges: Mutex::new(HashSet::new()),
            topology: Mutex::new(Topology::default()),
            published: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Default)]
struct Topology {
    queues: HashMap<String, Arc<MemoryQueue>>,
    bindings: Vec<Binding>,
}

struct Binding {
    exchange: String,
    pattern: String,
    queue: String,
}

struct MemoryConnection {
    id: u64,
    closed: CancellationToken,
}

#[derive(Clone)]
struct Queued {
    event: DomainEvent,
    redelivered: bool,
}

struct MemoryQueue {
    durable: bool,
    /// Connection that owns an exclusive queue
    owner: Option<u64>,
    state: Mutex<QueueState>,
    ready: Notify,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Queued>,
    /// delivery tag -> (message, connection it was delivered on)
    unacked: HashMap<u64, (Queued, u64)>,
}

impl MemoryQueue {
    fn new(durable: bool, owner: Option<u64>) -> Self {
        Self {
            durable,
            owner,
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
        }
    }

    fn push(&self, message: Queued) {
        lock(&self.state).ready.push_back(message);
        self.ready.notify_one();
    }

    fn take(&self, tag: u64, connection: u64) -> Option<Queued> {
        let mut state = lock(&self.state);
        let message = state.ready.pop_front()?;
        state.unacked.insert(tag, (message.clone(), connection));
        Some(message)
    }

    fn settle(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let mut state = lock(&self.state);
        let (mut message, _) = state
            .unacked
            .remove(&tag)
            .ok_or_else(|| BrokerError::Channel(format!("unknown delivery tag {}", tag)))?;
        if requeue {
            message.redelivered = true;
            state.ready.push_front(message);
            drop(state);
            self.ready.notify_one();
        }
        Ok(())
    }

    /// Return everything delivered on `connection` and not yet settled
    fn recover(&self, connection: u64) {
        let mut state = lock(&self.state);
        let mut tags: Vec<u64> = state
            .unacked
            .iter()
            .filter(|(_, (_, conn))| *conn == connection)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable();
        let mut recovered = false;
        for tag in tags.into_iter().rev() {
            if let Some((mut message, _)) = state.unacked.remove(&tag) {
                message.redelivered = true;
                state.ready.push_front(message);
                recovered = true;
            }
        }
        drop(state);
        if recovered {
            self.ready.notify_one();
        }
    }

    fn depth(&self) -> usize {
        let state = lock(&self.state);
        state.ready.len() + state.unacked.len()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the broker going down (new connections are refused).
    /// Existing connections are untouched; see [`drop_connections`](Self::drop_connections).
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Close every open connection, as a broker restart would
    pub fn drop_connections(&self) {
        let dropped: Vec<Arc<MemoryConnection>> =
            lock(&self.inner.connections).drain().map(|(_, c)| c).collect();
        self.close_connections(&dropped);
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        lock(&self.inner.connections).len()
    }

    fn close_connection(&self, id: u64) {
        let closed = lock(&self.inner.connections).remove(&id);
        if let Some(connection) = closed {
            self.close_connections(&[connection]);
        }
    }

    fn close_connections(&self, dropped: &[Arc<MemoryConnection>]) {
        for connection in dropped {
            connection.closed.cancel();
        }

        let mut topology = lock(&self.inner.topology);
        let ids: HashSet<u64> = dropped.iter().map(|c| c.id).collect();

        for queue in topology.queues.values() {
            for id in &ids {
                queue.recover(*id);
            }
        }

        let doomed: Vec<String> = topology
            .queues
            .iter()
            .filter(|(_, q)| !q.durable && q.owner.map(|o| ids.contains(&o)).unwrap_or(false))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &doomed {
            topology.queues.remove(name);
        }
        topology.bindings.retain(|b| !doomed.contains(&b.queue));
    }

    /// Number of successful connects so far
    pub fn connection_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn exchange_declared(&self, exchange: &str) -> bool {
        lock(&self.inner.exchanges).contains(exchange)
    }

    /// Every event accepted by the broker, routed or not
    pub fn published(&self) -> Vec<DomainEvent> {
        lock(&self.inner.published).clone()
    }

    pub fn published_with_key(&self, routing_key: &str) -> Vec<DomainEvent> {
        lock(&self.inner.published)
            .iter()
            .filter(|e| e.routing_key == routing_key)
            .cloned()
            .collect()
    }

    /// Ready plus unacked messages on a queue (None if it does not exist)
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        lock(&self.inner.topology).queues.get(queue).map(|q| q.depth())
    }

    pub fn queue_count(&self) -> usize {
        lock(&self.inner.topology).queues.len()
    }

    fn route(&self, exchange: &str, event: &DomainEvent) -> usize {
        let topology = lock(&self.inner.topology);
        let mut targets: Vec<&str> = topology
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange && topic_matches(&b.pattern, &event.routing_key))
            .map(|b| b.queue.as_str())
            .collect();
        targets.sort_unstable();
        targets.dedup();

        for name in &targets {
            if let Some(queue) = topology.queues.get(*name) {
                queue.push(Queued {
                    event: event.clone(),
                    redelivered: false,
                });
            }
        }
        targets.len()
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    type Channel = MemoryChannel;

    async fn connect(&self) -> Result<MemoryChannel, BrokerError> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("connection refused".to_string()));
        }

        let connection = Arc::new(MemoryConnection {
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            closed: CancellationToken::new(),
        });
        lock(&self.inner.connections).insert(connection.id, connection.clone());
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryChannel {
            broker: self.clone(),
            connection,
        })
    }
}

/// Channel on an [`InMemoryBroker`]
#[derive(Clone)]
pub struct MemoryChannel {
    broker: InMemoryBroker,
    connection: Arc<MemoryConnection>,
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("connection", &self.connection.id)
            .finish_non_exhaustive()
    }
}

impl MemoryChannel {
    fn check_open(&self) -> Result<(), BrokerError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("channel closed".to_string()))
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        !self.connection.closed.is_cancelled()
    }

    fn same_channel(&self, other: &Self) -> bool {
        self.connection.id == other.connection.id
    }

    async fn close(&self) {
        self.broker.close_connection(self.connection.id);
    }

    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        self.check_open()?;
        lock(&self.broker.inner.exchanges).insert(exchange.to_string());
        Ok(())
    }

    async fn publish(&self, exchange: &str, event: &DomainEvent) -> Result<(), BrokerError> {
        self.check_open()?;
        if !self.broker.exchange_declared(exchange) {
            return Err(BrokerError::Channel(format!("no exchange '{}'", exchange)));
        }

        lock(&self.broker.inner.published).push(event.clone());
        let routed = self.broker.route(exchange, event);
        tracing::trace!(routing_key = %event.routing_key, queues = routed, "In-memory publish");
        Ok(())
    }

    async fn subscribe(
        &self,
        exchange: &str,
        spec: &SubscriptionSpec,
        _prefetch: u16,
    ) -> Result<DeliveryStream, BrokerError> {
        self.check_open()?;

        let (name, queue) = {
            let mut topology = lock(&self.broker.inner.topology);
            let (name, durable, owner) = match &spec.queue {
                QueueIdentity::Exclusive => (
                    format!("amq.gen-{}", Uuid::new_v4().simple()),
                    false,
                    Some(self.connection.id),
                ),
                QueueIdentity::Durable(name) => (name.clone(), true, None),
            };
            let queue = topology
                .queues
                .entry(name.clone())
                .or_insert_with(|| Arc::new(MemoryQueue::new(durable, owner)))
                .clone();

            for pattern in &spec.patterns {
                let exists = topology
                    .bindings
                    .iter()
                    .any(|b| b.exchange == exchange && b.pattern == *pattern && b.queue == name);
                if !exists {
                    topology.bindings.push(Binding {
                        exchange: exchange.to_string(),
                        pattern: pattern.clone(),
                        queue: name.clone(),
                    });
                }
            }
            (name, queue)
        };

        tracing::debug!(queue = %name, "In-memory subscription bound");

        let state = StreamState {
            queue,
            connection: self.connection.clone(),
            next_tag: Arc::new(AtomicU64::new(1)),
        };

        let stream = futures_util::stream::unfold(state, |state| async move {
            loop {
                if state.connection.closed.is_cancelled() {
                    return None;
                }

                let tag = state.next_tag.fetch_add(1, Ordering::SeqCst);
                if let Some(message) = state.queue.take(tag, state.connection.id) {
                    let acker = MemoryAcker {
                        queue: state.queue.clone(),
                        connection: state.connection.clone(),
                        tag,
                    };
                    let delivery =
                        Delivery::new(message.event, message.redelivered, Box::new(acker));
                    return Some((Ok(delivery), state));
                }

                tokio::select! {
                    _ = state.queue.ready.notified() => {}
                    _ = state.connection.closed.cancelled() => {}
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct StreamState {
    queue: Arc<MemoryQueue>,
    connection: Arc<MemoryConnection>,
    next_tag: Arc<AtomicU64>,
}

struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    connection: Arc<MemoryConnection>,
    tag: u64,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        if self.connection.closed.is_cancelled() {
            return Err(BrokerError::Channel("channel closed before ack".to_string()));
        }
        self.queue.settle(self.tag, false)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        if self.connection.closed.is_cancelled() {
            return Err(BrokerError::Channel("channel closed before nack".to_string()));
        }
        self.queue.settle(self.tag, requeue)
    }
}
