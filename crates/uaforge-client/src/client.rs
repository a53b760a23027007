// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The high-level client.
//!
//! [`UaClient`] composes the transport, secure channel, session, and
//! subscription engine into one handle. Service operations run through a
//! retry loop: a retryable failure tears down the stack, reconnects, and
//! tries again per [`RetryConfig`]; anything else propagates immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use uaforge_wire::{DataValue, NodeId, StatusCode, TransportLimits, Variant};

use crate::channel::SecureChannel;
use crate::conversion::TypedValue;
use crate::error::{ClientError, ClientResult, ServiceError};
use crate::service::{
    BrowseDescription, BrowseNextRequest, BrowseNextResponse, BrowseRequest, BrowseResponse,
    ReadRequest, ReadResponse, ReadValueId, ReferenceDescription, WriteRequest, WriteResponse,
    WriteValue, TIMESTAMPS_BOTH,
};
use crate::session::Session;
use crate::subscription::{SubscriptionEngine, SubscriptionHandle, SubscriptionStats};
use crate::transport::Transport;
use crate::types::{ClientConfig, SubscriptionSettings};

// =====
// Statistics
// =====

#[derive(Debug, Default)]
struct ClientCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    requests: AtomicU64,
    errors: AtomicU64,
    reconnects: AtomicU64,
    latency_micros: AtomicU64,
}

/// Point-in-time snapshot of client activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Read operations completed.
    pub reads: u64,
    /// Write operations completed.
    pub writes: u64,
    /// Service operations attempted.
    pub requests: u64,
    /// Operations that ended in an error, retried or not.
    pub errors: u64,
    /// Times the stack was rebuilt after a retryable failure.
    pub reconnects: u64,
    /// Total latency of successful operations, in microseconds.
    pub latency_micros: u64,
}

impl ClientStats {
    /// Fraction of operations that succeeded, 1.0 when idle.
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 1.0;
        }
        let failed = self.errors.min(self.requests);
        (self.requests - failed) as f64 / self.requests as f64
    }

    /// Mean latency of successful operations.
    pub fn average_response_time(&self) -> Duration {
        let succeeded = self.requests.saturating_sub(self.errors);
        if succeeded == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.latency_micros / succeeded)
    }
}

// =====
// Client
// =====

/// Everything one live connection owns. Rebuilt wholesale on reconnect.
struct Stack {
    transport: Transport,
    channel: Arc<SecureChannel>,
    session: Arc<Session>,
    engine: Arc<SubscriptionEngine>,
}

impl Stack {
    async fn teardown(&self) {
        self.engine.shutdown();
        if let Err(e) = self.session.close(true).await {
            warn!(error = %e, "session close failed");
        }
        if let Err(e) = self.channel.close().await {
            warn!(error = %e, "channel close failed");
        }
        self.transport.shutdown().await;
    }
}

/// An OPC UA client over one endpoint.
pub struct UaClient {
    config: ClientConfig,
    stack: tokio::sync::Mutex<Option<Stack>>,
    counters: ClientCounters,
}

impl UaClient {
    /// Connects to the configured endpoint: TCP and hello, secure channel,
    /// then session creation and activation. Any failure tears down what was
    /// already built and propagates.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let stack = establish(&config).await?;
        info!(endpoint = %config.endpoint_url, "client connected");
        Ok(Self {
            config,
            stack: tokio::sync::Mutex::new(Some(stack)),
            counters: ClientCounters::default(),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            requests: self.counters.requests.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            latency_micros: self.counters.latency_micros.load(Ordering::Relaxed),
        }
    }

    /// Reads the Value attribute of each node. One [`TypedValue`] per node,
    /// in request order; a bad per-item status surfaces as that value's
    /// quality, not as an error.
    pub async fn read(&self, node_ids: &[NodeId]) -> ClientResult<Vec<TypedValue>> {
        let nodes = node_ids.to_vec();
        let values = self
            .run("read", move |session| {
                let nodes = nodes.clone();
                async move { read_values(&session, nodes).await }
            })
            .await?;
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(values.into_iter().map(TypedValue::from_data_value).collect())
    }

    /// Reads one node. A bad per-item status is an error carrying the code.
    pub async fn read_one(&self, node_id: &NodeId) -> ClientResult<TypedValue> {
        let mut values = self.read(std::slice::from_ref(node_id)).await?;
        let value = values.remove(0);
        if let crate::conversion::Quality::Bad(status) = value.quality {
            return Err(ClientError::bad_item_status(node_id.clone(), status));
        }
        Ok(value)
    }

    /// Writes the Value attribute of each node. One status per write, in
    /// request order.
    pub async fn write(&self, writes: &[(NodeId, Variant)]) -> ClientResult<Vec<StatusCode>> {
        let writes = writes.to_vec();
        let results = self
            .run("write", move |session| {
                let writes = writes.clone();
                async move { write_values(&session, writes).await }
            })
            .await?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(results)
    }

    /// Writes one node. A bad write status is an error carrying the code.
    pub async fn write_one(&self, node_id: &NodeId, value: Variant) -> ClientResult<()> {
        let results = self.write(&[(node_id.clone(), value)]).await?;
        match results.first() {
            Some(status) if status.is_bad() => {
                Err(ClientError::bad_item_status(node_id.clone(), *status))
            }
            _ => Ok(()),
        }
    }

    /// Follows hierarchical references forward from `node_id`.
    pub async fn browse(&self, node_id: &NodeId) -> ClientResult<Vec<ReferenceDescription>> {
        let node = node_id.clone();
        self.run("browse", move |session| {
            let node = node.clone();
            async move { browse_node(&session, node).await }
        })
        .await
    }

    /// Creates a subscription over `node_ids` and starts delivering data
    /// changes on the returned handle.
    pub async fn subscribe(
        &self,
        node_ids: Vec<NodeId>,
        settings: Option<SubscriptionSettings>,
    ) -> ClientResult<SubscriptionHandle> {
        let engine = self.engine().await?;
        engine.subscribe(node_ids, settings).await
    }

    /// Deletes a subscription on the server and stops its delivery.
    pub async fn unsubscribe(&self, subscription_id: u32) -> ClientResult<()> {
        let engine = self.engine().await?;
        engine.unsubscribe(subscription_id).await
    }

    /// Counters of the subscription engine, zeroed when disconnected.
    pub async fn subscription_stats(&self) -> SubscriptionStats {
        match self.engine().await {
            Ok(engine) => engine.stats(),
            Err(_) => SubscriptionStats::default(),
        }
    }

    /// Issues a lightweight read when the session is nearing its timeout.
    /// A no-op while recent traffic is keeping the session fresh.
    pub async fn keep_alive(&self) -> ClientResult<()> {
        let session = self.session().await?;
        if !session.is_expiring() {
            return Ok(());
        }
        session.keep_alive().await
    }

    /// `true` while the transport socket is up and the session is active.
    pub async fn is_connected(&self) -> bool {
        let guard = self.stack.lock().await;
        match guard.as_ref() {
            Some(stack) => stack.transport.is_alive() && stack.session.is_active(),
            None => false,
        }
    }

    /// Closes the session and channel and drops the connection. Every step
    /// is best-effort; the client is disconnected afterwards regardless.
    pub async fn disconnect(&self) {
        let stack = self.stack.lock().await.take();
        if let Some(stack) = stack {
            stack.teardown().await;
            info!(endpoint = %self.config.endpoint_url, "client disconnected");
        }
    }

    async fn session(&self) -> ClientResult<Arc<Session>> {
        let guard = self.stack.lock().await;
        match guard.as_ref() {
            Some(stack) => Ok(Arc::clone(&stack.session)),
            None => Err(ClientError::not_connected()),
        }
    }

    async fn engine(&self) -> ClientResult<Arc<SubscriptionEngine>> {
        let guard = self.stack.lock().await;
        match guard.as_ref() {
            Some(stack) => Ok(Arc::clone(&stack.engine)),
            None => Err(ClientError::not_connected()),
        }
    }

    /// Tears down whatever is left of the old stack and builds a new one.
    async fn reconnect(&self) -> ClientResult<()> {
        let mut guard = self.stack.lock().await;
        if let Some(old) = guard.take() {
            old.teardown().await;
        }
        let stack = establish(&self.config).await?;
        *guard = Some(stack);
        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        info!(endpoint = %self.config.endpoint_url, "client reconnected");
        Ok(())
    }

    /// Runs one service operation with reconnect-and-retry semantics.
    async fn run<T, F, Fut>(&self, operation: &'static str, attempt_op: F) -> ClientResult<T>
    where
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let result = match self.session().await {
                Ok(session) => attempt_op(session).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => {
                    let elapsed = started.elapsed();
                    self.counters
                        .latency_micros
                        .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
                    debug!(operation, attempt, ?elapsed, "operation complete");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry.delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        ?delay,
                        error = %e,
                        "retryable failure, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                    if let Err(e) = self.reconnect().await {
                        warn!(operation, attempt, error = %e, "reconnect failed");
                        if !e.is_retryable() || attempt >= self.config.retry.max_retries {
                            self.counters.errors.fetch_add(1, Ordering::Relaxed);
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }
}

// =====
// Service seam
// =====

/// Attribute access abstracted from the concrete client.
///
/// Code built on top of the client takes this instead of [`UaClient`] so it
/// can be exercised against a double.
#[async_trait]
pub trait AttributeService: Send + Sync {
    /// Reads the Value attribute of each node, in request order.
    async fn read_values(&self, node_ids: &[NodeId]) -> ClientResult<Vec<TypedValue>>;

    /// Writes the Value attribute of each node, one status per write.
    async fn write_values(&self, writes: &[(NodeId, Variant)]) -> ClientResult<Vec<StatusCode>>;
}

#[async_trait]
impl AttributeService for UaClient {
    async fn read_values(&self, node_ids: &[NodeId]) -> ClientResult<Vec<TypedValue>> {
        self.read(node_ids).await
    }

    async fn write_values(&self, writes: &[(NodeId, Variant)]) -> ClientResult<Vec<StatusCode>> {
        self.write(writes).await
    }
}

// =====
// Connect pipeline
// =====

async fn establish(config: &ClientConfig) -> ClientResult<Stack> {
    let limits = TransportLimits {
        receive_buffer_size: config.receive_buffer_size,
        send_buffer_size: config.send_buffer_size,
        max_message_size: config.max_message_size,
        max_chunk_count: config.max_chunk_count,
    };
    let transport =
        Transport::connect(&config.endpoint_url, limits, config.connect_timeout).await?;

    let channel = Arc::new(SecureChannel::new(transport.clone(), config));
    if let Err(e) = channel.open().await {
        transport.shutdown().await;
        return Err(e);
    }

    let session = Arc::new(Session::new(Arc::clone(&channel), config));
    if let Err(e) = session.open().await {
        if let Err(close) = channel.close().await {
            warn!(error = %close, "channel close failed");
        }
        transport.shutdown().await;
        return Err(e);
    }

    let engine = SubscriptionEngine::new(
        Arc::clone(&session),
        config.subscription.clone(),
        config.monitored_item.clone(),
        config.request_timeout,
    );

    Ok(Stack {
        transport,
        channel,
        session,
        engine,
    })
}

// =====
// Service bodies
// =====

async fn read_values(session: &Session, node_ids: Vec<NodeId>) -> ClientResult<Vec<DataValue>> {
    let expected = node_ids.len();
    let response: ReadResponse = session
        .call(|header| ReadRequest {
            header,
            max_age: 0.0,
            timestamps_to_return: TIMESTAMPS_BOTH,
            nodes_to_read: node_ids.into_iter().map(ReadValueId::value_of).collect(),
        })
        .await?;
    if response.results.len() != expected {
        return Err(ServiceError::ResultCountMismatch {
            service: "Read",
            expected,
            actual: response.results.len(),
        }
        .into());
    }
    Ok(response.results)
}

async fn write_values(
    session: &Session,
    writes: Vec<(NodeId, Variant)>,
) -> ClientResult<Vec<StatusCode>> {
    let expected = writes.len();
    let response: WriteResponse = session
        .call(|header| WriteRequest {
            header,
            nodes_to_write: writes
                .into_iter()
                .map(|(node_id, value)| WriteValue::value_of(node_id, DataValue::new(value)))
                .collect(),
        })
        .await?;
    if response.results.len() != expected {
        return Err(ServiceError::ResultCountMismatch {
            service: "Write",
            expected,
            actual: response.results.len(),
        }
        .into());
    }
    Ok(response.results)
}

async fn browse_node(
    session: &Session,
    node_id: NodeId,
) -> ClientResult<Vec<ReferenceDescription>> {
    let response: BrowseResponse = session
        .call(|header| BrowseRequest {
            header,
            requested_max_references: 0,
            nodes_to_browse: vec![BrowseDescription::hierarchical(node_id.clone())],
        })
        .await?;
    let Some(result) = response.results.into_iter().next() else {
        return Err(ServiceError::ResultCountMismatch {
            service: "Browse",
            expected: 1,
            actual: 0,
        }
        .into());
    };
    if result.status.is_bad() {
        return Err(ClientError::bad_item_status(node_id, result.status));
    }
    // We never page; a leftover continuation point is handed back so the
    // server can free it.
    if let Some(continuation_point) = result.continuation_point {
        warn!(
            node_id = %node_id,
            returned = result.references.len(),
            "browse results truncated by the server"
        );
        let released: ClientResult<BrowseNextResponse> = session
            .call(|header| BrowseNextRequest {
                header,
                release_continuation_points: true,
                continuation_points: vec![continuation_point],
            })
            .await;
        if let Err(e) = released {
            warn!(error = %e, "releasing browse continuation point failed");
        }
    }
    Ok(result.references)
}

// =====
// Tests
// =====
