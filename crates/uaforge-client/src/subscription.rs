// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription engine: server-side subscriptions, monitored items, and the
//! publish pump.
//!
//! One background task keeps a Publish request outstanding against the
//! server. Each notification message is acknowledged on the next Publish,
//! sequence-number gaps are recovered with Republish, and data changes are
//! fanned out to per-subscription channels handed to the caller as
//! [`SubscriptionHandle`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use uaforge_wire::{NodeId, StatusCode};

use crate::conversion::TypedValue;
use crate::error::{ClientError, ClientResult, ServiceError, SubscriptionError};
use crate::session::Session;
use crate::service::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DataChangeNotification, DeleteMonitoredItemsRequest,
    DeleteMonitoredItemsResponse, DeleteSubscriptionsRequest, DeleteSubscriptionsResponse,
    MonitoredItemCreateRequest, MonitoringParameters, NotificationMessage, PublishRequest,
    PublishResponse, ReadValueId, RepublishRequest, RepublishResponse,
    SubscriptionAcknowledgement, TIMESTAMPS_BOTH,
};
use crate::types::{MonitoredItemSettings, SubscriptionSettings};

/// Queue depth of each subscription's delivery channel.
const DELIVERY_QUEUE: usize = 256;

/// Pump sleep while no subscriptions exist.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// One value change delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeEvent {
    /// The subscription that produced the change.
    pub subscription_id: u32,
    /// The monitored node.
    pub node_id: NodeId,
    /// The client handle the notification carried.
    pub client_handle: u32,
    /// The new value with quality and timestamps.
    pub value: TypedValue,
    /// Sequence number of the notification message.
    pub sequence_number: u32,
}

/// Receiving end of one subscription's data changes.
pub struct SubscriptionHandle {
    subscription_id: u32,
    receiver: mpsc::Receiver<DataChangeEvent>,
}

impl SubscriptionHandle {
    /// The server-assigned subscription id.
    pub fn id(&self) -> u32 {
        self.subscription_id
    }

    /// Waits for the next data change. `None` once the subscription is
    /// deleted or the engine stops.
    pub async fn recv(&mut self) -> Option<DataChangeEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<DataChangeEvent> {
        self.receiver.try_recv().ok()
    }
}

/// One monitored item inside a subscription record.
#[derive(Debug, Clone, PartialEq)]
struct MonitoredItem {
    node_id: NodeId,
    monitored_item_id: u32,
}

struct SubscriptionRecord {
    revised_interval: Duration,
    /// Keyed by client handle, which is what notifications carry.
    items: HashMap<u32, MonitoredItem>,
    last_sequence: u32,
    sender: mpsc::Sender<DataChangeEvent>,
}

/// Counters for the engine.
#[derive(Debug, Default)]
struct EngineCounters {
    notifications: AtomicU64,
    data_changes: AtomicU64,
    keep_alives: AtomicU64,
    republishes: AtomicU64,
    publish_errors: AtomicU64,
}

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionStats {
    /// Notification messages processed.
    pub notifications: u64,
    /// Individual data changes delivered.
    pub data_changes: u64,
    /// Keep-alive messages observed.
    pub keep_alives: u64,
    /// Messages recovered with Republish.
    pub republishes: u64,
    /// Publish calls that failed.
    pub publish_errors: u64,
}

/// The subscription engine for one session.
pub struct SubscriptionEngine {
    session: Arc<Session>,
    defaults: SubscriptionSettings,
    item_defaults: MonitoredItemSettings,
    request_timeout: Duration,
    subscriptions: Mutex<HashMap<u32, SubscriptionRecord>>,
    acks: Mutex<Vec<SubscriptionAcknowledgement>>,
    client_handle: AtomicU32,
    running: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
    counters: EngineCounters,
}

impl SubscriptionEngine {
    /// Creates an engine bound to `session`.
    pub fn new(
        session: Arc<Session>,
        defaults: SubscriptionSettings,
        item_defaults: MonitoredItemSettings,
        request_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            defaults,
            item_defaults,
            request_timeout,
            subscriptions: Mutex::new(HashMap::new()),
            acks: Mutex::new(Vec::new()),
            client_handle: AtomicU32::new(0),
            running: AtomicBool::new(false),
            pump: Mutex::new(None),
            counters: EngineCounters::default(),
        })
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            notifications: self.counters.notifications.load(Ordering::Relaxed),
            data_changes: self.counters.data_changes.load(Ordering::Relaxed),
            keep_alives: self.counters.keep_alives.load(Ordering::Relaxed),
            republishes: self.counters.republishes.load(Ordering::Relaxed),
            publish_errors: self.counters.publish_errors.load(Ordering::Relaxed),
        }
    }

    /// Creates a subscription monitoring the Value attribute of `node_ids`
    /// and starts the publish pump if it is not running.
    pub async fn subscribe(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        settings: Option<SubscriptionSettings>,
    ) -> ClientResult<SubscriptionHandle> {
        let settings = settings.unwrap_or_else(|| self.defaults.clone());
        settings
            .validate()
            .map_err(|reason| SubscriptionError::InvalidSettings { reason })?;
        if node_ids.is_empty() {
            return Err(SubscriptionError::InvalidSettings {
                reason: "at least one node id is required".into(),
            }
            .into());
        }

        let created: CreateSubscriptionResponse = self
            .session
            .call(|header| CreateSubscriptionRequest {
                header,
                requested_publishing_interval: settings.publishing_interval.as_millis() as f64,
                requested_lifetime_count: settings.lifetime_count,
                requested_max_keep_alive_count: settings.keepalive_count,
                max_notifications_per_publish: settings.max_notifications_per_publish,
                publishing_enabled: settings.publishing_enabled,
                priority: settings.priority,
            })
            .await
            .map_err(|e| match e {
                ClientError::Service(ServiceError::Fault { status, .. }) => {
                    SubscriptionError::CreateFailed { status }.into()
                }
                other => other,
            })?;
        let subscription_id = created.subscription_id;
        let revised_interval =
            Duration::from_millis(created.revised_publishing_interval.max(1.0) as u64);
        debug!(
            subscription_id,
            interval_ms = created.revised_publishing_interval,
            "subscription created"
        );

        let handles: Vec<u32> = node_ids
            .iter()
            .map(|_| self.client_handle.fetch_add(1, Ordering::SeqCst) + 1)
            .collect();
        let items_response: CreateMonitoredItemsResponse = self
            .session
            .call(|header| CreateMonitoredItemsRequest {
                header,
                subscription_id,
                timestamps_to_return: TIMESTAMPS_BOTH,
                items_to_create: node_ids
                    .iter()
                    .zip(&handles)
                    .map(|(node_id, &client_handle)| MonitoredItemCreateRequest {
                        item_to_monitor: ReadValueId::value_of(node_id.clone()),
                        monitoring_mode: self.item_defaults.monitoring_mode.value(),
                        requested_parameters: MonitoringParameters {
                            client_handle,
                            sampling_interval: self.item_defaults.sampling_interval.as_millis()
                                as f64,
                            queue_size: self.item_defaults.queue_size,
                            discard_oldest: self.item_defaults.discard_oldest,
                        },
                    })
                    .collect(),
            })
            .await?;
        if items_response.results.len() != node_ids.len() {
            return Err(ServiceError::ResultCountMismatch {
                service: "CreateMonitoredItems",
                expected: node_ids.len(),
                actual: items_response.results.len(),
            }
            .into());
        }
        for (node_id, result) in node_ids.iter().zip(&items_response.results) {
            if result.status.is_bad() {
                // Roll the whole subscription back rather than keep a
                // partial item set.
                let _ = self.delete_on_server(subscription_id).await;
                return Err(SubscriptionError::MonitoredItemFailed {
                    node_id: node_id.clone(),
                    status: result.status,
                }
                .into());
            }
        }

        let (sender, receiver) = mpsc::channel(DELIVERY_QUEUE);
        let record = SubscriptionRecord {
            revised_interval,
            items: handles
                .iter()
                .zip(node_ids.iter().zip(&items_response.results))
                .map(|(&client_handle, (node_id, result))| {
                    (
                        client_handle,
                        MonitoredItem {
                            node_id: node_id.clone(),
                            monitored_item_id: result.monitored_item_id,
                        },
                    )
                })
                .collect(),
            last_sequence: 0,
            sender,
        };
        if let Ok(mut map) = self.subscriptions.lock() {
            map.insert(subscription_id, record);
        }
        info!(
            subscription_id,
            items = node_ids.len(),
            "monitoring {} node(s)",
            node_ids.len()
        );
        self.start_pump();
        Ok(SubscriptionHandle {
            subscription_id,
            receiver,
        })
    }

    /// Deletes a subscription on the server and stops delivering for it.
    pub async fn unsubscribe(&self, subscription_id: u32) -> ClientResult<()> {
        let removed = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|mut map| map.remove(&subscription_id));
        if removed.is_none() {
            return Err(SubscriptionError::NotFound {
                id: subscription_id,
            }
            .into());
        }
        self.delete_on_server(subscription_id).await
    }

    /// Stops monitoring specific nodes without deleting the subscription.
    pub async fn remove_items(
        &self,
        subscription_id: u32,
        node_ids: &[NodeId],
    ) -> ClientResult<()> {
        let targets: Vec<(u32, u32)> = {
            let map = self
                .subscriptions
                .lock()
                .map_err(|_| ClientError::connection_lost("subscription state poisoned"))?;
            let record = map.get(&subscription_id).ok_or(SubscriptionError::NotFound {
                id: subscription_id,
            })?;
            record
                .items
                .iter()
                .filter(|(_, item)| node_ids.contains(&item.node_id))
                .map(|(&client_handle, item)| (client_handle, item.monitored_item_id))
                .collect()
        };
        if targets.is_empty() {
            return Ok(());
        }

        let response: DeleteMonitoredItemsResponse = self
            .session
            .call(|header| DeleteMonitoredItemsRequest {
                header,
                subscription_id,
                monitored_item_ids: targets.iter().map(|&(_, id)| id).collect(),
            })
            .await?;
        for (&(client_handle, _), status) in targets.iter().zip(&response.results) {
            if status.is_bad() && *status != StatusCode::BAD_MONITORED_ITEM_ID_INVALID {
                warn!(subscription_id, client_handle, %status, "delete monitored item failed");
                continue;
            }
            if let Ok(mut map) = self.subscriptions.lock() {
                if let Some(record) = map.get_mut(&subscription_id) {
                    record.items.remove(&client_handle);
                }
            }
        }
        Ok(())
    }

    async fn delete_on_server(&self, subscription_id: u32) -> ClientResult<()> {
        let response: DeleteSubscriptionsResponse = self
            .session
            .call(|header| DeleteSubscriptionsRequest {
                header,
                subscription_ids: vec![subscription_id],
            })
            .await?;
        if let Some(status) = response.results.first() {
            if status.is_bad() && *status != StatusCode::BAD_SUBSCRIPTION_ID_INVALID {
                return Err(ClientError::service_fault("DeleteSubscriptions", *status));
            }
        }
        debug!(subscription_id, "subscription deleted");
        Ok(())
    }

    /// Stops the publish pump and drops all local records. Server-side
    /// subscriptions are left to CloseSession's delete flag.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.lock().ok().and_then(|mut slot| slot.take()) {
            handle.abort();
        }
        if let Ok(mut map) = self.subscriptions.lock() {
            map.clear();
        }
    }

    fn start_pump(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.pump_loop().await;
        });
        if let Ok(mut slot) = self.pump.lock() {
            *slot = Some(handle);
        }
    }

    /// The Publish timeout: the server may hold the request for a full
    /// keep-alive period before answering, so the slowest live
    /// subscription's revised interval sets the bound.
    fn publish_timeout(&self) -> Duration {
        let interval = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|map| map.values().map(|r| r.revised_interval).max())
            .unwrap_or(self.defaults.publishing_interval);
        self.request_timeout + interval.saturating_mul(self.defaults.keepalive_count.max(1))
    }

    async fn pump_loop(self: Arc<Self>) {
        debug!("publish pump started");
        let mut backoff = Duration::from_millis(50);
        while self.running.load(Ordering::SeqCst) {
            if self.subscription_count() == 0 {
                tokio::time::sleep(IDLE_SLEEP).await;
                continue;
            }
            let acks = self
                .acks
                .lock()
                .map(|mut pending| std::mem::take(&mut *pending))
                .unwrap_or_default();
            let result: ClientResult<PublishResponse> = self
                .session
                .call_with_timeout(self.publish_timeout(), |header| PublishRequest {
                    header,
                    subscription_acknowledgements: acks.clone(),
                })
                .await;
            match result {
                Ok(response) => {
                    backoff = Duration::from_millis(50);
                    self.handle_publish(response).await;
                }
                Err(e) => {
                    // The server never saw these; requeue ahead of anything
                    // that arrived in the meantime.
                    if let Ok(mut pending) = self.acks.lock() {
                        requeue_acks(&mut pending, acks);
                    }
                    self.counters.publish_errors.fetch_add(1, Ordering::Relaxed);
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!(error = %e, "publish failed");
                    if !e.is_retryable() {
                        break;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                }
            }
        }
        debug!("publish pump stopped");
    }

    async fn handle_publish(&self, response: PublishResponse) {
        let subscription_id = response.subscription_id;
        let message = response.notification_message;

        if message.is_keep_alive() {
            trace!(subscription_id, "keep-alive");
            self.counters.keep_alives.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let last = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|map| map.get(&subscription_id).map(|r| r.last_sequence));
        let Some(last) = last else {
            trace!(subscription_id, "notification for unknown subscription");
            return;
        };

        // Recover anything the server still holds between the last seen
        // sequence number and this one.
        let expected = last.wrapping_add(1);
        if last != 0 && message.sequence_number > expected {
            for missed in expected..message.sequence_number {
                self.republish(subscription_id, missed).await;
            }
        }
        self.deliver(subscription_id, &message).await;
    }

    async fn republish(&self, subscription_id: u32, sequence_number: u32) {
        let result: ClientResult<RepublishResponse> = self
            .session
            .call(|header| RepublishRequest {
                header,
                subscription_id,
                retransmit_sequence_number: sequence_number,
            })
            .await;
        match result {
            Ok(response) => {
                self.counters.republishes.fetch_add(1, Ordering::Relaxed);
                debug!(subscription_id, sequence_number, "republished");
                self.deliver(subscription_id, &response.notification_message)
                    .await;
            }
            Err(e) => {
                // The server may have already dropped the message.
                warn!(subscription_id, sequence_number, error = %e, "republish failed");
            }
        }
    }

    async fn deliver(&self, subscription_id: u32, message: &NotificationMessage) {
        let (sender, items) = {
            let Ok(mut map) = self.subscriptions.lock() else {
                return;
            };
            let Some(record) = map.get_mut(&subscription_id) else {
                return;
            };
            if message.sequence_number <= record.last_sequence && record.last_sequence != 0 {
                trace!(
                    subscription_id,
                    sequence = message.sequence_number,
                    "duplicate notification ignored"
                );
                return;
            }
            record.last_sequence = message.sequence_number;
            (record.sender.clone(), record.items.clone())
        };

        self.counters.notifications.fetch_add(1, Ordering::Relaxed);
        let mut delivered = 0u64;
        for object in &message.notification_data {
            let notification = match DataChangeNotification::from_extension_object(object) {
                Ok(Some(notification)) => notification,
                Ok(None) => continue, // event or status-change notification
                Err(e) => {
                    warn!(subscription_id, error = %e, "undecodable notification");
                    continue;
                }
            };
            delivered += route_changes(
                subscription_id,
                message.sequence_number,
                &items,
                notification,
                &sender,
            );
        }
        self.counters
            .data_changes
            .fetch_add(delivered, Ordering::Relaxed);

        if let Ok(mut acks) = self.acks.lock() {
            acks.push(SubscriptionAcknowledgement {
                subscription_id,
                sequence_number: message.sequence_number,
            });
        }
    }
}

/// Maps monitored item notifications to their node ids and queues them on
/// the subscription's channel. Returns the number delivered.
/// Puts acknowledgements a failed Publish never delivered back at the front
/// of the pending queue, keeping sequence order.
fn requeue_acks(
    pending: &mut Vec<SubscriptionAcknowledgement>,
    unacked: Vec<SubscriptionAcknowledgement>,
) {
    if unacked.is_empty() {
        return;
    }
    let queued = std::mem::take(pending);
    *pending = unacked;
    pending.extend(queued);
}

fn route_changes(
    subscription_id: u32,
    sequence_number: u32,
    items: &HashMap<u32, MonitoredItem>,
    notification: DataChangeNotification,
    sender: &mpsc::Sender<DataChangeEvent>,
) -> u64 {
    let mut delivered = 0;
    for item in notification.monitored_items {
        let Some(node_id) = items.get(&item.client_handle).map(|i| &i.node_id) else {
            trace!(
                subscription_id,
                client_handle = item.client_handle,
                "notification for unknown client handle"
            );
            continue;
        };
        let change = DataChangeEvent {
            subscription_id,
            node_id: node_id.clone(),
            client_handle: item.client_handle,
            value: TypedValue::from_data_value(item.value),
            sequence_number,
        };
        match sender.try_send(change) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscription_id, "delivery queue full, data change dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!(subscription_id, "subscription handle dropped");
                return delivered;
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MonitoredItemNotification;
    use uaforge_wire::{DataValue, Variant};

    fn item(node_id: NodeId, monitored_item_id: u32) -> MonitoredItem {
        MonitoredItem {
            node_id,
            monitored_item_id,
        }
    }

    fn notification(changes: Vec<(u32, Variant)>) -> DataChangeNotification {
        DataChangeNotification {
            monitored_items: changes
                .into_iter()
                .map(|(client_handle, value)| MonitoredItemNotification {
                    client_handle,
                    value: DataValue::new(value),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_route_changes_maps_handles_to_nodes() {
        let mut items = HashMap::new();
        items.insert(1, item(NodeId::string(2, "Temperature"), 11));
        items.insert(2, item(NodeId::string(2, "Pressure"), 12));
        let (sender, mut receiver) = mpsc::channel(8);

        let delivered = route_changes(
            7,
            41,
            &items,
            notification(vec![
                (1, Variant::Double(21.5)),
                (2, Variant::Double(1.02)),
                (99, Variant::Boolean(true)), // unknown handle
            ]),
            &sender,
        );
        assert_eq!(delivered, 2);

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.subscription_id, 7);
        assert_eq!(first.node_id, NodeId::string(2, "Temperature"));
        assert_eq!(first.value.value, Variant::Double(21.5));
        assert!(first.value.quality.is_good());
        assert_eq!(first.client_handle, 1);
        assert_eq!(first.sequence_number, 41);

        let second = receiver.try_recv().unwrap();
        assert_eq!(second.node_id, NodeId::string(2, "Pressure"));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_route_changes_stops_on_closed_receiver() {
        let mut items = HashMap::new();
        items.insert(1, item(NodeId::string(2, "Flow"), 13));
        let (sender, receiver) = mpsc::channel(8);
        drop(receiver);

        let delivered = route_changes(
            3,
            1,
            &items,
            notification(vec![(1, Variant::Int32(5))]),
            &sender,
        );
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_route_changes_drops_when_queue_full() {
        let mut items = HashMap::new();
        items.insert(1, item(NodeId::string(2, "Level"), 14));
        let (sender, mut receiver) = mpsc::channel(1);

        let delivered = route_changes(
            4,
            1,
            &items,
            notification(vec![(1, Variant::Int32(1)), (1, Variant::Int32(2))]),
            &sender,
        );
        // Second change overflows the single-slot queue.
        assert_eq!(delivered, 1);
        assert_eq!(
            receiver.try_recv().unwrap().value.value,
            Variant::Int32(1)
        );
    }

    #[test]
    fn test_stats_default() {
        let stats = SubscriptionStats::default();
        assert_eq!(stats.notifications, 0);
        assert_eq!(stats.publish_errors, 0);
    }

    fn ack(sequence_number: u32) -> SubscriptionAcknowledgement {
        SubscriptionAcknowledgement {
            subscription_id: 1,
            sequence_number,
        }
    }

    #[test]
    fn test_requeue_acks_preserves_order() {
        // Acks from a failed Publish go back ahead of newly queued ones.
        let mut pending = vec![ack(3), ack(4)];
        requeue_acks(&mut pending, vec![ack(1), ack(2)]);
        assert_eq!(pending, vec![ack(1), ack(2), ack(3), ack(4)]);

        let mut pending = vec![ack(5)];
        requeue_acks(&mut pending, Vec::new());
        assert_eq!(pending, vec![ack(5)]);
    }
}
