//! Session registry: channel -> subscriber routing for broadcast delivery.
//!
//! Channels exist implicitly while at least one connection is subscribed and
//! are dropped when the last subscriber leaves. Each connection owns an
//! outbound frame queue; broadcasting enqueues the serialized frame to every
//! subscriber in issue order (FIFO per channel per subscriber).

use crate::gateway::protocol::{OutboundMessage, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Unique id of a live connection.
pub type ConnectionId = Uuid;

/// Outbound frame queue of one connection; drained by its socket task.
pub type FrameSender = mpsc::UnboundedSender<String>;

/// Registry of channel subscribers. The only shared mutable state in the relay.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, HashMap<ConnectionId, FrameSender>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a channel's subscriber set. Idempotent: subscribing
    /// twice has no additional effect.
    pub async fn subscribe(&self, channel_id: &str, connection_id: ConnectionId, tx: FrameSender) {
        let mut g = self.inner.write().await;
        g.entry(channel_id.to_string())
            .or_default()
            .insert(connection_id, tx);
    }

    /// Remove a connection from every channel (invoked on disconnect).
    /// Channels left with no subscribers are dropped.
    pub async fn unsubscribe_all(&self, connection_id: ConnectionId) {
        let mut g = self.inner.write().await;
        g.retain(|_, subs| {
            subs.remove(&connection_id);
            !subs.is_empty()
        });
    }

    /// Deliver a message to every current subscriber of the channel, in the
    /// order broadcasts are issued. A channel with zero subscribers is not an
    /// error; the message is simply unobserved. Returns the delivery count.
    pub async fn broadcast(&self, channel_id: &str, message: &OutboundMessage) -> usize {
        let frame = ServerEvent::NewMessage(message.clone()).to_frame();
        let g = self.inner.read().await;
        let Some(subs) = g.get(channel_id) else {
            return 0;
        };
        let mut delivered = 0;
        for tx in subs.values() {
            // A closed queue means the socket task is gone; cleanup happens on disconnect.
            if tx.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Ids of channels that currently have subscribers.
    pub async fn channel_ids(&self) -> Vec<String> {
        let g = self.inner.read().await;
        g.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (ConnectionId, FrameSender, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    #[tokio::test]
    async fn double_subscribe_delivers_one_copy() {
        let registry = ChannelRegistry::new();
        let (id, tx, mut rx) = connection();
        registry.subscribe("c1", id, tx.clone()).await;
        registry.subscribe("c1", id, tx).await;

        let delivered = registry
            .broadcast("c1", &OutboundMessage::user_echo("c1", "hello"))
            .await;
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_all_stops_delivery_and_drops_empty_channels() {
        let registry = ChannelRegistry::new();
        let (id, tx, mut rx) = connection();
        registry.subscribe("c1", id, tx.clone()).await;
        registry.subscribe("c2", id, tx).await;

        registry.unsubscribe_all(id).await;
        assert!(registry.channel_ids().await.is_empty());

        let delivered = registry
            .broadcast("c1", &OutboundMessage::user_echo("c1", "anyone?"))
            .await;
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_unknown_channel_is_silently_dropped() {
        let registry = ChannelRegistry::new();
        let delivered = registry
            .broadcast("nobody-home", &OutboundMessage::user_echo("nobody-home", "hi"))
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn broadcasts_arrive_in_issue_order() {
        let registry = ChannelRegistry::new();
        let (id, tx, mut rx) = connection();
        registry.subscribe("c1", id, tx).await;

        registry
            .broadcast("c1", &OutboundMessage::user_echo("c1", "first"))
            .await;
        registry
            .broadcast("c1", &OutboundMessage::user_echo("c1", "second"))
            .await;

        let first = rx.try_recv().expect("first frame");
        let second = rx.try_recv().expect("second frame");
        assert!(first.contains("first"));
        assert!(second.contains("second"));
    }

    #[tokio::test]
    async fn broadcast_is_scoped_to_the_channel() {
        let registry = ChannelRegistry::new();
        let (id_a, tx_a, mut rx_a) = connection();
        let (id_b, tx_b, mut rx_b) = connection();
        registry.subscribe("c1", id_a, tx_a).await;
        registry.subscribe("c2", id_b, tx_b).await;

        registry
            .broadcast("c1", &OutboundMessage::user_echo("c1", "only c1"))
            .await;
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
