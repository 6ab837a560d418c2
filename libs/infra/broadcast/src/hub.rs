// [libs/infra/broadcast/src/hub.rs]
//! Fan-out point between the state aggregator / alert engine and every
//! connected WebSocket client.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::frame::Frame;
use crate::queue::{ClientQueue, DEFAULT_CAPACITY};

#[derive(Clone, Default)]
pub struct BroadcastHub {
    clients: Arc<RwLock<HashMap<Uuid, Arc<ClientQueue>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (Uuid, Arc<ClientQueue>) {
        let client_id = Uuid::new_v4();
        let queue = Arc::new(ClientQueue::new(DEFAULT_CAPACITY));
        self.clients.write().expect("broadcast hub lock poisoned").insert(client_id, queue.clone());
        debug!(%client_id, "client registered with broadcast hub");
        (client_id, queue)
    }

    pub fn unregister(&self, client_id: Uuid) {
        self.clients.write().expect("broadcast hub lock poisoned").remove(&client_id);
        debug!(%client_id, "client unregistered from broadcast hub");
    }

    /// Fans a frame out to every connected client's own bounded queue.
    /// Never blocks: a slow or stalled client only affects its own queue.
    pub fn publish(&self, frame: Frame) {
        let clients = self.clients.read().expect("broadcast hub lock poisoned");
        for queue in clients.values() {
            queue.push(frame.clone());
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().expect("broadcast hub lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fans_out_to_every_registered_client() {
        let hub = BroadcastHub::new();
        let (_, queue_a) = hub.register();
        let (_, queue_b) = hub.register();

        hub.publish(Frame::Ping);

        assert!(matches!(queue_a.next().await, Frame::Ping));
        assert!(matches!(queue_b.next().await, Frame::Ping));
    }

    #[test]
    fn unregister_removes_client_from_fan_out() {
        let hub = BroadcastHub::new();
        let (client_id, _) = hub.register();
        assert_eq!(hub.client_count(), 1);
        hub.unregister(client_id);
        assert_eq!(hub.client_count(), 0);
    }
}
