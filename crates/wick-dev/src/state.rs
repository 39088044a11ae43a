//! Shared coordinator state: output validity and connected clients.
//!
//! The client registry is owned exclusively by this type. Connections
//! are added only when an HMR handshake upgrades, and removed when a
//! client disconnects or a broadcast to it fails.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch};

/// Per-client channel capacity. A client that falls this far behind is
/// dropped on the next broadcast.
const CLIENT_BUFFER: usize = 64;

pub struct DevState {
    valid_tx: watch::Sender<bool>,
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    next_client_id: AtomicUsize,
}

impl DevState {
    /// New state; output starts out stale until the first build lands.
    pub fn new() -> Self {
        let (valid_tx, _) = watch::channel(false);
        Self {
            valid_tx,
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicUsize::new(0),
        }
    }

    /// Mark the build output stale.
    pub fn mark_invalid(&self) {
        self.valid_tx.send_replace(false);
    }

    /// Mark the build output valid.
    pub fn mark_valid(&self) {
        self.valid_tx.send_replace(true);
    }

    pub fn is_valid(&self) -> bool {
        *self.valid_tx.borrow()
    }

    /// Resolve once the output is valid. Callers await; nobody polls.
    pub async fn wait_valid(&self) {
        let mut rx = self.valid_tx.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|valid| *valid).await;
    }

    /// Register a new hot-reload client.
    ///
    /// Returns the client id and the receiving end of its message
    /// queue.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        tracing::debug!(client = id, "hot-reload client connected");
        (id, rx)
    }

    /// Remove a client; harmless when it is already gone.
    pub fn unregister_client(&self, id: usize) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "hot-reload client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Push a serialized message to every connected client.
    ///
    /// Best effort: no acks, no retries, no cross-client ordering.
    /// With zero clients this is a silent no-op. Clients whose queue is
    /// gone or full are pruned.
    pub fn broadcast(&self, payload: &str) {
        let clients: Vec<(usize, mpsc::Sender<String>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut stale = Vec::new();
        for (id, tx) in clients {
            if tx.try_send(payload.to_string()).is_err() {
                stale.push(id);
            }
        }
        for id in stale {
            self.unregister_client(id);
        }
    }
}

impl Default for DevState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn starts_stale() {
        let state = DevState::new();
        assert!(!state.is_valid());
        state.mark_valid();
        assert!(state.is_valid());
        state.mark_invalid();
        assert!(!state.is_valid());
    }

    #[tokio::test]
    async fn wait_valid_resolves_on_transition() {
        let state = Arc::new(DevState::new());

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait_valid().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        state.mark_valid();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter resolved")
            .unwrap();
    }

    #[tokio::test]
    async fn clients_get_distinct_ids() {
        let state = DevState::new();
        let (id1, _rx1) = state.register_client();
        let (id2, _rx2) = state.register_client();

        assert_ne!(id1, id2);
        assert_eq!(state.client_count(), 2);

        state.unregister_client(id1);
        state.unregister_client(id1);
        assert_eq!(state.client_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_clients() {
        let state = DevState::new();
        let (_id1, mut rx1) = state.register_client();
        let (_id2, mut rx2) = state.register_client();

        state.broadcast(r#"{"action":"reload"}"#);

        assert_eq!(rx1.recv().await.unwrap(), r#"{"action":"reload"}"#);
        assert_eq!(rx2.recv().await.unwrap(), r#"{"action":"reload"}"#);
    }

    #[tokio::test]
    async fn broadcast_with_no_clients_is_a_no_op() {
        let state = DevState::new();
        state.broadcast(r#"{"action":"errors"}"#);
        assert_eq!(state.client_count(), 0);
    }

    #[tokio::test]
    async fn dropped_clients_are_pruned_on_broadcast() {
        let state = DevState::new();
        let (_id1, rx1) = state.register_client();
        let (_id2, _rx2) = state.register_client();

        drop(rx1);
        state.broadcast(r#"{"action":"built"}"#);

        assert_eq!(state.client_count(), 1);
    }
}
