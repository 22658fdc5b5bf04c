//! Live connection pools.
//!
//! Users and workers live in two independent maps. A user id may hold several
//! connections (tabs); a result is pushed to all of them. Each connection owns
//! an unbounded outbound channel drained by its socket writer, so a send here
//! never waits on the network.

use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone)]
pub struct UserConnection {
    pub connection_id: String,
    pub user_id: String,
    pub name: String,
    pub is_guest: bool,
    pub sender: Outbound,
}

#[derive(Debug, Clone)]
pub struct WorkerConnection {
    pub worker_id: String,
    pub sender: Outbound,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: RwLock<HashMap<String, Vec<UserConnection>>>,
    workers: RwLock<HashMap<String, WorkerConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, connection: UserConnection) {
        self.users
            .write()
            .await
            .entry(connection.user_id.clone())
            .or_default()
            .push(connection);
    }

    /// Drop one connection; the user entry goes when its last connection does
    pub async fn remove_user(&self, user_id: &str, connection_id: &str) -> Option<UserConnection> {
        let mut users = self.users.write().await;
        let connections = users.get_mut(user_id)?;
        let index = connections
            .iter()
            .position(|c| c.connection_id == connection_id)?;
        let removed = connections.swap_remove(index);
        if connections.is_empty() {
            users.remove(user_id);
        }
        Some(removed)
    }

    pub async fn add_worker(&self, connection: WorkerConnection) {
        self.workers
            .write()
            .await
            .insert(connection.worker_id.clone(), connection);
    }

    pub async fn remove_worker(&self, worker_id: &str) -> Option<WorkerConnection> {
        self.workers.write().await.remove(worker_id)
    }

    pub async fn send_to_worker(&self, worker_id: &str, frame: &str) -> bool {
        self.workers
            .read()
            .await
            .get(worker_id)
            .map(|w| w.sender.send(frame.to_string()).is_ok())
            .unwrap_or(false)
    }

    /// Queue `frame` on every live connection of `user_id`. Returns how many
    /// connections took it; zero when the user is not connected.
    pub async fn send_to_user(&self, user_id: &str, frame: &str) -> usize {
        let users = self.users.read().await;
        users
            .get(user_id)
            .map(|connections| {
                connections
                    .iter()
                    .filter(|c| c.sender.send(frame.to_string()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    pub async fn user_connection_count(&self) -> usize {
        self.users.read().await.values().map(Vec::len).sum()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn guest_connection_count(&self) -> usize {
        self.users
            .read()
            .await
            .values()
            .flatten()
            .filter(|c| c.is_guest)
            .count()
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_id: &str, connection_id: &str) -> (UserConnection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            UserConnection {
                connection_id: connection_id.into(),
                user_id: user_id.into(),
                name: "Ada".into(),
                is_guest: false,
                sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_send_to_unknown_user_is_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.send_to_user("nobody", "{}").await, 0);
    }

    #[tokio::test]
    async fn test_send_reaches_every_connection_of_user() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = user("u1", "c1");
        let (b, mut rx_b) = user("u1", "c2");
        let (other, mut rx_other) = user("u2", "c3");
        registry.add_user(a).await;
        registry.add_user(b).await;
        registry.add_user(other).await;

        assert_eq!(registry.send_to_user("u1", "hello").await, 2);
        assert_eq!(rx_a.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx_b.recv().await.as_deref(), Some("hello"));
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removed_connection_gets_nothing() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = user("u1", "c1");
        let (b, mut rx_b) = user("u1", "c2");
        registry.add_user(a).await;
        registry.add_user(b).await;

        let removed = registry.remove_user("u1", "c1").await.unwrap();
        assert_eq!(removed.name, "Ada");
        assert!(registry.remove_user("u1", "c1").await.is_none());
        assert_eq!(registry.send_to_user("u1", "x").await, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.recv().await.as_deref(), Some("x"));

        registry.remove_user("u1", "c2").await;
        assert_eq!(registry.user_count().await, 0);
        assert_eq!(registry.send_to_user("u1", "x").await, 0);
    }

    #[tokio::test]
    async fn test_pools_are_independent() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .add_worker(WorkerConnection {
                worker_id: "w1".into(),
                sender: tx,
            })
            .await;

        assert_eq!(registry.worker_count().await, 1);
        assert_eq!(registry.user_connection_count().await, 0);
        assert_eq!(registry.send_to_user("w1", "x").await, 0);
        assert!(registry.send_to_worker("w1", "y").await);
        assert_eq!(rx.recv().await.as_deref(), Some("y"));

        assert!(registry.remove_worker("w1").await.is_some());
        assert_eq!(registry.worker_count().await, 0);
        assert!(!registry.send_to_worker("w1", "y").await);
    }
}
