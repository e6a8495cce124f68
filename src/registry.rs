//! Process-local mapping from user id to a live connection handle, guarded
//! by a single mutex. The mutex must never be held across an `.await`
//! point (a Store or PubSub call) — see SPEC_FULL.md §5 — so this uses
//! `std::sync::Mutex`, not `tokio::sync::Mutex`, and every critical
//! section below is synchronous.

use std::collections::HashMap;
use std::sync::Mutex;

use warp::ws::Message;

use crate::database::UserId;

/// The sending half of the per-connection outbound queue. Cheap to clone;
/// cloning does not copy the queue, only a reference to it.
pub type Connection = tokio::sync::mpsc::UnboundedSender<Result<Message, warp::Error>>;

#[derive(Default)]
pub struct ConnRegistry {
    conns: Mutex<HashMap<UserId, Connection>>,
}

impl ConnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, userid: UserId, conn: Connection) {
        self.conns.lock().unwrap().insert(userid, conn);
    }

    pub fn unbind(&self, userid: UserId) {
        self.conns.lock().unwrap().remove(&userid);
    }

    /// Finds and removes the entry whose connection is `conn`, identified
    /// by channel identity (not by payload equality). Used on disconnect,
    /// where the caller does not necessarily know which user was bound to
    /// the connection that just closed.
    pub fn unbind_by_conn(&self, conn: &Connection) -> Option<UserId> {
        let mut guard = self.conns.lock().unwrap();
        let userid = guard
            .iter()
            .find(|(_, c)| c.same_channel(conn))
            .map(|(id, _)| *id);
        if let Some(id) = userid {
            guard.remove(&id);
        }
        userid
    }

    pub fn lookup(&self, userid: UserId) -> Option<Connection> {
        self.conns.lock().unwrap().get(&userid).cloned()
    }

    /// Sends `payload` to every present recipient in `userids`, taking the
    /// lock exactly once. Returns the subset that was NOT present, for the
    /// caller to apply the cross-node-publish-or-offline-insert fallback
    /// after releasing the lock.
    pub fn for_each_send(&self, userids: &[UserId], payload: &str) -> Vec<UserId> {
        let guard = self.conns.lock().unwrap();
        let mut missing = Vec::new();
        for &id in userids {
            match guard.get(&id) {
                Some(conn) => {
                    let _ = conn.send(Ok(Message::text(payload)));
                }
                None => missing.push(id),
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> (Connection, tokio::sync::mpsc::UnboundedReceiver<Result<Message, warp::Error>>) {
        tokio::sync::mpsc::unbounded_channel()
    }

    #[test]
    fn bind_then_lookup_finds_connection() {
        let registry = ConnRegistry::new();
        let (tx, _rx) = conn();
        registry.bind(1, tx);
        assert!(registry.lookup(1).is_some());
        assert!(registry.lookup(2).is_none());
    }

    #[test]
    fn unbind_removes_entry() {
        let registry = ConnRegistry::new();
        let (tx, _rx) = conn();
        registry.bind(1, tx);
        registry.unbind(1);
        assert!(registry.lookup(1).is_none());
    }

    #[test]
    fn unbind_by_conn_finds_owner_by_identity() {
        let registry = ConnRegistry::new();
        let (tx, _rx) = conn();
        registry.bind(7, tx.clone());
        assert_eq!(registry.unbind_by_conn(&tx), Some(7));
        assert!(registry.lookup(7).is_none());
    }

    #[test]
    fn unbind_by_conn_ignores_unknown_connection() {
        let registry = ConnRegistry::new();
        let (tx, _rx) = conn();
        let (other, _rx2) = conn();
        registry.bind(1, tx);
        assert_eq!(registry.unbind_by_conn(&other), None);
    }

    #[tokio::test]
    async fn for_each_send_returns_only_missing_recipients() {
        let registry = ConnRegistry::new();
        let (tx, mut rx) = conn();
        registry.bind(1, tx);

        let missing = registry.for_each_send(&[1, 2, 3], "hello");
        assert_eq!(missing, vec![2, 3]);

        let received = rx.recv().await.unwrap().unwrap();
        assert_eq!(received.to_str().unwrap(), "hello");
    }
}
