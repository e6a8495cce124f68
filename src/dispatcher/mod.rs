//! Decodes inbound frames, looks up a handler by `msgId`, and executes it.
//! Implements the full routing decision tree: local deliver, cross-node
//! publish, or persist as offline.

mod auth;
mod chat;
mod social;

use std::sync::Arc;

use log::{debug, warn};

use crate::database::ChatStore;
use crate::protocol::{msg_id, Envelope};
use crate::pubsub::Bus;
use crate::registry::{Connection, ConnRegistry};

/// Names used only for logging an unknown `msgId`; the actual dispatch is
/// the `match` in `Dispatcher::dispatch`, which is the static handler
/// table the design calls for.
const KNOWN_HANDLERS: &[(i64, &str)] = &[
    (msg_id::LOGIN, "LOGIN"),
    (msg_id::REG, "REG"),
    (msg_id::ONE_CHAT, "ONE_CHAT"),
    (msg_id::ADD_FRIEND, "ADD_FRIEND"),
    (msg_id::CREATE_GROUP, "CREATE_GROUP"),
    (msg_id::GROUP_CHAT, "GROUP_CHAT"),
    (msg_id::ADD_GROUP, "ADD_GROUP"),
    (msg_id::LOGOUT, "LOGOUT"),
];

pub struct Dispatcher {
    pub(crate) store: Arc<dyn ChatStore>,
    pub(crate) bus: Arc<dyn Bus>,
    pub(crate) registry: Arc<ConnRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ChatStore>, bus: Arc<dyn Bus>, registry: Arc<ConnRegistry>) -> Self {
        Dispatcher { store, bus, registry }
    }

    /// Entry point for every inbound WebSocket text frame.
    pub async fn dispatch(&self, raw: &str, conn: &Connection) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("dropping malformed frame: {e}");
                return;
            }
        };
        let envelope: Envelope = match serde_json::from_value(value.clone()) {
            Ok(e) => e,
            Err(_) => {
                warn!("dropping frame with no msgId");
                return;
            }
        };

        match envelope.msg_id {
            msg_id::LOGIN => auth::login(self, value, conn).await,
            msg_id::REG => auth::register(self, value, conn).await,
            msg_id::LOGOUT => auth::logout(self, value).await,
            msg_id::ONE_CHAT => chat::one_chat(self, value, raw).await,
            msg_id::GROUP_CHAT => chat::group_chat(self, value, raw).await,
            msg_id::ADD_FRIEND => social::add_friend(self, value).await,
            msg_id::CREATE_GROUP => social::create_group(self, value).await,
            msg_id::ADD_GROUP => social::add_group(self, value).await,
            other => {
                let name = KNOWN_HANDLERS
                    .iter()
                    .find(|(id, _)| *id == other)
                    .map(|(_, n)| *n)
                    .unwrap_or("UNKNOWN");
                warn!("msgId {other} ({name}) has no handler, dropping frame");
            }
        }
    }

    /// Delivered by the PubSubBus when a message arrives on a channel this
    /// node has subscribed to. If the target logged out between publish
    /// and delivery, the message is persisted as offline instead of lost.
    pub async fn handle_bus_message(&self, target: crate::database::UserId, payload: String) {
        match self.registry.lookup(target) {
            Some(conn) => {
                let _ = conn.send(Ok(warp::ws::Message::text(payload)));
            }
            None => {
                if let Err(e) = self.store.insert_offline(target, &payload).await {
                    warn!("failed to persist offline message for {target}: {e}");
                }
            }
        }
    }

    /// Runs the logout side effects for a connection the framework just
    /// reported as closed. The user never sent an explicit LOGOUT frame.
    pub async fn handle_disconnect(&self, conn: &Connection) {
        if let Some(userid) = self.registry.unbind_by_conn(conn) {
            debug!("connection for user {userid} closed, logging out");
            self.bus.unsubscribe(userid).await;
            if let Err(e) = self
                .store
                .update_user_state(userid, crate::database::UserState::Offline)
                .await
            {
                warn!("failed to mark user {userid} offline on disconnect: {e}");
            }
        }
    }
}


/// End-to-end scenarios from SPEC_FULL.md §8, run against two independent
/// `Dispatcher`s sharing a `FakeStore` and a `FakeBus` to model two server
/// instances behind the same database and message bus. Cross-node
/// delivery is modeled explicitly: a message `FakeBus::publish`ed on S1 is
/// handed to S2's `handle_bus_message`, since the fake bus itself does not
/// wire subscribers to publishers the way a real broker would.
#[cfg(test)]
mod scenarios {
    use super::tests::harness;
    use crate::database::{ChatStore, UserState};

    async fn recv_text(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Result<warp::ws::Message, warp::Error>>) -> String {
        rx.recv().await.unwrap().unwrap().to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let (store, _bus, _registry, dispatcher) = harness();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        dispatcher
            .dispatch(r#"{"msgId":3,"name":"alice","password":"pw"}"#, &tx)
            .await;
        let reg_ack: serde_json::Value = serde_json::from_str(&recv_text(&mut rx).await).unwrap();
        assert_eq!(reg_ack["errno"], 0);
        let id = reg_ack["id"].as_i64().unwrap();
        assert_eq!(store.query_user(id as i32).await.unwrap().unwrap().name, "alice");

        let login_frame = format!(r#"{{"msgId":1,"id":{id},"password":"pw"}}"#);
        dispatcher.dispatch(&login_frame, &tx).await;
        let login_ack: serde_json::Value = serde_json::from_str(&recv_text(&mut rx).await).unwrap();
        assert_eq!(login_ack["errno"], 0);
        assert_eq!(login_ack["id"], id);
    }

    #[tokio::test]
    async fn create_group_makes_creator_a_member() {
        let (store, _bus, _registry, dispatcher) = harness();
        store.insert_user("alice", "pw").await.unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        dispatcher
            .dispatch(r#"{"msgId":7,"id":1,"groupname":"friends","groupdesc":"desc"}"#, &tx)
            .await;

        let groups = store.query_groups_of_user(1).await.unwrap();
        assert_eq!(groups.len(), 1);
        let creator = groups[0].members.iter().find(|m| m.id == 1).unwrap();
        assert_eq!(creator.role, crate::database::Role::Creator);
    }

    /// Scenario 1: local delivery, both users on the same instance.
    #[tokio::test]
    async fn scenario_local_delivery() {
        let (store, _bus, _registry, s1) = harness();
        store.insert_user("alice", "pw").await.unwrap();
        store.insert_user("bob", "pw").await.unwrap();

        let (alice_tx, mut alice_rx) = tokio::sync::mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = tokio::sync::mpsc::unbounded_channel();
        s1.dispatch(r#"{"msgId":1,"id":1,"password":"pw"}"#, &alice_tx).await;
        let _ = recv_text(&mut alice_rx).await;
        s1.dispatch(r#"{"msgId":1,"id":2,"password":"pw"}"#, &bob_tx).await;
        let _ = recv_text(&mut bob_rx).await;

        s1.dispatch(
            r#"{"msgId":5,"id":1,"name":"alice","toid":2,"msg":"hi","time":"now"}"#,
            &alice_tx,
        )
        .await;

        let frame: serde_json::Value = serde_json::from_str(&recv_text(&mut bob_rx).await).unwrap();
        assert_eq!(frame["msgId"], 5);
        assert_eq!(frame["id"], 1);
        assert_eq!(frame["toid"], 2);
        assert_eq!(frame["msg"], "hi");
        assert!(store.query_offline(2).await.unwrap().is_empty());
    }

    /// Scenario 2: cross-node delivery, Alice on S1, Bob on S2.
    #[tokio::test]
    async fn scenario_cross_node_delivery() {
        let store = std::sync::Arc::new(crate::database::FakeStore::default());
        let bus = std::sync::Arc::new(crate::pubsub::FakeBus::new());
        let registry_s1 = std::sync::Arc::new(crate::registry::ConnRegistry::new());
        let registry_s2 = std::sync::Arc::new(crate::registry::ConnRegistry::new());
        let s1 = super::Dispatcher::new(store.clone(), bus.clone(), registry_s1);
        let s2 = super::Dispatcher::new(store.clone(), bus.clone(), registry_s2.clone());

        store.insert_user("alice", "pw").await.unwrap();
        store.insert_user("bob", "pw").await.unwrap();

        let (alice_tx, mut alice_rx) = tokio::sync::mpsc::unbounded_channel();
        s1.dispatch(r#"{"msgId":1,"id":1,"password":"pw"}"#, &alice_tx).await;
        let _ = recv_text(&mut alice_rx).await;

        let (bob_tx, mut bob_rx) = tokio::sync::mpsc::unbounded_channel();
        s2.dispatch(r#"{"msgId":1,"id":2,"password":"pw"}"#, &bob_tx).await;
        let _ = recv_text(&mut bob_rx).await;

        s1.dispatch(
            r#"{"msgId":5,"id":1,"name":"alice","toid":2,"msg":"hi","time":"now"}"#,
            &alice_tx,
        )
        .await;

        // S1 published since Bob is not in its own registry; S2 now
        // delivers from its side of the bus.
        let (channel, payload) = bus.published.lock().unwrap().first().cloned().unwrap();
        assert_eq!(channel, 2);
        s2.handle_bus_message(channel, payload).await;

        let frame: serde_json::Value = serde_json::from_str(&recv_text(&mut bob_rx).await).unwrap();
        assert_eq!(frame["msg"], "hi");
        assert!(store.query_offline(2).await.unwrap().is_empty());
    }

    /// Scenario 3: offline persistence, Bob never logged in.
    #[tokio::test]
    async fn scenario_offline_persistence() {
        let (store, _bus, _registry, s1) = harness();
        store.insert_user("alice", "pw").await.unwrap();
        store.insert_user("bob", "pw").await.unwrap();

        let (alice_tx, mut alice_rx) = tokio::sync::mpsc::unbounded_channel();
        s1.dispatch(r#"{"msgId":1,"id":1,"password":"pw"}"#, &alice_tx).await;
        let _ = recv_text(&mut alice_rx).await;

        s1.dispatch(
            r#"{"msgId":5,"id":1,"name":"alice","toid":2,"msg":"hi","time":"now"}"#,
            &alice_tx,
        )
        .await;

        assert_eq!(store.query_offline(2).await.unwrap(), vec![
            r#"{"msgId":5,"id":1,"name":"alice","toid":2,"msg":"hi","time":"now"}"#.to_string()
        ]);

        let (bob_tx, mut bob_rx) = tokio::sync::mpsc::unbounded_channel();
        s1.dispatch(r#"{"msgId":1,"id":2,"password":"pw"}"#, &bob_tx).await;
        let login_ack: serde_json::Value = serde_json::from_str(&recv_text(&mut bob_rx).await).unwrap();
        let offlinemsg = login_ack["offlinemsg"].as_array().unwrap();
        assert_eq!(offlinemsg.len(), 1);
        assert!(store.query_offline(2).await.unwrap().is_empty());
    }

    /// Scenario 4: duplicate login is refused and does not subscribe or
    /// mutate state on the second node.
    #[tokio::test]
    async fn scenario_duplicate_login_refused() {
        let store = std::sync::Arc::new(crate::database::FakeStore::default());
        let bus_s1 = std::sync::Arc::new(crate::pubsub::FakeBus::new());
        let bus_s2 = std::sync::Arc::new(crate::pubsub::FakeBus::new());
        let s1 = super::Dispatcher::new(
            store.clone(),
            bus_s1,
            std::sync::Arc::new(crate::registry::ConnRegistry::new()),
        );
        let s2 = super::Dispatcher::new(
            store.clone(),
            bus_s2.clone(),
            std::sync::Arc::new(crate::registry::ConnRegistry::new()),
        );
        store.insert_user("alice", "pw").await.unwrap();

        let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
        s1.dispatch(r#"{"msgId":1,"id":1,"password":"pw"}"#, &tx1).await;
        let _ = recv_text(&mut rx1).await;

        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        s2.dispatch(r#"{"msgId":1,"id":1,"password":"pw"}"#, &tx2).await;
        let ack: serde_json::Value = serde_json::from_str(&recv_text(&mut rx2).await).unwrap();
        assert_eq!(ack["errno"], 2);
        assert!(bus_s2.subscribed.lock().unwrap().is_empty());
        assert_eq!(
            store.query_user(1).await.unwrap().unwrap().state,
            UserState::Online
        );
    }

    /// Scenario 5: group fan-out with mixed recipient states. Alice and Bob
    /// are both members, on separate nodes; Carol is a member but never
    /// logged in. Bob's node receives the message over the bus, Carol's
    /// gets an offline row, and no fallback work happens for Bob even
    /// though `query_group_peers` does not know which node he is on.
    #[tokio::test]
    async fn scenario_group_fan_out_mixed() {
        let store = std::sync::Arc::new(crate::database::FakeStore::default());
        let bus = std::sync::Arc::new(crate::pubsub::FakeBus::new());
        let s1 = super::Dispatcher::new(
            store.clone(),
            bus.clone(),
            std::sync::Arc::new(crate::registry::ConnRegistry::new()),
        );
        let registry_s2 = std::sync::Arc::new(crate::registry::ConnRegistry::new());
        let s2 = super::Dispatcher::new(store.clone(), bus.clone(), registry_s2);

        store.insert_user("alice", "pw").await.unwrap();
        store.insert_user("bob", "pw").await.unwrap();
        store.insert_user("carol", "pw").await.unwrap();

        let (alice_tx, mut alice_rx) = tokio::sync::mpsc::unbounded_channel();
        s1.dispatch(r#"{"msgId":1,"id":1,"password":"pw"}"#, &alice_tx).await;
        let _ = recv_text(&mut alice_rx).await;

        let (bob_tx, mut bob_rx) = tokio::sync::mpsc::unbounded_channel();
        s2.dispatch(r#"{"msgId":1,"id":2,"password":"pw"}"#, &bob_tx).await;
        let _ = recv_text(&mut bob_rx).await;

        s1.dispatch(r#"{"msgId":7,"id":1,"groupname":"trio","groupdesc":"desc"}"#, &alice_tx)
            .await;
        let groupid = store.query_groups_of_user(1).await.unwrap()[0].group.id;
        for member in [2, 3] {
            s1.dispatch(
                &format!(r#"{{"msgId":9,"id":{member},"groupid":{groupid}}}"#),
                &alice_tx,
            )
            .await;
        }

        s1.dispatch(
            &format!(r#"{{"msgId":8,"id":1,"groupid":{groupid},"name":"alice","msg":"hi all","time":"now"}}"#),
            &alice_tx,
        )
        .await;

        // Bob is absent from s1's registry, so s1 published for him.
        let (channel, payload) = bus.published.lock().unwrap().first().cloned().unwrap();
        assert_eq!(channel, 2);
        s2.handle_bus_message(channel, payload).await;
        let frame: serde_json::Value = serde_json::from_str(&recv_text(&mut bob_rx).await).unwrap();
        assert_eq!(frame["msg"], "hi all");

        // Carol never logged in anywhere, so she gets an offline row.
        assert_eq!(store.query_offline(3).await.unwrap().len(), 1);
    }

    /// Scenario 6: crash recovery resets state before any client connects.
    #[tokio::test]
    async fn scenario_crash_recovery() {
        let store = crate::database::FakeStore::default();
        store.insert_user("alice", "pw").await.unwrap();
        store.update_user_state(1, UserState::Online).await.unwrap();

        store.reset_all_online_to_offline().await.unwrap();

        assert_eq!(
            store.query_user(1).await.unwrap().unwrap().state,
            UserState::Offline
        );
    }
}
