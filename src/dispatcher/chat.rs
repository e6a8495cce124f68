use log::warn;

use super::Dispatcher;
use crate::database::UserState;
use crate::protocol::{GroupChatReq, OneChatReq};

/// Forwarding rule, in order: deliver locally, publish cross-node if the
/// recipient is online elsewhere, or persist as offline. `raw` is the
/// original wire frame, forwarded byte-for-byte — never a
/// re-serialization of `value`, whose key order is not guaranteed to
/// match what the sender actually sent.
pub async fn one_chat(d: &Dispatcher, value: serde_json::Value, raw: &str) {
    let req: OneChatReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed ONE_CHAT frame: {e}");
            return;
        }
    };
    deliver_or_fallback(d, req.toid, raw).await;
}

/// Runs rule steps 2 and 3 of `one_chat` for a single recipient: the
/// `ConnRegistry` check already happened (or is assumed to have failed) by
/// the time this is called.
async fn fallback(d: &Dispatcher, toid: crate::database::UserId, payload: &str) {
    let user = match d.store.query_user(toid).await {
        Ok(u) => u,
        Err(e) => {
            warn!("query_user({toid}) failed: {e}");
            None
        }
    };
    match user {
        Some(u) if u.state == UserState::Online => {
            if !d.bus.publish(toid, payload).await {
                warn!("publish to channel {toid} was rejected by the broker");
            }
        }
        _ => {
            if let Err(e) = d.store.insert_offline(toid, payload).await {
                warn!("failed to persist offline message for {toid}: {e}");
            }
        }
    }
}

async fn deliver_or_fallback(d: &Dispatcher, toid: crate::database::UserId, payload: &str) {
    if let Some(conn) = d.registry.lookup(toid) {
        let _ = conn.send(Ok(warp::ws::Message::text(payload)));
        return;
    }
    fallback(d, toid, payload).await;
}

/// `peers` is looked up once; the lock over `ConnRegistry` is taken once
/// and covers only the in-memory sends, with missing peers deferred to a
/// local list that is processed, one `fallback` call each, after release.
/// As in `one_chat`, `raw` is forwarded verbatim rather than rebuilt from
/// `value`.
pub async fn group_chat(d: &Dispatcher, value: serde_json::Value, raw: &str) {
    let req: GroupChatReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed GROUP_CHAT frame: {e}");
            return;
        }
    };
    let peers = match d.store.query_group_peers(req.id, req.groupid).await {
        Ok(p) => p,
        Err(e) => {
            warn!("query_group_peers({}, {}) failed: {e}", req.id, req.groupid);
            return;
        }
    };

    let missing = d.registry.for_each_send(&peers, raw);
    for peer in missing {
        fallback(d, peer, raw).await;
    }
}
