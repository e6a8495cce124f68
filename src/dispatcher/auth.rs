use log::warn;

use super::Dispatcher;
use crate::database::UserState;
use crate::protocol::{msg_id, FriendInfo, GroupInfo, LoginAck, LoginReq, LogoutReq, MemberInfo, RegAck, RegReq};
use crate::registry::Connection;

fn send(conn: &Connection, value: &impl serde::Serialize) {
    match serde_json::to_string(value) {
        Ok(text) => {
            let _ = conn.send(Ok(warp::ws::Message::text(text)));
        }
        Err(e) => warn!("failed to encode outbound frame: {e}"),
    }
}

pub async fn login(d: &Dispatcher, value: serde_json::Value, conn: &Connection) {
    let req: LoginReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed LOGIN frame: {e}");
            return;
        }
    };

    let user = match d.store.query_user(req.id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            send(conn, &LoginAck::error(1, "this account is invalid!"));
            return;
        }
        Err(e) => {
            warn!("query_user({}) failed: {e}", req.id);
            send(conn, &LoginAck::error(1, "this account is invalid!"));
            return;
        }
    };

    if user.password != req.password {
        send(conn, &LoginAck::error(3, "wrong password!"));
        return;
    }

    if user.state == UserState::Online {
        send(conn, &LoginAck::error(2, "this account is already online!"));
        return;
    }

    d.registry.bind(user.id, conn.clone());
    d.bus.subscribe(user.id).await;
    if let Err(e) = d.store.update_user_state(user.id, UserState::Online).await {
        warn!("failed to mark user {} online: {e}", user.id);
    }

    let friends = match d.store.query_friends(user.id).await {
        Ok(f) => f,
        Err(e) => {
            warn!("query_friends({}) failed: {e}", user.id);
            Vec::new()
        }
    };
    let friends: Vec<String> = friends
        .into_iter()
        .map(|f| {
            serde_json::to_string(&FriendInfo {
                id: f.id,
                name: f.name,
                state: f.state,
            })
            .unwrap_or_default()
        })
        .collect();

    let groups = match d.store.query_groups_of_user(user.id).await {
        Ok(g) => g,
        Err(e) => {
            warn!("query_groups_of_user({}) failed: {e}", user.id);
            Vec::new()
        }
    };
    let groups: Vec<String> = groups
        .into_iter()
        .map(|g| {
            let users: Vec<String> = g
                .members
                .into_iter()
                .map(|m| {
                    serde_json::to_string(&MemberInfo {
                        id: m.id,
                        name: m.name,
                        state: m.state,
                        role: m.role,
                    })
                    .unwrap_or_default()
                })
                .collect();
            serde_json::to_string(&GroupInfo {
                id: g.group.id,
                groupname: g.group.name,
                groupdesc: g.group.desc,
                users,
            })
            .unwrap_or_default()
        })
        .collect();

    // Read before delete, never the reverse (I3).
    let offlinemsg = match d.store.query_offline(user.id).await {
        Ok(msgs) => {
            if !msgs.is_empty() {
                if let Err(e) = d.store.delete_offline(user.id).await {
                    warn!("failed to clear offline messages for {}: {e}", user.id);
                }
            }
            msgs
        }
        Err(e) => {
            warn!("query_offline({}) failed: {e}", user.id);
            Vec::new()
        }
    };

    send(
        conn,
        &LoginAck {
            msg_id: msg_id::LOGIN_ACK,
            errno: 0,
            errmsg: None,
            id: Some(user.id),
            name: Some(user.name),
            friends: Some(friends),
            groups: Some(groups),
            offlinemsg: Some(offlinemsg),
        },
    );
}

pub async fn register(d: &Dispatcher, value: serde_json::Value, conn: &Connection) {
    let req: RegReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed REG frame: {e}");
            return;
        }
    };

    let ack = match d.store.insert_user(&req.name, &req.password).await {
        Ok(Some(id)) => RegAck {
            msg_id: msg_id::REG_ACK,
            errno: 0,
            id: Some(id),
        },
        Ok(None) => RegAck {
            msg_id: msg_id::REG_ACK,
            errno: 1,
            id: None,
        },
        Err(e) => {
            warn!("insert_user({}) failed: {e}", req.name);
            RegAck {
                msg_id: msg_id::REG_ACK,
                errno: 1,
                id: None,
            }
        }
    };
    send(conn, &ack);
}

pub async fn logout(d: &Dispatcher, value: serde_json::Value) {
    let req: LogoutReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed LOGOUT frame: {e}");
            return;
        }
    };
    d.registry.unbind(req.id);
    d.bus.unsubscribe(req.id).await;
    if let Err(e) = d.store.update_user_state(req.id, UserState::Offline).await {
        warn!("failed to mark user {} offline on logout: {e}", req.id);
    }
}
