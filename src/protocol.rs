//! Wire schema: one JSON object per WebSocket text frame, tagged by the
//! integer `msgId` field. The numeric values are fixed by the client and
//! must not be renumbered.

use serde::{Deserialize, Serialize};

use crate::database::{GroupId, UserId};

pub mod msg_id {
    pub const LOGIN: i64 = 1;
    pub const LOGIN_ACK: i64 = 2;
    pub const REG: i64 = 3;
    pub const REG_ACK: i64 = 4;
    pub const ONE_CHAT: i64 = 5;
    pub const ADD_FRIEND: i64 = 6;
    pub const CREATE_GROUP: i64 = 7;
    pub const GROUP_CHAT: i64 = 8;
    pub const ADD_GROUP: i64 = 9;
    pub const LOGOUT: i64 = 10;
}

/// Extracts just the routing key out of an inbound frame. The rest of the
/// payload is reinterpreted per-handler from the same `serde_json::Value`,
/// since each `msgId` carries a different required-field set.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "msgId")]
    pub msg_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginReq {
    pub id: UserId,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginAck {
    #[serde(rename = "msgId")]
    pub msg_id: i64,
    pub errno: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offlinemsg: Option<Vec<String>>,
}

impl LoginAck {
    pub fn error(errno: i32, errmsg: &str) -> Self {
        LoginAck {
            msg_id: msg_id::LOGIN_ACK,
            errno,
            errmsg: Some(errmsg.to_string()),
            id: None,
            name: None,
            friends: None,
            groups: None,
            offlinemsg: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegReq {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegAck {
    #[serde(rename = "msgId")]
    pub msg_id: i64,
    pub errno: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutReq {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct OneChatReq {
    pub id: UserId,
    pub name: String,
    pub toid: UserId,
    pub msg: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct AddFriendReq {
    pub id: UserId,
    pub friendid: UserId,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupReq {
    pub id: UserId,
    pub groupname: String,
    pub groupdesc: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupChatReq {
    pub id: UserId,
    pub groupid: GroupId,
    pub name: String,
    pub msg: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct AddGroupReq {
    pub id: UserId,
    pub groupid: GroupId,
}

/// `friends` entries: `{id, name, state}`, individually stringified before
/// being placed in the LOGIN_ACK's `friends` array.
#[derive(Debug, Serialize)]
pub struct FriendInfo {
    pub id: UserId,
    pub name: String,
    pub state: crate::database::UserState,
}

/// `groups` entries: `{id, groupname, groupdesc, users}`, individually
/// stringified, with `users` itself an array of stringified member objects.
#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub id: GroupId,
    pub groupname: String,
    pub groupdesc: String,
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MemberInfo {
    pub id: UserId,
    pub name: String,
    pub state: crate::database::UserState,
    pub role: crate::database::Role,
}
