use log::warn;

use super::Dispatcher;
use crate::database::Role;
use crate::protocol::{AddFriendReq, AddGroupReq, CreateGroupReq};

pub async fn add_friend(d: &Dispatcher, value: serde_json::Value) {
    let req: AddFriendReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed ADD_FRIEND frame: {e}");
            return;
        }
    };
    if let Err(e) = d.store.insert_friend(req.id, req.friendid).await {
        warn!("insert_friend({}, {}) failed: {e}", req.id, req.friendid);
    }
}

/// The creator is added as a member with `Role::Creator` immediately after
/// the group row is created (invariant I4).
pub async fn create_group(d: &Dispatcher, value: serde_json::Value) {
    let req: CreateGroupReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed CREATE_GROUP frame: {e}");
            return;
        }
    };
    let groupid = match d.store.create_group(&req.groupname, &req.groupdesc).await {
        Ok(id) => id,
        Err(e) => {
            warn!("create_group({}) failed: {e}", req.groupname);
            return;
        }
    };
    if let Err(e) = d.store.add_group_member(groupid, req.id, Role::Creator).await {
        warn!("add_group_member({groupid}, {}, creator) failed: {e}", req.id);
    }
}

pub async fn add_group(d: &Dispatcher, value: serde_json::Value) {
    let req: AddGroupReq = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed ADD_GROUP frame: {e}");
            return;
        }
    };
    if let Err(e) = d.store.add_group_member(req.groupid, req.id, Role::Normal).await {
        warn!("add_group_member({}, {}, normal) failed: {e}", req.groupid, req.id);
    }
}
