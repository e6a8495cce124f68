//! In-memory stand-in for `Store`, used only by the dispatcher's unit
//! tests (§8 scenarios) so they don't need a live PostgreSQL instance.

#![cfg(test)]

use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatStore, GroupId, GroupRecord, GroupWithMembers, Member, Role, User, UserId, UserState};
use crate::error::Result;

#[derive(Default)]
struct State {
    users: Vec<User>,
    next_user_id: UserId,
    friends: Vec<(UserId, UserId)>,
    groups: Vec<GroupRecord>,
    next_group_id: GroupId,
    memberships: Vec<(GroupId, UserId, Role)>,
    offline: Vec<(UserId, String)>,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

#[async_trait]
impl ChatStore for FakeStore {
    async fn insert_user(&self, name: &str, password: &str) -> Result<Option<UserId>> {
        let mut state = self.state.lock().unwrap();
        if state.users.iter().any(|u| u.name == name) {
            return Ok(None);
        }
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.push(User {
            id,
            name: name.to_string(),
            password: password.to_string(),
            state: UserState::Offline,
        });
        Ok(Some(id))
    }

    async fn query_user(&self, id: UserId) -> Result<Option<User>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_user_state(&self, id: UserId, new_state: UserState) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == id) {
            user.state = new_state;
        }
        Ok(())
    }

    async fn reset_all_online_to_offline(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for user in state.users.iter_mut() {
            user.state = UserState::Offline;
        }
        Ok(())
    }

    async fn insert_friend(&self, userid: UserId, friendid: UserId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.friends.push((userid, friendid));
        Ok(())
    }

    async fn query_friends(&self, userid: UserId) -> Result<Vec<User>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .friends
            .iter()
            .filter(|(u, _)| *u == userid)
            .filter_map(|(_, f)| state.users.iter().find(|u| u.id == *f).cloned())
            .collect())
    }

    async fn create_group(&self, name: &str, desc: &str) -> Result<GroupId> {
        let mut state = self.state.lock().unwrap();
        state.next_group_id += 1;
        let id = state.next_group_id;
        state.groups.push(GroupRecord {
            id,
            name: name.to_string(),
            desc: desc.to_string(),
        });
        Ok(id)
    }

    async fn add_group_member(&self, groupid: GroupId, userid: UserId, role: Role) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.memberships.push((groupid, userid, role));
        Ok(())
    }

    async fn query_groups_of_user(&self, userid: UserId) -> Result<Vec<GroupWithMembers>> {
        let state = self.state.lock().unwrap();
        let group_ids: Vec<GroupId> = state
            .memberships
            .iter()
            .filter(|(_, u, _)| *u == userid)
            .map(|(g, _, _)| *g)
            .collect();
        Ok(state
            .groups
            .iter()
            .filter(|g| group_ids.contains(&g.id))
            .map(|group| {
                let members = state
                    .memberships
                    .iter()
                    .filter(|(g, _, _)| *g == group.id)
                    .filter_map(|(_, u, role)| {
                        state.users.iter().find(|usr| usr.id == *u).map(|usr| Member {
                            id: usr.id,
                            name: usr.name.clone(),
                            state: usr.state,
                            role: *role,
                        })
                    })
                    .collect();
                GroupWithMembers {
                    group: group.clone(),
                    members,
                }
            })
            .collect())
    }

    async fn query_group_peers(&self, userid: UserId, groupid: GroupId) -> Result<Vec<UserId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .filter(|(g, u, _)| *g == groupid && *u != userid)
            .map(|(_, u, _)| *u)
            .collect())
    }

    async fn insert_offline(&self, userid: UserId, payload: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.offline.push((userid, payload.to_string()));
        Ok(())
    }

    async fn query_offline(&self, userid: UserId) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .offline
            .iter()
            .filter(|(u, _)| *u == userid)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn delete_offline(&self, userid: UserId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.offline.retain(|(u, _)| *u != userid);
        Ok(())
    }
}
