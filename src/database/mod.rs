//! CRUD surface over five PostgreSQL tables: `user`, `friend`, `allgroup`,
//! `groupuser`, `offlinemessage`. Every call checks a connection out of a
//! pool and returns plain records; reads return the empty result on
//! failure, writes are best-effort (the Dispatcher boundary logs and
//! discards `Err`, see `crate::error`).

mod fake;
mod friend;
mod group;
mod offline;
mod user;

#[cfg(test)]
pub use fake::FakeStore;

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;

use crate::error::Result;

pub type UserId = i32;
pub type GroupId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Online,
    Offline,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Online => "online",
            UserState::Offline => "offline",
        }
    }
}

impl std::str::FromStr for UserState {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "online" => Ok(UserState::Online),
            "offline" => Ok(UserState::Offline),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    Normal,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Normal => "normal",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Role::Creator),
            "normal" => Ok(Role::Normal),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub password: String,
    pub state: UserState,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: UserId,
    pub name: String,
    pub state: UserState,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone)]
pub struct GroupWithMembers {
    pub group: GroupRecord,
    pub members: Vec<Member>,
}

/// The Store's CRUD surface, factored out as a trait so the Dispatcher can
/// be exercised in tests against an in-memory `FakeStore` instead of a live
/// PostgreSQL instance (see `FakeStore` below).
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn insert_user(&self, name: &str, password: &str) -> Result<Option<UserId>>;
    async fn query_user(&self, id: UserId) -> Result<Option<User>>;
    async fn update_user_state(&self, id: UserId, state: UserState) -> Result<()>;
    async fn reset_all_online_to_offline(&self) -> Result<()>;
    async fn insert_friend(&self, userid: UserId, friendid: UserId) -> Result<()>;
    async fn query_friends(&self, userid: UserId) -> Result<Vec<User>>;
    async fn create_group(&self, name: &str, desc: &str) -> Result<GroupId>;
    async fn add_group_member(&self, groupid: GroupId, userid: UserId, role: Role) -> Result<()>;
    async fn query_groups_of_user(&self, userid: UserId) -> Result<Vec<GroupWithMembers>>;
    async fn query_group_peers(&self, userid: UserId, groupid: GroupId) -> Result<Vec<UserId>>;
    async fn insert_offline(&self, userid: UserId, payload: &str) -> Result<()>;
    async fn query_offline(&self, userid: UserId) -> Result<Vec<String>>;
    async fn delete_offline(&self, userid: UserId) -> Result<()>;
}

/// Thin wrapper around a `deadpool_postgres::Pool`. Stateless beyond the
/// pool itself: no call holds a connection across a second operation.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(database_url.to_string());
        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Store { pool })
    }
}

#[async_trait]
impl ChatStore for Store {
    async fn insert_user(&self, name: &str, password: &str) -> Result<Option<UserId>> {
        user::insert_user(&self.pool, name, password).await
    }

    async fn query_user(&self, id: UserId) -> Result<Option<User>> {
        user::query_user(&self.pool, id).await
    }

    async fn update_user_state(&self, id: UserId, state: UserState) -> Result<()> {
        user::update_user_state(&self.pool, id, state).await
    }

    async fn reset_all_online_to_offline(&self) -> Result<()> {
        user::reset_all_online_to_offline(&self.pool).await
    }

    async fn insert_friend(&self, userid: UserId, friendid: UserId) -> Result<()> {
        friend::insert_friend(&self.pool, userid, friendid).await
    }

    async fn query_friends(&self, userid: UserId) -> Result<Vec<User>> {
        friend::query_friends(&self.pool, userid).await
    }

    async fn create_group(&self, name: &str, desc: &str) -> Result<GroupId> {
        group::create_group(&self.pool, name, desc).await
    }

    async fn add_group_member(&self, groupid: GroupId, userid: UserId, role: Role) -> Result<()> {
        group::add_group_member(&self.pool, groupid, userid, role).await
    }

    async fn query_groups_of_user(&self, userid: UserId) -> Result<Vec<GroupWithMembers>> {
        group::query_groups_of_user(&self.pool, userid).await
    }

    async fn query_group_peers(&self, userid: UserId, groupid: GroupId) -> Result<Vec<UserId>> {
        group::query_group_peers(&self.pool, userid, groupid).await
    }

    async fn insert_offline(&self, userid: UserId, payload: &str) -> Result<()> {
        offline::insert_offline(&self.pool, userid, payload).await
    }

    async fn query_offline(&self, userid: UserId) -> Result<Vec<String>> {
        offline::query_offline(&self.pool, userid).await
    }

    async fn delete_offline(&self, userid: UserId) -> Result<()> {
        offline::delete_offline(&self.pool, userid).await
    }
}

/// Stand-in `ChatStore` used when `Store::connect` fails at startup.
/// Per the design note on startup failures, an unreachable database is
/// logged and does not abort the process; every call here fails the same
/// way a live `Store` call would on a dropped connection, which callers
/// already treat as best-effort and log-and-continue.
pub struct UnavailableStore;

#[async_trait]
impl ChatStore for UnavailableStore {
    async fn insert_user(&self, _name: &str, _password: &str) -> Result<Option<UserId>> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn query_user(&self, _id: UserId) -> Result<Option<User>> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn update_user_state(&self, _id: UserId, _state: UserState) -> Result<()> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn reset_all_online_to_offline(&self) -> Result<()> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn insert_friend(&self, _userid: UserId, _friendid: UserId) -> Result<()> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn query_friends(&self, _userid: UserId) -> Result<Vec<User>> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn create_group(&self, _name: &str, _desc: &str) -> Result<GroupId> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn add_group_member(&self, _groupid: GroupId, _userid: UserId, _role: Role) -> Result<()> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn query_groups_of_user(&self, _userid: UserId) -> Result<Vec<GroupWithMembers>> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn query_group_peers(&self, _userid: UserId, _groupid: GroupId) -> Result<Vec<UserId>> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn insert_offline(&self, _userid: UserId, _payload: &str) -> Result<()> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn query_offline(&self, _userid: UserId) -> Result<Vec<String>> {
        Err(crate::error::Error::StoreUnavailable)
    }

    async fn delete_offline(&self, _userid: UserId) -> Result<()> {
        Err(crate::error::Error::StoreUnavailable)
    }
}
