use deadpool_postgres::Pool;

use super::{GroupId, GroupRecord, GroupWithMembers, Member, Role, UserId, UserState};
use crate::error::Result;

/// Create a new group, immediately generating its id.
pub async fn create_group(pool: &Pool, name: &str, desc: &str) -> Result<GroupId> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("INSERT INTO allgroup (name, description) VALUES ($1, $2) RETURNING id")
        .await?;
    let row = conn.query_one(&stmt, &[&name, &desc]).await?;
    Ok(row.get(0))
}

/// Add a member to a group with the given role. The creator is added with
/// `Role::Creator` by the caller right after `create_group` succeeds;
/// every later join uses `Role::Normal` (invariant I4).
pub async fn add_group_member(
    pool: &Pool,
    groupid: GroupId,
    userid: UserId,
    role: Role,
) -> Result<()> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("INSERT INTO groupuser (groupid, userid, role) VALUES ($1, $2, $3)")
        .await?;
    conn.execute(&stmt, &[&groupid, &userid, &role.as_str()])
        .await?;
    Ok(())
}

/// Two-phase lookup: list the groups a user belongs to, then for each group
/// list its members (including the requesting user).
pub async fn query_groups_of_user(pool: &Pool, userid: UserId) -> Result<Vec<GroupWithMembers>> {
    let conn = pool.get().await?;
    let group_stmt = conn
        .prepare(
            "SELECT a.id, a.name, a.description
             FROM allgroup a
             JOIN groupuser b ON a.id = b.groupid
             WHERE b.userid = $1
             ORDER BY a.id",
        )
        .await?;
    let groups: Vec<GroupRecord> = conn
        .query(&group_stmt, &[&userid])
        .await?
        .into_iter()
        .map(|row| GroupRecord {
            id: row.get(0),
            name: row.get(1),
            desc: row.get(2),
        })
        .collect();

    let member_stmt = conn
        .prepare(
            "SELECT u.id, u.name, u.state, g.role
             FROM \"user\" u
             JOIN groupuser g ON g.userid = u.id
             WHERE g.groupid = $1",
        )
        .await?;

    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        let members = conn
            .query(&member_stmt, &[&group.id])
            .await?
            .into_iter()
            .map(|row| {
                let state: String = row.get(2);
                let role: String = row.get(3);
                Member {
                    id: row.get(0),
                    name: row.get(1),
                    state: state.parse().unwrap_or(UserState::Offline),
                    role: role.parse().unwrap_or(Role::Normal),
                }
            })
            .collect();
        result.push(GroupWithMembers { group, members });
    }
    Ok(result)
}

/// Ids of all members of `groupid` other than `userid`, used by group chat
/// fan-out to find the peers that should receive a message.
pub async fn query_group_peers(
    pool: &Pool,
    userid: UserId,
    groupid: GroupId,
) -> Result<Vec<UserId>> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("SELECT userid FROM groupuser WHERE groupid = $1 AND userid != $2")
        .await?;
    Ok(conn
        .query(&stmt, &[&groupid, &userid])
        .await?
        .into_iter()
        .map(|row| row.get(0))
        .collect())
}
