use deadpool_postgres::Pool;

use super::{User, UserId, UserState};
use crate::error::Result;

/// Inserts the one directed row given by the requester. Duplicate inserts
/// are not guaranteed to be rejected by a unique constraint; callers treat
/// this call as best-effort and do not branch on its outcome.
pub async fn insert_friend(pool: &Pool, userid: UserId, friendid: UserId) -> Result<()> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("INSERT INTO friend (userid, friendid) VALUES ($1, $2)")
        .await?;
    conn.execute(&stmt, &[&userid, &friendid]).await?;
    Ok(())
}

/// Returns only the friends reachable via the `userid` side of the
/// directed relation (see Open Questions in SPEC_FULL.md §9).
pub async fn query_friends(pool: &Pool, userid: UserId) -> Result<Vec<User>> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare(
            "SELECT u.id, u.name, u.password, u.state
             FROM friend f
             JOIN \"user\" u ON u.id = f.friendid
             WHERE f.userid = $1",
        )
        .await?;
    Ok(conn
        .query(&stmt, &[&userid])
        .await?
        .into_iter()
        .map(|row| {
            let state: String = row.get(3);
            User {
                id: row.get(0),
                name: row.get(1),
                password: row.get(2),
                state: state.parse().unwrap_or(UserState::Offline),
            }
        })
        .collect())
}
