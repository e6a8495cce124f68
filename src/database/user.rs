use deadpool_postgres::Pool;

use super::{User, UserId, UserState};
use crate::error::Result;

/// Insert a new user. Returns `Ok(None)` if `name` is already taken.
pub async fn insert_user(pool: &Pool, name: &str, password: &str) -> Result<Option<UserId>> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare(
            "INSERT INTO \"user\" (name, password, state)
             SELECT $1, $2, 'offline'
             WHERE NOT EXISTS (SELECT 1 FROM \"user\" WHERE name = $1)
             RETURNING id",
        )
        .await?;
    Ok(conn
        .query_opt(&stmt, &[&name, &password])
        .await?
        .map(|row| row.get(0)))
}

pub async fn query_user(pool: &Pool, id: UserId) -> Result<Option<User>> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("SELECT id, name, password, state FROM \"user\" WHERE id = $1")
        .await?;
    Ok(conn.query_opt(&stmt, &[&id]).await?.map(|row| {
        let state: String = row.get(3);
        User {
            id: row.get(0),
            name: row.get(1),
            password: row.get(2),
            state: state.parse().unwrap_or(UserState::Offline),
        }
    }))
}

pub async fn update_user_state(pool: &Pool, id: UserId, state: UserState) -> Result<()> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("UPDATE \"user\" SET state = $1 WHERE id = $2")
        .await?;
    conn.execute(&stmt, &[&state.as_str(), &id]).await?;
    Ok(())
}

/// Called at server boot to repair state after a previous crash (I1).
pub async fn reset_all_online_to_offline(pool: &Pool) -> Result<()> {
    let conn = pool.get().await?;
    conn.execute(
        "UPDATE \"user\" SET state = 'offline' WHERE state = 'online'",
        &[],
    )
    .await?;
    Ok(())
}
