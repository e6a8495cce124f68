use deadpool_postgres::Pool;

use super::UserId;
use crate::error::Result;

pub async fn insert_offline(pool: &Pool, userid: UserId, payload: &str) -> Result<()> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("INSERT INTO offlinemessage (userid, payload) VALUES ($1, $2)")
        .await?;
    conn.execute(&stmt, &[&userid, &payload]).await?;
    Ok(())
}

pub async fn query_offline(pool: &Pool, userid: UserId) -> Result<Vec<String>> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("SELECT payload FROM offlinemessage WHERE userid = $1")
        .await?;
    Ok(conn
        .query(&stmt, &[&userid])
        .await?
        .into_iter()
        .map(|row| row.get(0))
        .collect())
}

/// Removes all rows for `userid`. Called right after a successful
/// `query_offline` at login, never before (I3).
pub async fn delete_offline(pool: &Pool, userid: UserId) -> Result<()> {
    let conn = pool.get().await?;
    let stmt = conn
        .prepare("DELETE FROM offlinemessage WHERE userid = $1")
        .await?;
    conn.execute(&stmt, &[&userid]).await?;
    Ok(())
}
