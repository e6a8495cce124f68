//! Bridges messages across server instances over Redis pub/sub, channel
//! number == user id. Two independent broker connections are kept: a
//! multiplexed async connection for `publish`, and a dedicated blocking
//! connection for `subscribe`/`unsubscribe`, because the latter blocks on
//! read. A dedicated OS thread drains the blocking connection.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use redis::AsyncCommands;

use crate::database::UserId;
use crate::error::Result;

#[async_trait]
pub trait Bus: Send + Sync {
    async fn subscribe(&self, channel: UserId);
    async fn unsubscribe(&self, channel: UserId);
    async fn publish(&self, channel: UserId, payload: &str) -> bool;
}

/// Callback invoked as `handler(channel, payload)` for every message
/// delivered on a currently-subscribed channel.
pub type OnMessage = Arc<dyn Fn(UserId, String) + Send + Sync>;

enum SubCommand {
    Subscribe(UserId),
    Unsubscribe(UserId),
}

pub struct RedisBus {
    publish_conn: redis::aio::MultiplexedConnection,
    cmd_tx: std_mpsc::Sender<SubCommand>,
}

impl RedisBus {
    pub async fn connect(redis_url: &str, on_message: OnMessage) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = client.get_multiplexed_tokio_connection().await?;

        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let sub_client = client.clone();
        std::thread::spawn(move || subscribe_loop(sub_client, cmd_rx, on_message));

        Ok(RedisBus {
            publish_conn,
            cmd_tx,
        })
    }
}

/// Runs on its own OS thread for the lifetime of the process. Alternates a
/// non-blocking drain of pending subscribe/unsubscribe commands with a
/// short-timeout read of the next pub/sub message, so neither starves the
/// other on a single blocking socket.
fn subscribe_loop(
    client: redis::Client,
    cmd_rx: std_mpsc::Receiver<SubCommand>,
    on_message: OnMessage,
) {
    let mut conn = match client.get_connection() {
        Ok(c) => c,
        Err(e) => {
            error!("pubsub subscriber thread failed to connect: {e}");
            return;
        }
    };
    if let Err(e) = conn.set_read_timeout(Some(Duration::from_millis(200))) {
        error!("pubsub subscriber thread failed to set read timeout: {e}");
        return;
    }
    let mut pubsub = conn.as_pubsub();

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            let result = match cmd {
                SubCommand::Subscribe(channel) => pubsub.subscribe(channel.to_string()),
                SubCommand::Unsubscribe(channel) => pubsub.unsubscribe(channel.to_string()),
            };
            if let Err(e) = result {
                warn!("pubsub (un)subscribe command failed: {e}");
            }
        }

        match pubsub.get_message() {
            Ok(msg) => {
                let channel: String = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("pubsub message with unreadable payload: {e}");
                        continue;
                    }
                };
                match channel.parse::<UserId>() {
                    Ok(userid) => on_message(userid, payload),
                    Err(_) => debug!("pubsub message on non-numeric channel {channel}"),
                }
            }
            Err(e) if e.is_timeout() => continue,
            Err(e) => {
                warn!("pubsub read error: {e}");
            }
        }
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn subscribe(&self, channel: UserId) {
        if self.cmd_tx.send(SubCommand::Subscribe(channel)).is_err() {
            error!("pubsub subscriber thread is gone, dropping subscribe({channel})");
        }
    }

    async fn unsubscribe(&self, channel: UserId) {
        if self.cmd_tx.send(SubCommand::Unsubscribe(channel)).is_err() {
            error!("pubsub subscriber thread is gone, dropping unsubscribe({channel})");
        }
    }

    async fn publish(&self, channel: UserId, payload: &str) -> bool {
        let mut conn = self.publish_conn.clone();
        match conn.publish::<_, _, i64>(channel.to_string(), payload).await {
            Ok(_) => true,
            Err(e) => {
                warn!("publish to channel {channel} failed: {e}");
                false
            }
        }
    }
}

/// Stand-in `Bus` used when `RedisBus::connect` fails at startup. Matches
/// `original_source/src/server/chatservice.cpp`'s behavior when its Redis
/// context fails to connect: the subscribe callback is simply never
/// wired, and the server keeps running without cross-node routing.
/// `publish` reports failure so callers fall back to persisting the
/// message as offline instead of losing it.
pub struct NullBus;

#[async_trait]
impl Bus for NullBus {
    async fn subscribe(&self, _channel: UserId) {}
    async fn unsubscribe(&self, _channel: UserId) {}
    async fn publish(&self, _channel: UserId, _payload: &str) -> bool {
        false
    }
}

#[cfg(test)]
pub use fake::FakeBus;

#[cfg(test)]
mod fake {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Bus;
    use crate::database::UserId;

    #[derive(Default)]
    pub struct FakeBus {
        pub subscribed: Mutex<Vec<UserId>>,
        pub published: Mutex<Vec<(UserId, String)>>,
        /// Simulates whether the broker is reachable; `publish` returns
        /// this value, matching the real bus's synchronous-acceptance
        /// contract.
        pub up: Mutex<bool>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            FakeBus {
                subscribed: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                up: Mutex::new(true),
            }
        }
    }

    #[async_trait]
    impl Bus for FakeBus {
        async fn subscribe(&self, channel: UserId) {
            self.subscribed.lock().unwrap().push(channel);
        }

        async fn unsubscribe(&self, channel: UserId) {
            self.subscribed.lock().unwrap().retain(|c| *c != channel);
        }

        async fn publish(&self, channel: UserId, payload: &str) -> bool {
            let up = *self.up.lock().unwrap();
            if up {
                self.published
                    .lock()
                    .unwrap()
                    .push((channel, payload.to_string()));
            }
            up
        }
    }
}
