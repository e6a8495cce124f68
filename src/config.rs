use clap::Parser;

/// `chatserver --host <ip> --port <port> [--workers N]`
///
/// Falls back to `DATABASE_URL` / `REDIS_URL` / `CHAT_WORKERS` (optionally
/// loaded from a `.env` file) when the matching flag is omitted.
#[derive(Debug, Parser)]
#[command(name = "chatserver", about = "Horizontally-scalable chat server")]
pub struct Config {
    /// Address to bind the WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the WebSocket listener to.
    #[arg(long, default_value_t = 6000)]
    pub port: u16,

    /// Size of the tokio worker pool handling connections.
    #[arg(long, env = "CHAT_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// PostgreSQL connection string for the Store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string for the PubSubBus.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,
}

impl Config {
    /// Loads a `.env` file if present, then parses CLI args with env fallback.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Config::parse()
    }
}
