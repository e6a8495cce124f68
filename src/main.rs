use chatserver::config::Config;

/// The worker count is a CLI/env setting, so the runtime is built by hand
/// instead of `#[tokio::main]`, which fixes the thread count at compile time.
fn main() {
    env_logger::init();
    let config = Config::load();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    if let Err(e) = runtime.block_on(chatserver::server::run(config)) {
        log::error!("server exited with error: {e}");
        std::process::exit(1);
    }
}
