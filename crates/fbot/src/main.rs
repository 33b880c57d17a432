use std::sync::Arc;

use fbot_core::{
    config::Config,
    storage::{JsonFileStorage, Storage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fbot_core::logging::init("fbot")?;

    let cfg = Arc::new(Config::load()?);

    // A state file we cannot open at startup is fatal; everything after
    // startup is recoverable per event.
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::open(&cfg.state_file)?);

    fbot_telegram::router::run_polling(cfg, storage).await
}
