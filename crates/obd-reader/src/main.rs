//! OBD-II Reader - Main Entry Point

use obd_reader::{init_logging, run, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.log_level)?;

    info!("=== OBD Reader v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Adapter device: {}", settings.device);

    let stored = run(settings).await?;
    info!("Session finished, {} snapshot(s) stored", stored);
    Ok(())
}
