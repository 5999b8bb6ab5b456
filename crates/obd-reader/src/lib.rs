//! OBD-II Reader
//!
//! Connects to an ELM327 adapter, runs read cycles and hands each snapshot
//! to the JSON file sink.

mod settings;

pub use settings::{Settings, MOCK_DEVICE};

use anyhow::Context;
use std::future::Future;
use obd_protocol::{MockAdapter, SerialTransport, Transport};
use obd_session::SessionEngine;
use storage::{JsonFileSink, SnapshotSink};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging at `level` (falls back to `info`)
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let max_level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Run a full session as described by `settings`
pub async fn run(settings: Settings) -> anyhow::Result<usize> {
    let sink = JsonFileSink::new(&settings.output_dir).with_file_name(&settings.file_name);

    if settings.is_mock() {
        info!("Using simulated ELM327 adapter");
        let engine = SessionEngine::new(MockAdapter::elm327(), settings.session.clone());
        run_session(&engine, &settings, &sink).await
    } else {
        let engine = SessionEngine::new(
            SerialTransport::new(settings.baud_rate),
            settings.session.clone(),
        );
        run_session(&engine, &settings, &sink).await
    }
}

/// Connect, run the configured read cycles, always disconnect
///
/// Ctrl-C drops the in-progress cycle and disconnects straight away.
/// Returns the number of snapshots stored.
pub async fn run_session<T: Transport>(
    engine: &SessionEngine<T>,
    settings: &Settings,
    sink: &dyn SnapshotSink,
) -> anyhow::Result<usize> {
    engine
        .connect(&settings.device)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.device))?;

    let outcome = tokio::select! {
        result = read_cycles(engine, settings, sink) => result,
        _ = interrupted(tokio::signal::ctrl_c()) => {
            warn!("Interrupted, disconnecting");
            Ok(0)
        }
    };

    engine.disconnect().await;
    outcome
}

/// Resolve when `signal` fires; never resolve if it could not be installed
async fn interrupted<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Cannot listen for Ctrl-C, running without it: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn read_cycles<T: Transport>(
    engine: &SessionEngine<T>,
    settings: &Settings,
    sink: &dyn SnapshotSink,
) -> anyhow::Result<usize> {
    let mut stored = 0;

    for cycle in 1..=settings.read_cycles {
        if cycle > 1 {
            tokio::time::sleep(settings.read_interval()).await;
        }

        let reading = engine
            .read_data()
            .await
            .with_context(|| format!("Read cycle {} failed", cycle))?;

        info!(
            "Cycle {}: {} rpm, {} km/h, {} °C, {:.1} V",
            cycle,
            reading.live.rpm,
            reading.live.speed_kmh,
            reading.live.coolant_c,
            reading.live.battery_v
        );
        for dtc in &reading.dtcs {
            warn!("Stored trouble code {}", dtc);
        }

        let location = sink.store(&engine.build_snapshot()).await?;
        info!("Snapshot {} stored at {}", cycle, location);
        stored += 1;
    }

    Ok(stored)
}
