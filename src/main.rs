//! mic-level - Real-time microphone loudness meter
//!
//! Captures the default microphone and prints the dB level of every
//! 1024-sample block until interrupted with Ctrl-C.

mod audio;
mod level;
mod output;
mod pipeline;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout only carries readings
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mic_level=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("mic-level v{}", env!("CARGO_PKG_VERSION"));

    let stream = audio::AudioStream::open().context("failed to open microphone")?;
    stream.start().context("failed to start audio capture")?;
    tracing::debug!("Capture config: {:?}", stream.config());

    println!("Listening for audio...");

    let (stop_tx, mut stop_rx) = mpsc::channel(1);
    pipeline::spawn_interrupt_listener(stop_tx);

    let mut meter = pipeline::MeterPipeline::new(
        stream,
        output::ConsoleSink::stdout(),
        pipeline::PipelineConfig::default(),
    );
    let result = meter.run(&mut stop_rx).await;
    tracing::debug!(
        "Meter {:?} after {} readings",
        meter.status(),
        meter.readings()
    );
    result.context("metering stopped on error")?;

    Ok(())
}
