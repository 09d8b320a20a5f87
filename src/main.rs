// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use lane_pilot::frame_source::{open_source, FrameSource, SourceKind};
use lane_pilot::pipeline::{FrameContext, LanePipeline, MetricsSummary, PipelineMetrics};
use lane_pilot::transport::{run_relay, ImagePayload, UdpTelemetrySender};
use lane_pilot::{Config, PipelineError};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const FRAME_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Camera lane follower and telemetry relay
#[derive(Parser)]
#[command(name = "lane-pilot", version, long_about = None)]
struct Cli {
    /// YAML config; tuned defaults are used when the file is missing
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, steer, and stream telemetry to the relay
    Robot {
        /// Replay images from this directory instead of the configured source
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// Receive robot telemetry and forward it to the operator console
    Relay,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_found) = Config::load_or_default(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if config_found {
        info!("✓ Configuration loaded from {}", cli.config.display());
    } else {
        warn!("Config {} not found, using defaults", cli.config.display());
    }

    let run = async {
        match cli.command {
            Commands::Robot { replay } => {
                if let Some(dir) = replay {
                    config.source.kind = SourceKind::Replay;
                    config.source.replay_dir = dir;
                }
                run_robot(&config).await
            }
            Commands::Relay => run_relay(config.relay.clone(), PipelineMetrics::new()).await,
        }
    };

    tokio::select! {
        result = run => {
            if let Err(e) = &result {
                error!("Stopped: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
    }
}

async fn run_robot(config: &Config) -> Result<()> {
    info!("🚗 Lane pilot starting");
    info!(
        "Control: gain={:.2} max_angle={:.0} speed {:.0}-{:.0} accel={:.2}/frame",
        config.steering.gain,
        config.steering.max_angle,
        config.speed.min_speed,
        config.speed.max_speed,
        config.speed.acceleration_rate
    );

    let mut source = open_source(&config.source)?;
    let metrics = PipelineMetrics::new();
    let mut pipeline = LanePipeline::new(config)?.with_metrics(metrics.clone());
    let sender = UdpTelemetrySender::connect(&config.transport).await?;

    let frame_interval = Duration::from_secs_f64(1.0 / config.transport.target_fps.max(1) as f64);
    let report_every = config.metrics.report_every_frames;
    let quality = config.transport.jpeg_quality;

    loop {
        let started = Instant::now();

        let ctx = match next_step(source.as_mut(), &mut pipeline) {
            FrameStep::Ready(ctx) => ctx,
            FrameStep::Exhausted => {
                info!("Frame source exhausted");
                break;
            }
            FrameStep::Pending => {
                debug!("No frame available, retrying");
                tokio::time::sleep(FRAME_RETRY_DELAY).await;
                continue;
            }
            FrameStep::SourceFailed(e) => {
                warn!("Frame source error: {:#}", e);
                tokio::time::sleep(FRAME_RETRY_DELAY).await;
                continue;
            }
            FrameStep::PipelineFailed(e) => {
                error!("Pipeline failed: {}", e);
                continue;
            }
        };

        let packet = match ctx
            .robot_packet()
            .with_images(&ctx.frame.image, &ctx.annotated, quality)
        {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Frame {}: {}, sending telemetry only", ctx.frame_id, e);
                ctx.robot_packet()
            }
        };

        match sender.send(&packet).await {
            Ok(images) => {
                metrics.inc(&metrics.datagrams_sent);
                if packet.has_images() && images != ImagePayload::Both {
                    metrics.inc(&metrics.images_dropped);
                }
            }
            Err(e) => {
                metrics.inc(&metrics.datagrams_failed);
                warn!("Telemetry send failed: {:#}", e);
            }
        }

        let summary = metrics.summary();
        if report_every > 0 && summary.total_frames % report_every == 0 {
            log_summary(&summary);
        }

        let elapsed = started.elapsed();
        if elapsed < frame_interval {
            tokio::time::sleep(frame_interval - elapsed).await;
        }
    }

    log_summary(&metrics.summary());
    Ok(())
}

enum FrameStep {
    Ready(Box<FrameContext>),
    Pending,
    Exhausted,
    SourceFailed(anyhow::Error),
    PipelineFailed(PipelineError),
}

/// Capture and process one frame. Camera reads and the pipeline both block,
/// so they run under `block_in_place` (multi-threaded runtime only).
fn next_step(source: &mut dyn FrameSource, pipeline: &mut LanePipeline) -> FrameStep {
    tokio::task::block_in_place(|| match source.next_frame() {
        Ok(Some(frame)) => match pipeline.process(frame) {
            Ok(ctx) => FrameStep::Ready(Box::new(ctx)),
            Err(e) => FrameStep::PipelineFailed(e),
        },
        Ok(None) if source.is_exhausted() => FrameStep::Exhausted,
        Ok(None) => FrameStep::Pending,
        Err(e) => FrameStep::SourceFailed(e),
    })
}

fn log_summary(summary: &MetricsSummary) {
    info!(
        "📊 {} frames @ {:.1} FPS | lane {:.1}% ({} losses) | sent {} failed {} images dropped {} | last frame {} µs",
        summary.total_frames,
        summary.fps,
        100.0 * summary.lane_ratio(),
        summary.lane_loss_events,
        summary.datagrams_sent,
        summary.datagrams_failed,
        summary.images_dropped,
        summary.last_pipeline_us
    );
}
