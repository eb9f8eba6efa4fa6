mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use camfilter_core::display::PngSink;
use camfilter_core::pipeline::{self, PipelineConfig, RejectPolicy};
use camfilter_core::video::source::{ImageSource, VideoDecoder, VideoSource};
use camfilter_core::PixelTransformer;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Video {
            input,
            output,
            sample_rate,
            max_frames,
            start_frame,
            pass_through_rejected,
            drop_late_frames,
        } => {
            info!(?input, ?output, sample_rate, ?max_frames, start_frame, "starting video filter");

            let config = PipelineConfig {
                max_frames,
                sample_rate,
                on_reject: if pass_through_rejected {
                    RejectPolicy::PassThrough
                } else {
                    RejectPolicy::Drop
                },
                drop_late_frames,
            };

            let mut decoder =
                VideoDecoder::open_at_frame(&input, start_frame).context("failed to open video")?;
            let mut sink = PngSink::new(&output)?;

            let stats = pipeline::run_pipeline(
                &mut decoder,
                &mut sink,
                &PixelTransformer::new(),
                &config,
            )
            .context("pipeline failed")?;

            if stats.presented == 0 {
                warn!("no frames written");
            }

            info!(
                delivered = stats.delivered,
                dropped = stats.dropped,
                rejected = stats.rejected,
                written = sink.written(),
                ?output,
                "video filter complete"
            );

            Ok(())
        }
        cli::Command::Image { input, output } => filter_image(&input, &output),
    }
}

/// Transform one still image and save it to `output`.
fn filter_image(input: &Path, output: &Path) -> Result<()> {
    let mut source = ImageSource::open(input)?;
    let mut frame = source
        .next_frame()?
        .context("image source produced no frame")?;

    PixelTransformer::new()
        .transform(&mut frame)
        .context("failed to filter image")?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).context("failed to create output directory")?;
    }

    frame
        .to_rgba_image()
        .context("filtered frame cannot be converted")?
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(?input, ?output, "image filter complete");
    Ok(())
}
