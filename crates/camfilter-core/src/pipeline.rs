use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info, warn};

use crate::display::FrameSink;
use crate::error::TransformError;
use crate::transform::PixelTransformer;
use crate::video::frame::Frame;
use crate::video::source::VideoSource;

/// What to do with a frame the transformer rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Skip the frame; nothing is presented for it.
    #[default]
    Drop,
    /// Present the frame with its bytes unchanged.
    PassThrough,
}

/// Parameters for the processing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of frames to transform, or None for the entire source.
    pub max_frames: Option<u32>,
    /// Process only frames whose number is a multiple of this (1 = every frame).
    pub sample_rate: u32,
    pub on_reject: RejectPolicy,
    /// Drop a captured frame when the previous one is still waiting to be processed.
    /// When false, capture waits for the slot instead.
    pub drop_late_frames: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_frames: None,
            sample_rate: 1,
            on_reject: RejectPolicy::Drop,
            drop_late_frames: true,
        }
    }
}

/// Frame counts for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames produced by the source.
    pub delivered: u32,
    /// Frames discarded because the hand-off slot was occupied.
    pub dropped: u32,
    /// Frames not on the sampling grid.
    pub skipped: u32,
    pub transformed: u32,
    pub rejected: u32,
    pub presented: u32,
}

/// Result of running one frame through the transformer.
#[derive(Debug)]
pub enum FrameOutcome {
    Transformed(Frame),
    /// Rejected, but kept unchanged for display.
    PassedThrough(Frame, TransformError),
    Dropped(TransformError),
}

impl FrameOutcome {
    /// The frame to present, if any.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            FrameOutcome::Transformed(frame) | FrameOutcome::PassedThrough(frame, _) => Some(frame),
            FrameOutcome::Dropped(_) => None,
        }
    }
}

/// Transform one frame and apply the reject policy.
pub fn process_frame(
    transformer: &PixelTransformer,
    mut frame: Frame,
    policy: RejectPolicy,
) -> FrameOutcome {
    match transformer.transform(&mut frame) {
        Ok(()) => FrameOutcome::Transformed(frame),
        Err(e) => match policy {
            RejectPolicy::Drop => FrameOutcome::Dropped(e),
            RejectPolicy::PassThrough => FrameOutcome::PassedThrough(frame, e),
        },
    }
}

/// Sending half of the single-slot hand-off between capture and processing.
pub struct SlotSender {
    tx: SyncSender<Frame>,
    drop_late: bool,
}

/// Outcome of offering a frame to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// The slot was occupied and the frame was discarded.
    Dropped,
    /// The processing side has gone away.
    Closed,
}

impl SlotSender {
    pub fn offer(&self, frame: Frame) -> Offer {
        if !self.drop_late {
            return match self.tx.send(frame) {
                Ok(()) => Offer::Accepted,
                Err(_) => Offer::Closed,
            };
        }
        match self.tx.try_send(frame) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(_)) => Offer::Dropped,
            Err(TrySendError::Disconnected(_)) => Offer::Closed,
        }
    }
}

/// A hand-off holding at most one frame in flight.
pub fn frame_slot(drop_late: bool) -> (SlotSender, Receiver<Frame>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (SlotSender { tx, drop_late }, rx)
}

/// Pull frames from `source`, transform them, and present them on `sink`.
///
/// Capture and presentation each run on their own thread; the transform runs on the
/// calling thread. Frames stay in source order end to end.
pub fn run_pipeline(
    source: &mut (dyn VideoSource + Send),
    sink: &mut (dyn FrameSink + Send),
    transformer: &PixelTransformer,
    config: &PipelineConfig,
) -> Result<PipelineStats> {
    if config.sample_rate < 1 {
        bail!("sample_rate must be >= 1, got {}", config.sample_rate);
    }

    info!(
        width = source.width(),
        height = source.height(),
        max_frames = ?config.max_frames,
        sample_rate = config.sample_rate,
        on_reject = ?config.on_reject,
        drop_late_frames = config.drop_late_frames,
        "pipeline starting"
    );

    let (slot_tx, slot_rx) = frame_slot(config.drop_late_frames);
    let (present_tx, present_rx) = mpsc::channel::<Frame>();

    thread::scope(|s| {
        let capture = s.spawn(move || capture_frames(source, slot_tx));
        let presenter = s.spawn(move || present_frames(sink, present_rx));

        let mut stats = process_frames(transformer, config, slot_rx, present_tx);

        let (delivered, dropped) = capture
            .join()
            .map_err(|_| anyhow!("capture thread panicked"))??;
        let presented = presenter
            .join()
            .map_err(|_| anyhow!("presentation thread panicked"))??;

        stats.delivered = delivered;
        stats.dropped = dropped;
        stats.presented = presented;

        info!(?stats, "pipeline complete");
        Ok(stats)
    })
}

fn capture_frames(source: &mut (dyn VideoSource + Send), slot: SlotSender) -> Result<(u32, u32)> {
    let mut delivered = 0;
    let mut dropped = 0;

    while let Some(frame) = source.next_frame()? {
        delivered += 1;
        let frame_number = frame.frame_number;
        match slot.offer(frame) {
            Offer::Accepted => {}
            Offer::Dropped => {
                dropped += 1;
                warn!(frame_number, "processing busy, dropping late frame");
            }
            Offer::Closed => {
                debug!(frame_number, "processing finished, stopping capture");
                break;
            }
        }
    }

    Ok((delivered, dropped))
}

/// Drains the slot until the source ends, `max_frames` is reached, or presentation stops.
fn process_frames(
    transformer: &PixelTransformer,
    config: &PipelineConfig,
    slot: Receiver<Frame>,
    present: mpsc::Sender<Frame>,
) -> PipelineStats {
    let mut stats = PipelineStats::default();

    loop {
        if let Some(max) = config.max_frames {
            if stats.transformed + stats.rejected >= max {
                break;
            }
        }

        let Ok(frame) = slot.recv() else {
            break;
        };

        if frame.frame_number % config.sample_rate != 0 {
            stats.skipped += 1;
            continue;
        }

        debug!(frame_number = frame.frame_number, "processing frame");

        let outcome = process_frame(transformer, frame, config.on_reject);
        match &outcome {
            FrameOutcome::Transformed(_) => stats.transformed += 1,
            FrameOutcome::PassedThrough(..) | FrameOutcome::Dropped(_) => stats.rejected += 1,
        }

        if let Some(frame) = outcome.into_frame() {
            if present.send(frame).is_err() {
                warn!("presentation stopped, ending processing");
                break;
            }
        }
    }

    stats
}

fn present_frames(sink: &mut (dyn FrameSink + Send), frames: Receiver<Frame>) -> Result<u32> {
    let mut presented = 0;
    for frame in frames {
        sink.present(&frame)?;
        presented += 1;
    }
    Ok(presented)
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::display::NullSink;
    use crate::video::frame::PixelFormat;
    use crate::video::source::MemorySource;

    fn frame(n: u32, data: Vec<u8>) -> Frame {
        let mut f = Frame::packed_bgra(1, 1, data);
        f.frame_number = n;
        f
    }

    fn lossless() -> PipelineConfig {
        PipelineConfig {
            drop_late_frames: false,
            ..PipelineConfig::default()
        }
    }

    /// Records every presented frame.
    #[derive(Default)]
    struct CollectSink {
        frames: Vec<Frame>,
    }

    impl FrameSink for CollectSink {
        fn present(&mut self, frame: &Frame) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn present(&mut self, _frame: &Frame) -> Result<()> {
            bail!("display unavailable")
        }
    }

    struct FailingSource;

    impl VideoSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            bail!("camera disconnected")
        }

        fn width(&self) -> u32 {
            0
        }

        fn height(&self) -> u32 {
            0
        }
    }

    #[test]
    fn frames_are_transformed_in_order() {
        let mut source = MemorySource::new(vec![
            frame(0, vec![10, 200, 10, 255]),
            frame(1, vec![50, 20, 200, 128]),
            frame(2, vec![1, 2, 3, 4]),
        ]);
        let mut sink = CollectSink::default();

        let stats =
            run_pipeline(&mut source, &mut sink, &PixelTransformer::new(), &lossless()).unwrap();

        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.transformed, 3);
        assert_eq!(stats.presented, 3);
        let numbers: Vec<u32> = sink.frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(sink.frames[0].data, vec![200, 10, 10, 255]);
        assert_eq!(sink.frames[1].data, vec![255, 0, 0, 128]);
        assert_eq!(sink.frames[2].data, vec![2, 3, 1, 4]);
    }

    #[test]
    #[traced_test]
    fn rejected_frame_is_dropped_by_default() {
        let mut bad = frame(1, vec![1, 2, 3, 4]);
        bad.format = PixelFormat::Rgba8;
        let mut source = MemorySource::new(vec![frame(0, vec![1, 2, 3, 4]), bad]);
        let mut sink = CollectSink::default();

        let stats =
            run_pipeline(&mut source, &mut sink, &PixelTransformer::new(), &lossless()).unwrap();

        assert_eq!(stats.transformed, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.presented, 1);
        assert_eq!(sink.frames[0].frame_number, 0);
    }

    #[test]
    fn rejected_frame_passes_through_unchanged() {
        // Declares 2 rows but holds one.
        let mut short = Frame::packed_bgra(1, 2, vec![1, 2, 3, 4]);
        short.frame_number = 0;
        let mut source = MemorySource::new(vec![short]);
        let mut sink = CollectSink::default();
        let config = PipelineConfig {
            on_reject: RejectPolicy::PassThrough,
            ..lossless()
        };

        let stats =
            run_pipeline(&mut source, &mut sink, &PixelTransformer::new(), &config).unwrap();

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.presented, 1);
        assert_eq!(sink.frames[0].data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn sample_rate_skips_off_grid_frames() {
        let frames = (0..6).map(|n| frame(n, vec![0; 4])).collect();
        let mut source = MemorySource::new(frames);
        let mut sink = CollectSink::default();
        let config = PipelineConfig {
            sample_rate: 3,
            ..lossless()
        };

        let stats =
            run_pipeline(&mut source, &mut sink, &PixelTransformer::new(), &config).unwrap();

        assert_eq!(stats.skipped, 4);
        let numbers: Vec<u32> = sink.frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 3]);
    }

    #[test]
    fn max_frames_caps_processing() {
        let frames = (0..10).map(|n| frame(n, vec![0; 4])).collect();
        let mut source = MemorySource::new(frames);
        let mut sink = NullSink::default();
        let config = PipelineConfig {
            max_frames: Some(4),
            ..lossless()
        };

        let stats =
            run_pipeline(&mut source, &mut sink, &PixelTransformer::new(), &config).unwrap();

        assert_eq!(stats.transformed, 4);
        assert_eq!(sink.presented, 4);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut source = MemorySource::new(Vec::new());
        let mut sink = NullSink::default();
        let config = PipelineConfig {
            sample_rate: 0,
            ..PipelineConfig::default()
        };
        assert!(run_pipeline(&mut source, &mut sink, &PixelTransformer::new(), &config).is_err());
    }

    #[test]
    fn source_error_is_propagated() {
        let mut sink = NullSink::default();
        let err = run_pipeline(
            &mut FailingSource,
            &mut sink,
            &PixelTransformer::new(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("camera disconnected"));
    }

    #[test]
    fn sink_error_is_propagated() {
        let frames = (0..3).map(|n| frame(n, vec![0; 4])).collect();
        let mut source = MemorySource::new(frames);
        let err = run_pipeline(
            &mut source,
            &mut FailingSink,
            &PixelTransformer::new(),
            &lossless(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("display unavailable"));
    }

    #[test]
    fn occupied_slot_drops_late_frame() {
        let (tx, rx) = frame_slot(true);
        assert_eq!(tx.offer(frame(0, vec![0; 4])), Offer::Accepted);
        assert_eq!(tx.offer(frame(1, vec![0; 4])), Offer::Dropped);

        assert_eq!(rx.recv().unwrap().frame_number, 0);
        assert!(rx.try_recv().is_err());

        assert_eq!(tx.offer(frame(2, vec![0; 4])), Offer::Accepted);
        drop(rx);
        assert_eq!(tx.offer(frame(3, vec![0; 4])), Offer::Closed);
    }

    #[test]
    fn process_frame_applies_policy() {
        let transformer = PixelTransformer::new();
        let bad = Frame::new(1, 1, 3, PixelFormat::Rgb8, vec![1, 2, 3]);

        let outcome = process_frame(&transformer, bad.clone(), RejectPolicy::Drop);
        assert!(matches!(
            outcome,
            FrameOutcome::Dropped(TransformError::UnsupportedFormat(PixelFormat::Rgb8))
        ));

        let outcome = process_frame(&transformer, bad, RejectPolicy::PassThrough);
        let passed = outcome.into_frame().unwrap();
        assert_eq!(passed.data, vec![1, 2, 3]);
    }
}
