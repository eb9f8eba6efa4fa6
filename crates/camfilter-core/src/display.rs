use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::video::frame::Frame;

/// Receives transformed frames for presentation.
pub trait FrameSink {
    fn present(&mut self, frame: &Frame) -> Result<()>;
}

/// Writes each presented frame as `frame_{number:08}.png` into a directory.
pub struct PngSink {
    dir: PathBuf,
    written: usize,
}

impl PngSink {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        info!(?dir, "output directory ready");
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn frame_path(&self, frame_number: u32) -> PathBuf {
        self.dir.join(format!("frame_{frame_number:08}.png"))
    }
}

impl FrameSink for PngSink {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        let img = frame
            .to_rgba_image()
            .with_context(|| format!("frame {} cannot be displayed", frame.frame_number))?;

        let path = self.frame_path(frame.frame_number);
        img.save(&path)
            .with_context(|| format!("failed to save frame to {}", path.display()))?;

        self.written += 1;
        debug!(?path, "saved frame");
        Ok(())
    }
}

/// Discards frames, counting them.
#[derive(Debug, Default)]
pub struct NullSink {
    pub presented: usize,
}

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &Frame) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}
