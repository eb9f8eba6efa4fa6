use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "camfilter", about = "Red-threshold color filter for raw video frames")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Filter every frame of a video file into a directory of PNG images.
    Video {
        /// Path to the input video file (MP4, etc.).
        #[arg(short, long)]
        input: PathBuf,

        /// Directory to write filtered frames to.
        #[arg(short, long)]
        output: PathBuf,

        /// Process every Nth frame (default: 1, every frame).
        #[arg(short, long, default_value_t = 1)]
        sample_rate: u32,

        /// Stop after this many frames have been processed.
        #[arg(long)]
        max_frames: Option<u32>,

        /// Frame number to start decoding from.
        #[arg(long, default_value_t = 0)]
        start_frame: u32,

        /// Write rejected frames unchanged instead of skipping them.
        #[arg(long)]
        pass_through_rejected: bool,

        /// Drop frames that arrive while the previous one is still being processed,
        /// as a live camera feed would.
        #[arg(long)]
        drop_late_frames: bool,
    },

    /// Filter a single still image.
    Image {
        /// Path to the input image.
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the filtered image to.
        #[arg(short, long)]
        output: PathBuf,
    },
}
