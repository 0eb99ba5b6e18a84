use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediascope")]
#[command(author, version, about = "Local media metadata extraction and stream export")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe media files and display their metadata
    Probe {
        /// Files to probe, processed one at a time
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a sub-stream or subtitle track from a file
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },

    /// Check that the extraction backends are available
    Backends,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum ExportTarget {
    /// Export a subtitle track as a text file
    Subtitle {
        /// Source media file
        file: PathBuf,

        /// Stream index to export
        #[arg(short, long)]
        stream: u32,

        /// Language tag for the output filename
        #[arg(long)]
        language: Option<String>,

        /// Subtitle codec, used to pick the native output format
        #[arg(long)]
        codec: Option<String>,

        /// Mark the output as a forced track
        #[arg(long)]
        forced: bool,

        /// Directory to write the artifact into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Export a video stream
    Video {
        /// Source media file
        file: PathBuf,

        /// Stream index to export
        #[arg(short, long)]
        stream: u32,

        /// Stream codec, used to pick the output container
        #[arg(long)]
        codec: Option<String>,

        /// Directory to write the artifact into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Export an audio stream
    Audio {
        /// Source media file
        file: PathBuf,

        /// Stream index to export
        #[arg(short, long)]
        stream: u32,

        /// Stream codec, used to pick the output container
        #[arg(long)]
        codec: Option<String>,

        /// Directory to write the artifact into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}
