mod download;

pub use download::Download;

use clap::{Parser, Subcommand};

/// Download, decrypt and mux DRM protected MPEG-DASH catalog items.
#[derive(Debug, Clone, Parser)]
#[command(version, author = "clitic <clitic21@gmail.com>", about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Download(Download),
}
