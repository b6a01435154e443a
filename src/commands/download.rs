use crate::{
    config::Config,
    logger,
    pipeline::{Pipeline, PipelineOptions},
    selector::{AudioBitrate, Resolution},
};
use anyhow::Result;
use clap::Args;
use log::{error, warn};
use std::{path::PathBuf, sync::atomic::Ordering};

/// Download a catalog item.
#[derive(Debug, Clone, Args)]
pub struct Download {
    /// The unique identifier of the media item to download. This id is used
    /// to locate and retrieve the specific media file or representation.
    #[arg(long, value_name = "ID")]
    pub item_id: String,

    /// Media representation resolution to download.
    #[arg(long, default_value = "1920x1080")]
    pub resolution: Resolution,

    /// Audio bitrate representation to download.
    #[arg(long, default_value = "128k")]
    pub audio: AudioBitrate,

    /// Maximum number of parallel segment downloads.
    /// Number of threads should be in range 1-16 (inclusive).
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub threads: u8,

    /// Maximum number of retries to download an individual segment.
    #[arg(long, default_value_t = 5, help_heading = "Download Options")]
    pub retries: u8,

    /// Change directory path for downloaded files.
    #[arg(short, long, default_value = "downloads", help_heading = "Download Options")]
    pub directory: PathBuf,

    /// Save the muxed file to this exact path instead of the item's output
    /// directory. Ignored for collections.
    #[arg(short, long, help_heading = "Download Options")]
    pub output: Option<PathBuf>,

    /// Children to process when the item is a collection,
    /// 0-based and end exclusive.
    #[arg(long, value_name = "START:END", value_parser = range_parser, help_heading = "Download Options")]
    pub range: Option<(usize, usize)>,

    /// Publish the muxed file to the configured messaging channel.
    #[arg(long, help_heading = "Publish Options")]
    pub publish: bool,

    /// Include debug output with source locations.
    #[arg(long)]
    pub verbose: bool,
}

impl Download {
    pub async fn execute(self) -> Result<()> {
        logger::init(self.verbose);

        let config = Config::from_env()?;

        if self.publish && config.publish.is_none() {
            warn!(
                "--publish has no effect without the DARYA_API_ID, DARYA_API_HASH, \
                DARYA_SESSION and DARYA_CHANNEL variables."
            );
        }

        let pipeline = Pipeline::new(
            config,
            PipelineOptions {
                resolution: self.resolution,
                audio: self.audio,
                threads: self.threads as usize,
                retries: self.retries,
                download_dir: self.directory,
                output: self.output,
                range: self.range,
                publish: self.publish,
            },
        )?;

        let abort = pipeline.abort_flag();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && !abort.swap(true, Ordering::SeqCst) {
                warn!("Ctrl+C received, stopping gracefully.");
            }

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Ctrl+C received, force exiting.");
                std::process::exit(1);
            }
        });

        pipeline.run(&self.item_id).await?;
        Ok(())
    }
}

fn range_parser(s: &str) -> Result<(usize, usize), String> {
    let Some((start, end)) = s.split_once(':') else {
        return Err("expected START:END (eg. 0:5).".to_owned());
    };

    let start = start
        .parse::<usize>()
        .map_err(|_| "could not parse range START.".to_owned())?;
    let end = end
        .parse::<usize>()
        .map_err(|_| "could not parse range END.".to_owned())?;

    if start >= end {
        return Err("range START must be smaller than END.".to_owned());
    }

    Ok((start, end))
}
