use crate::{
    config::PublishConfig,
    error::{Error, Result},
    external::MediaInfo,
    utils,
};
use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use std::{io::SeekFrom, path::Path, sync::Arc};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    sync::Semaphore,
    task::JoinSet,
};

/// Parts must be a multiple of 1 KiB for the gateway to accept them.
const PART_SIZE: u64 = 512 * 1024;
/// Upper bound on in-flight part uploads, the gateway rate limits beyond it.
const PART_CONCURRENCY: usize = 32;

#[derive(Debug, Serialize)]
struct FinalizeRequest<'a> {
    channel: &'a str,
    file_id: u64,
    file_name: &'a str,
    total_parts: u64,
    caption: &'a str,
    duration: u64,
    width: u32,
    height: u32,
    supports_streaming: bool,
    thumb_file_id: Option<u64>,
}

/// Hands a finished file to the messaging platform gateway: parts first,
/// bounded by [`PART_CONCURRENCY`], then one finalize call carrying the
/// video attributes. Callers treat failures as non fatal, the download
/// pipeline has already succeeded by the time this runs.
pub struct Publisher {
    client: Client,
    config: PublishConfig,
}

impl Publisher {
    pub fn new(client: Client, config: PublishConfig) -> Self {
        Self { client, config }
    }

    pub async fn upload_video(
        &self,
        path: &Path,
        caption: &str,
        info: MediaInfo,
        thumbnail: Option<&Path>,
    ) -> Result<()> {
        let file_id = rand::random::<u64>() >> 1;
        let total_parts = self.upload_parts(path, file_id).await?;

        let thumb_file_id = match thumbnail {
            Some(thumbnail) => {
                let id = rand::random::<u64>() >> 1;
                self.upload_parts(thumbnail, id).await?;
                Some(id)
            }
            None => None,
        };

        let file_name = path
            .file_name()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_owned());

        let response = self
            .client
            .post(format!("{}/send", self.config.gateway))
            .header("x-api-id", self.config.api_id)
            .header("x-api-hash", &self.config.api_hash)
            .header("x-session", &self.config.session)
            .json(&FinalizeRequest {
                channel: &self.config.channel,
                file_id,
                file_name: &file_name,
                total_parts,
                caption,
                duration: info.duration,
                width: info.width,
                height: info.height,
                supports_streaming: true,
                thumb_file_id,
            })
            .send()
            .await
            .map_err(|x| Error::Publish(x.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Publish(format!(
                "gateway answered HTTP {}",
                response.status()
            )));
        }

        info!("Upload complete: {}", caption);
        Ok(())
    }

    async fn upload_parts(&self, path: &Path, file_id: u64) -> Result<u64> {
        let file_size = tokio::fs::metadata(path).await?.len();
        let total_parts = file_size.div_ceil(PART_SIZE);

        debug!(
            "uploading {} ({}) in {} parts",
            path.to_string_lossy(),
            utils::format_bytes(file_size as usize, 2),
            total_parts
        );

        let semaphore = Arc::new(Semaphore::new(PART_CONCURRENCY));
        let mut set = JoinSet::new();

        for part in 0..total_parts {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let endpoint = format!("{}/part", self.config.gateway);
            let path = path.to_owned();

            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|x| Error::Publish(x.to_string()))?;

                let mut file = File::open(&path).await?;
                file.seek(SeekFrom::Start(part * PART_SIZE)).await?;

                let mut chunk = vec![0; PART_SIZE.min(file_size - part * PART_SIZE) as usize];
                file.read_exact(&mut chunk).await?;

                let response = client
                    .post(endpoint)
                    .query(&[
                        ("file_id", file_id.to_string()),
                        ("part", part.to_string()),
                        ("total_parts", total_parts.to_string()),
                    ])
                    .body(chunk)
                    .send()
                    .await
                    .map_err(|x| Error::Publish(x.to_string()))?;

                if !response.status().is_success() {
                    return Err(Error::Publish(format!(
                        "part {} rejected with HTTP {}",
                        part,
                        response.status()
                    )));
                }

                Ok::<_, Error>(())
            });
        }

        while let Some(joined) = set.join_next().await {
            joined.map_err(|x| Error::Publish(x.to_string()))??;
        }

        Ok(total_parts)
    }
}
