use crate::{
    assembler,
    catalog::{CatalogClient, MediaItem},
    config::Config,
    dash::{self, Representation},
    error::{Error, Result},
    external,
    fetcher::{FetchResult, SegmentFetcher, SegmentTask},
    keys::KeyClient,
    layout::WorkspaceLayout,
    progress::Progress,
    publish::Publisher,
    selector::{self, AudioBitrate, Resolution},
};
use colored::Colorize;
use log::{debug, error, info, warn};
use reqwest::{Client, Url};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::fs;

/// Per item progression. Every transition requires the previous stage to
/// have succeeded, failures are reported together with the stage they
/// interrupted.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Resolving,
    ManifestFetched,
    RepresentationsSelected,
    SegmentsFetched,
    Assembled,
    Decrypted,
    Muxed,
    Published,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Resolving => "resolving the item",
                Self::ManifestFetched => "fetching manifests",
                Self::RepresentationsSelected => "selecting representations",
                Self::SegmentsFetched => "fetching segments",
                Self::Assembled => "assembling streams",
                Self::Decrypted => "decrypting streams",
                Self::Muxed => "muxing",
                Self::Published => "publishing",
            }
        )
    }
}

pub struct PipelineOptions {
    pub resolution: Resolution,
    pub audio: AudioBitrate,
    pub threads: usize,
    pub retries: u8,
    pub download_dir: PathBuf,
    pub output: Option<PathBuf>,
    pub range: Option<(usize, usize)>,
    pub publish: bool,
}

/// Drives the whole flow for one catalog item or, for collections, a queue
/// of child items processed sequentially by this same value. Each child gets
/// its own directory tree, a failing child is logged and the batch
/// continues.
pub struct Pipeline {
    client: Client,
    config: Config,
    options: PipelineOptions,
    catalog: CatalogClient,
    keys: KeyClient,
    abort: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: Config, options: PipelineOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            catalog: CatalogClient::new(client.clone(), &config.catalog_base, &config.images_base),
            keys: KeyClient::new(client.clone(), &config.key_service, &config.license_base),
            abort: Arc::new(AtomicBool::new(false)),
            client,
            config,
            options,
        })
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub async fn run(&self, item_id: &str) -> Result<()> {
        for bin in ["mp4decrypt", "ffmpeg"] {
            if crate::utils::find_executable(bin).is_none() {
                return Err(Error::MissingExecutable(bin.to_owned()));
            }
        }

        let item = self.catalog.item(item_id).await?;

        if item.is_collection() {
            self.run_collection(&item).await
        } else {
            let mut stage = Stage::Resolving;

            self.run_item(&item, &mut stage).await.map(|_| ()).inspect_err(|x| {
                error!(
                    "{} failed while {}: {}",
                    item.id.bold(),
                    stage,
                    x
                );
            })
        }
    }

    async fn run_collection(&self, item: &MediaItem) -> Result<()> {
        let children = item.children.as_deref().unwrap_or_default();
        let (start, end) = match self.options.range {
            Some((start, end)) => (start.min(children.len()), end.min(children.len())),
            None => (0, children.len()),
        };

        if start >= end {
            return Err(Error::NotFound(format!(
                "children in range {}:{} of {:?}",
                start, end, item.id
            )));
        }

        if self.options.output.is_some() {
            warn!("--output is ignored for collections.");
        }

        let selected = &children[start..end];
        let mut downloaded = 0;

        for (idx, child) in selected.iter().enumerate() {
            if self.abort.load(Ordering::SeqCst) {
                warn!("Skipping remaining {} items.", selected.len() - idx);
                break;
            }

            info!(
                "Downloading {} ({}/{})",
                child.id.bold(),
                idx + 1,
                selected.len()
            );

            let mut stage = Stage::Resolving;
            let outcome = match self.catalog.item(&child.id).await {
                Ok(child_item) => self.run_item(&child_item, &mut stage).await,
                Err(x) => Err(x),
            };

            match outcome {
                Ok(output) => {
                    downloaded += 1;
                    info!("Finished {}", output.to_string_lossy());
                }
                Err(x) => error!("{} failed while {}: {}", child.id.bold(), stage, x),
            }
        }

        if downloaded == 0 {
            return Err(Error::NotFound(format!(
                "any downloadable child of {:?}",
                item.id
            )));
        }

        Ok(())
    }

    /// Runs one playable item start to finish and returns the muxed file.
    async fn run_item(&self, item: &MediaItem, stage: &mut Stage) -> Result<PathBuf> {
        let layout = WorkspaceLayout::new(
            &self.options.download_dir,
            &item.id,
            self.options.resolution,
            self.options.audio,
        );
        layout.ensure()?;

        self.save_artwork(item, &layout).await;

        let manifests = self.download_manifests(item, &layout).await?;
        advance(stage, Stage::ManifestFetched);

        if item.media_id.is_empty() {
            return Err(Error::NotFound(format!("mediaID on {:?}", item.id)));
        }

        let base_url = format!("{}/{}.ism/", self.config.media_base, item.media_id)
            .parse::<Url>()
            .map_err(|x| Error::Parse(format!("invalid media base url ({x})")))?;

        let (video, audio) = self.resolve_representations(&manifests, &base_url).await?;
        advance(stage, Stage::RepresentationsSelected);

        let license_url = self.keys.license_url(Some(&item.id), None);

        let video_file = self
            .process_representation(
                &video,
                &layout.video_dir,
                &layout.encrypted_video_file(),
                &layout.video_file(),
                &layout,
                &license_url,
                stage,
            )
            .await?;
        let audio_file = self
            .process_representation(
                &audio,
                &layout.audio_dir,
                &layout.encrypted_audio_file(),
                &layout.audio_file(),
                &layout,
                &license_url,
                stage,
            )
            .await?;

        // Both elementary streams must be on disk before ffmpeg runs, an
        // incomplete pair is never muxed.
        for stream in [&video_file, &audio_file] {
            if !fs::try_exists(stream).await? {
                return Err(Error::NotFound(format!(
                    "elementary stream {:?}",
                    stream.to_string_lossy()
                )));
            }
        }

        let output = match &self.options.output {
            Some(output) => output.clone(),
            None => layout.output_file(item.display_title()),
        };

        external::mux(&video_file, &audio_file, &output).await?;
        advance(stage, Stage::Muxed);

        if self.options.publish {
            self.publish(item, &output, &layout).await;
            advance(stage, Stage::Published);
        }

        Ok(output)
    }

    /// Fetches every manifest of the item into the `mpds` cache, skipping
    /// files that are already on disk.
    async fn download_manifests(
        &self,
        item: &MediaItem,
        layout: &WorkspaceLayout,
    ) -> Result<Vec<PathBuf>> {
        if item.media.mpds.is_empty() {
            return Err(Error::NotFound(format!("manifest urls on {:?}", item.id)));
        }

        let mut paths = vec![];

        for mpd in &item.media.mpds {
            let filename = mpd
                .split('?')
                .next()
                .unwrap_or(mpd)
                .rsplit('/')
                .next()
                .filter(|x| !x.is_empty())
                .unwrap_or("manifest.mpd");
            let path = layout.manifest_file(filename);

            if !fs::try_exists(&path).await? {
                debug!("fetching manifest {}", mpd);
                let response = self.client.get(mpd).send().await?;

                if !response.status().is_success() {
                    return Err(Error::NotFound(format!("manifest {:?}", mpd)));
                }

                let text = response.text().await?;
                fs::write(&path, &text).await.map_err(|source| Error::Write {
                    path: path.clone(),
                    source,
                })?;
            }

            paths.push(path);
        }

        Ok(paths)
    }

    /// Picks the manifest candidates whose filename carries the requested
    /// resolution and tries them in order until one yields exactly one video
    /// and one audio representation. Only exhaustion of every candidate
    /// fails the item.
    async fn resolve_representations(
        &self,
        manifests: &[PathBuf],
        base_url: &Url,
    ) -> Result<(Representation, Representation)> {
        let wanted = self.options.resolution.to_string();
        let candidates = manifests
            .iter()
            .filter(|x| x.file_name().is_some_and(|x| x.to_string_lossy().contains(&wanted)))
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            return Err(Error::NotFound(format!("manifest matching {:?}", wanted)));
        }

        let mut last_selection_error = None;

        for candidate in candidates {
            let text = fs::read_to_string(candidate).await?;
            let representations = dash::parse(&text, base_url)?;

            match selector::select(&representations, self.options.resolution, self.options.audio) {
                Ok(selection) => {
                    debug!("selected manifest {}", candidate.to_string_lossy());
                    return Ok((selection.video.clone(), selection.audio.clone()));
                }
                Err(x @ Error::Selection { .. }) => {
                    warn!("{}: {}", candidate.to_string_lossy(), x);
                    last_selection_error = Some(x);
                }
                Err(x) => return Err(x),
            }
        }

        Err(last_selection_error.unwrap_or_else(|| {
            Error::NotFound(format!("representations matching {:?}", wanted))
        }))
    }

    /// Downloads, assembles and decrypts one representation, returning the
    /// readable elementary stream. A file already decrypted on a previous
    /// run short-circuits everything.
    #[allow(clippy::too_many_arguments)]
    async fn process_representation(
        &self,
        representation: &Representation,
        segments_dir: &Path,
        encrypted_file: &Path,
        decrypted_file: &Path,
        layout: &WorkspaceLayout,
        license_url: &str,
        stage: &mut Stage,
    ) -> Result<PathBuf> {
        if fs::try_exists(decrypted_file).await? {
            info!(
                "Reusing previously decrypted {}",
                decrypted_file.to_string_lossy()
            );
            return Ok(decrypted_file.to_owned());
        }

        if representation.segments.is_empty() {
            return Err(Error::IncompleteStream {
                position: 0,
                total: 0,
            });
        }

        let pssh = representation.pssh.as_deref().ok_or_else(|| {
            Error::KeyExchange(format!(
                "representation {} carries no content protection data",
                representation.id
            ))
        })?;
        let key = self.keys.exchange(pssh, license_url).await?;
        self.save_license(&representation.id, &key, layout).await;

        let init_path = match &representation.init_url {
            Some(init_url) => Some(self.download_init(init_url, segments_dir).await?),
            None => None,
        };

        info!(
            "Downloading {} segments of representation {}",
            representation.segments.len(),
            representation.id.bold()
        );

        let fetcher = SegmentFetcher::new(
            self.client.clone(),
            self.options.threads,
            self.options.retries,
            self.abort.clone(),
        );
        let tasks = representation
            .segments
            .iter()
            .enumerate()
            .map(|(position, url)| SegmentTask::new(position, url.clone(), segments_dir))
            .collect::<Vec<_>>();
        let results = fetcher
            .fetch(
                tasks,
                Progress::new(&representation.id, representation.segments.len()),
            )
            .await;
        advance(stage, Stage::SegmentsFetched);

        log_fetch_failures(&results);

        assembler::assemble(init_path.as_deref(), &results, encrypted_file).await?;
        advance(stage, Stage::Assembled);

        external::decrypt(&key, encrypted_file, decrypted_file).await?;
        advance(stage, Stage::Decrypted);

        Ok(decrypted_file.to_owned())
    }

    async fn download_init(&self, url: &Url, directory: &Path) -> Result<PathBuf> {
        let task = SegmentTask::new(0, url.clone(), directory);

        if fs::try_exists(&task.path).await? {
            return Ok(task.path);
        }

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(Error::NotFound(format!("init segment {:?}", url.as_str())));
        }

        let bytes = response.bytes().await?;
        fs::write(&task.path, &bytes)
            .await
            .map_err(|source| Error::Write {
                path: task.path.clone(),
                source,
            })?;

        Ok(task.path)
    }

    /// Artwork and license records are conveniences, their failures never
    /// stop the pipeline.
    async fn save_artwork(&self, item: &MediaItem, layout: &WorkspaceLayout) {
        if let Some(thumbnail) = &item.thumbnail {
            if let Err(x) = self
                .catalog
                .save_image(thumbnail, &layout.thumbnail_file())
                .await
            {
                warn!("couldn't save thumbnail: {}", x);
            }
        }

        if let Some(background) = &item.background {
            if let Err(x) = self
                .catalog
                .save_image(background, &layout.background_file(background))
                .await
            {
                warn!("couldn't save background: {}", x);
            }
        }
    }

    async fn save_license(&self, representation_id: &str, key: &str, layout: &WorkspaceLayout) {
        let path = layout
            .license_dir
            .join(format!("{}.key", representation_id));

        if let Err(x) = fs::write(&path, key).await {
            warn!("couldn't record key in {}: {}", path.to_string_lossy(), x);
        }
    }

    async fn publish(&self, item: &MediaItem, output: &Path, layout: &WorkspaceLayout) {
        let Some(publish_config) = self.config.publish.clone() else {
            warn!("--publish requires the DARYA_API_ID/DARYA_API_HASH/DARYA_SESSION/DARYA_CHANNEL variables.");
            return;
        };

        let outcome = async {
            let info = external::probe(output).await?;
            let thumbnail = layout.thumbnail_file();
            let thumbnail = fs::try_exists(&thumbnail)
                .await
                .unwrap_or(false)
                .then_some(thumbnail);

            Publisher::new(self.client.clone(), publish_config)
                .upload_video(output, item.display_title(), info, thumbnail.as_deref())
                .await
        }
        .await;

        if let Err(x) = outcome {
            warn!("couldn't publish {}: {}", output.to_string_lossy(), x);
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("stage: {} done, now {}", stage, next);
    *stage = next;
}

fn log_fetch_failures(results: &[FetchResult]) {
    for result in results {
        if let Err(x) = &result.outcome {
            error!("{}", x);
        }
    }
}
