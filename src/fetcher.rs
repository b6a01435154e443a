use crate::{
    error::{Error, Result},
    progress::Progress,
};
use log::debug;
use reqwest::{Client, StatusCode, Url};
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{fs, io::AsyncWriteExt, task::JoinSet};

/// A single unit of download work. `position` is the segment's index within
/// its representation's ordered segment list and the only correlation key
/// between submission and completion.
#[derive(Debug, Clone)]
pub struct SegmentTask {
    pub position: usize,
    pub url: Url,
    pub path: PathBuf,
}

impl SegmentTask {
    /// Derives the destination file from the url's last path component, the
    /// `$Time$` substitution makes those unique within a representation.
    pub fn new(position: usize, url: Url, directory: &Path) -> Self {
        let filename = url
            .path_segments()
            .and_then(|mut x| x.next_back())
            .filter(|x| !x.is_empty())
            .unwrap_or("segment")
            .to_owned();

        Self {
            position,
            url,
            path: directory.join(filename),
        }
    }
}

/// Produced exactly once per submitted [`SegmentTask`].
#[derive(Debug)]
pub struct FetchResult {
    pub position: usize,
    pub outcome: Result<PathBuf>,
}

impl FetchResult {
    pub fn path(&self) -> Option<&PathBuf> {
        self.outcome.as_ref().ok()
    }
}

/// Bounded concurrency segment downloader.
///
/// Workers claim tasks in submission order but completion order is
/// arbitrary, callers must only rely on the position carried by each
/// [`FetchResult`]. Results are returned sorted by position, one per
/// submitted task.
pub struct SegmentFetcher {
    client: Client,
    concurrency: usize,
    retries: u8,
    abort: Arc<AtomicBool>,
}

impl SegmentFetcher {
    pub fn new(client: Client, concurrency: usize, retries: u8, abort: Arc<AtomicBool>) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            retries: retries.max(1),
            abort,
        }
    }

    /// Downloads every task into its destination path.
    ///
    /// A destination that already exists is counted as fetched without any
    /// network request, which makes interrupted runs resumable. A hard
    /// failure stops submission of the remaining tasks of this call and
    /// in-flight downloads drain, the external abort flag (Ctrl+C) does the
    /// same across calls.
    pub async fn fetch(&self, tasks: Vec<SegmentTask>, progress: Progress) -> Vec<FetchResult> {
        let total = tasks.len();
        let progress = Arc::new(Mutex::new(progress));
        let failed = Arc::new(AtomicBool::new(false));
        let mut set = JoinSet::new();
        let mut results = Vec::with_capacity(total);

        for task in tasks {
            if self.abort.load(Ordering::SeqCst) || failed.load(Ordering::SeqCst) {
                results.push(FetchResult {
                    position: task.position,
                    outcome: Err(Error::Transport {
                        position: task.position,
                        url: task.url.to_string(),
                        cause: "aborted before submission".to_owned(),
                    }),
                });
                continue;
            }

            while set.len() >= self.concurrency {
                if let Some(Ok(result)) = set.join_next().await {
                    results.push(result);
                }
            }

            let client = self.client.clone();
            let retries = self.retries;
            let failed = failed.clone();
            let progress = progress.clone();

            set.spawn(async move {
                let position = task.position;
                let outcome = download(&client, &task, retries).await;

                match &outcome {
                    Ok(path) => {
                        let bytes = fs::metadata(path).await.map(|x| x.len()).unwrap_or(0);

                        if let Ok(mut progress) = progress.lock() {
                            progress.update(bytes as usize);
                        }
                    }
                    Err(_) => failed.store(true, Ordering::SeqCst),
                }

                FetchResult { position, outcome }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }

        results.sort_by_key(|x| x.position);
        results
    }
}

async fn download(client: &Client, task: &SegmentTask, retries: u8) -> Result<PathBuf> {
    if fs::try_exists(&task.path).await? {
        debug!("{} already exists, skipping", task.path.to_string_lossy());
        return Ok(task.path.clone());
    }

    let part = task.path.with_extension("part");

    for attempt in 1..=retries {
        match attempt_download(client, &task.url, &part).await {
            Ok(()) => {
                fs::rename(&part, &task.path).await?;
                return Ok(task.path.clone());
            }
            Err(Attempt::Transient(cause)) => {
                debug!(
                    "segment {} attempt {}/{} failed: {}",
                    task.position, attempt, retries, cause
                );

                if fs::try_exists(&part).await.unwrap_or(false) {
                    fs::remove_file(&part).await?;
                }
            }
            Err(Attempt::Fatal(cause)) => {
                if fs::try_exists(&part).await.unwrap_or(false) {
                    fs::remove_file(&part).await?;
                }

                return Err(Error::Transport {
                    position: task.position,
                    url: task.url.to_string(),
                    cause,
                });
            }
        }
    }

    Err(Error::Transport {
        position: task.position,
        url: task.url.to_string(),
        cause: format!("reached max retries ({})", retries),
    })
}

enum Attempt {
    /// Connection level failures and overload statuses, worth retrying.
    Transient(String),
    /// Definite server answers, retrying cannot change them.
    Fatal(String),
}

async fn attempt_download(
    client: &Client,
    url: &Url,
    part: &Path,
) -> std::result::Result<(), Attempt> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|x| Attempt::Transient(describe(&x)))?;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        return Err(match status {
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Attempt::Transient(format!("HTTP {}", status)),
            _ => Attempt::Fatal(format!("HTTP {}", status)),
        });
    }

    let data = response
        .bytes()
        .await
        .map_err(|x| Attempt::Transient(describe(&x)))?;

    let mut file = fs::File::create(part)
        .await
        .map_err(|x| Attempt::Fatal(x.to_string()))?;
    file.write_all(&data)
        .await
        .map_err(|x| Attempt::Fatal(x.to_string()))?;
    file.flush()
        .await
        .map_err(|x| Attempt::Fatal(x.to_string()))?;

    Ok(())
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_connect() {
        "connection error".to_owned()
    } else if error.is_timeout() {
        "timeout".to_owned()
    } else if error.is_body() || error.is_decode() {
        "truncated body".to_owned()
    } else {
        error.to_string()
    }
}
