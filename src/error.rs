use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("couldn't parse manifest: {0}")]
    Parse(String),

    #[error("expected exactly one {media_type} representation matching {wanted}, found {found}")]
    Selection {
        media_type: &'static str,
        wanted: String,
        found: usize,
    },

    #[error("couldn't download segment {position} ({url}): {cause}")]
    Transport {
        position: usize,
        url: String,
        cause: String,
    },

    #[error("segment {position} of {total} is missing, refusing to emit an incomplete stream")]
    IncompleteStream { position: usize, total: usize },

    #[error("{program} exited with code {code}: {stderr}")]
    ExternalProcess {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("{0} couldn't be found in PATH, it is required to continue further")]
    MissingExecutable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("couldn't write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
