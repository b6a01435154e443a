use crate::{
    error::{Error, Result},
    fetcher::FetchResult,
};
use log::debug;
use std::path::Path;
use tokio::{
    fs::File,
    io::{self, AsyncWriteExt},
};

/// Concatenates fetched segments into one elementary stream.
///
/// The init segment (when present) is written first, then every media
/// segment in strict ascending position order. Arrival order of the
/// downloads never leaks into the output. Completeness is verified before
/// the output file is created, a gap means no output at all.
pub async fn assemble(
    init_path: Option<&Path>,
    results: &[FetchResult],
    output: &Path,
) -> Result<u64> {
    let total = results.len();

    for (position, result) in results.iter().enumerate() {
        if result.position != position || result.path().is_none() {
            return Err(Error::IncompleteStream {
                position: result.position.min(position),
                total,
            });
        }
    }

    let mut outfile = File::create(output).await?;
    let mut written = 0;

    if let Some(init_path) = init_path {
        written += io::copy(&mut File::open(init_path).await?, &mut outfile).await?;
    }

    for result in results {
        if let Some(path) = result.path() {
            written += io::copy(&mut File::open(path).await?, &mut outfile).await?;
        }
    }

    outfile.flush().await?;
    debug!(
        "assembled {} segments ({} bytes) into {}",
        total,
        written,
        output.to_string_lossy()
    );

    Ok(written)
}
