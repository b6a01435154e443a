use crate::{
    error::{Error, Result},
    utils,
};
use colored::Colorize;
use log::info;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

/// Runs `mp4decrypt` over an assembled stream, producing the readable
/// elementary stream next to it. Non zero exit is fatal for the
/// representation.
pub async fn decrypt(key: &str, input: &Path, output: &Path) -> Result<()> {
    let bin = utils::find_executable("mp4decrypt")
        .ok_or_else(|| Error::MissingExecutable("mp4decrypt".to_owned()))?;

    run(
        &bin,
        &[
            "--key".to_owned(),
            key.to_owned(),
            input.to_string_lossy().into_owned(),
            output.to_string_lossy().into_owned(),
        ],
    )
    .await?;

    info!("Decrypted {}", output.to_string_lossy());
    Ok(())
}

/// Muxes one video and one audio elementary stream into a single container.
/// The inputs are stream copied, no re-encoding happens here.
pub async fn mux(video: &Path, audio: &Path, output: &Path) -> Result<()> {
    let bin = utils::find_executable("ffmpeg")
        .ok_or_else(|| Error::MissingExecutable("ffmpeg".to_owned()))?;

    run(
        &bin,
        &[
            "-y".to_owned(),
            "-i".to_owned(),
            audio.to_string_lossy().into_owned(),
            "-i".to_owned(),
            video.to_string_lossy().into_owned(),
            "-c".to_owned(),
            "copy".to_owned(),
            output.to_string_lossy().into_owned(),
        ],
    )
    .await?;

    info!("Muxed into {}", output.to_string_lossy());
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct MediaInfo {
    pub duration: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probes a muxed file for the metadata the publish step attaches to the
/// upload.
pub async fn probe(path: &Path) -> Result<MediaInfo> {
    let bin = utils::find_executable("ffprobe")
        .ok_or_else(|| Error::MissingExecutable("ffprobe".to_owned()))?;

    let stdout = run(
        &bin,
        &[
            "-v".to_owned(),
            "error".to_owned(),
            "-select_streams".to_owned(),
            "v:0".to_owned(),
            "-show_entries".to_owned(),
            "stream=width,height:format=duration".to_owned(),
            "-of".to_owned(),
            "json".to_owned(),
            path.to_string_lossy().into_owned(),
        ],
    )
    .await?;

    let parsed = serde_json::from_slice::<ProbeOutput>(&stdout)?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| Error::NotFound(format!("video stream in {:?}", path)))?;

    Ok(MediaInfo {
        duration: parsed
            .format
            .duration
            .as_deref()
            .and_then(|x| x.parse::<f64>().ok())
            .map(|x| x.round() as u64)
            .unwrap_or(0),
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

async fn run(bin: &str, args: &[String]) -> Result<Vec<u8>> {
    info!(
        "Executing {} {}",
        bin.bold(),
        args.iter()
            .map(|x| if x.contains(' ') {
                format!("\"{x}\"")
            } else {
                x.to_owned()
            })
            .collect::<Vec<_>>()
            .join(" ")
            .bold()
    );

    let output = Command::new(bin).args(args).output().await?;

    if !output.status.success() {
        return Err(Error::ExternalProcess {
            program: bin.to_owned(),
            code: output.status.code().unwrap_or(1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(output.stdout)
}
