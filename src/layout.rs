use crate::{
    error::Result,
    selector::{AudioBitrate, Resolution},
};
use std::{fs, path::PathBuf};

/// Per item directory tree, computed once from the item id and the selected
/// quality so every component resolves paths the same way. Repeated runs are
/// resumable because all paths are stable across invocations.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub item_dir: PathBuf,
    pub mpds_dir: PathBuf,
    pub license_dir: PathBuf,
    pub video_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub background_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: &PathBuf, item_id: &str, resolution: Resolution, audio: AudioBitrate) -> Self {
        let item_dir = root.join(item_id);

        Self {
            mpds_dir: item_dir.join("mpds"),
            license_dir: item_dir.join("license"),
            video_dir: item_dir.join("video").join(resolution.to_string()),
            audio_dir: item_dir.join("audio").join(audio.to_string()),
            thumbnail_dir: item_dir.join("thumbnail"),
            background_dir: item_dir.join("background"),
            output_dir: item_dir.join("output").join(resolution.to_string()),
            item_dir,
        }
    }

    /// Creates the whole tree. Existing directories are left untouched.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.item_dir,
            &self.mpds_dir,
            &self.license_dir,
            &self.video_dir,
            &self.audio_dir,
            &self.thumbnail_dir,
            &self.background_dir,
            &self.output_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        Ok(())
    }

    pub fn manifest_file(&self, filename: &str) -> PathBuf {
        self.mpds_dir.join(filename)
    }

    pub fn thumbnail_file(&self) -> PathBuf {
        self.thumbnail_dir.join("thumbnail.jpg")
    }

    pub fn background_file(&self, background_id: &str) -> PathBuf {
        self.background_dir.join(format!("{}.jpg", background_id))
    }

    /// Assembled but still encrypted elementary stream, hidden behind a dot
    /// prefix until `mp4decrypt` produces the readable file next to it.
    pub fn encrypted_video_file(&self) -> PathBuf {
        self.video_dir.join(".video.mp4")
    }

    pub fn encrypted_audio_file(&self) -> PathBuf {
        self.audio_dir.join(".audio.m4a")
    }

    pub fn video_file(&self) -> PathBuf {
        self.video_dir.join("video.mp4")
    }

    pub fn audio_file(&self) -> PathBuf {
        self.audio_dir.join("audio.m4a")
    }

    pub fn output_file(&self, title: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.mp4", crate::utils::sanitize_filename(title)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_keyed_by_quality() {
        let layout = WorkspaceLayout::new(
            &PathBuf::from("downloads"),
            "b9Xc01",
            Resolution::Fhd1080,
            AudioBitrate::Kbps128,
        );

        assert_eq!(
            layout.video_dir,
            PathBuf::from("downloads/b9Xc01/video/1920x1080")
        );
        assert_eq!(
            layout.audio_dir,
            PathBuf::from("downloads/b9Xc01/audio/128k")
        );
        assert_eq!(
            layout.output_file("One: Two"),
            PathBuf::from("downloads/b9Xc01/output/1920x1080/One_ Two.mp4")
        );
    }
}
