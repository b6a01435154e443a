use crate::{
    dash::Representation,
    error::{Error, Result},
};
use clap::ValueEnum;
use std::fmt::Display;

/// Video quality labels offered by the catalog. Each one maps to exactly one
/// manifest representation id, the encoder ladder is fixed across items.
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum Resolution {
    #[value(name = "1920x1080")]
    Fhd1080,
    #[value(name = "1280x720")]
    Hd720,
    #[value(name = "854x480")]
    Sd480,
    #[value(name = "426x240")]
    Sd240,
}

impl Resolution {
    pub fn representation_id(&self) -> &'static str {
        match self {
            Self::Fhd1080 => "2880000",
            Self::Hd720 => "1440000",
            Self::Sd480 => "720000",
            Self::Sd240 => "360000",
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Fhd1080 => "1920x1080",
                Self::Hd720 => "1280x720",
                Self::Sd480 => "854x480",
                Self::Sd240 => "426x240",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum AudioBitrate {
    #[value(name = "128k")]
    Kbps128,
    #[value(name = "256k")]
    Kbps256,
    #[value(name = "320k")]
    Kbps320,
}

impl AudioBitrate {
    pub fn representation_id(&self) -> &'static str {
        match self {
            Self::Kbps128 => "128000",
            Self::Kbps256 => "256000",
            Self::Kbps320 => "320000",
        }
    }
}

impl Display for AudioBitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Kbps128 => "128k",
                Self::Kbps256 => "256k",
                Self::Kbps320 => "320k",
            }
        )
    }
}

pub struct Selection<'a> {
    pub video: &'a Representation,
    pub audio: &'a Representation,
}

/// Maps the requested quality labels onto the parsed representations.
///
/// Anything other than exactly one video and exactly one audio match is a
/// [`Error::Selection`], the caller decides whether another manifest
/// candidate is worth trying.
pub fn select<'a>(
    representations: &'a [Representation],
    resolution: Resolution,
    audio: AudioBitrate,
) -> Result<Selection<'a>> {
    let video = exactly_one(
        representations,
        "video",
        resolution.to_string(),
        |x| x.is_video() && x.id == resolution.representation_id(),
    )?;
    let audio = exactly_one(
        representations,
        "audio",
        audio.to_string(),
        |x| x.is_audio() && x.id == audio.representation_id(),
    )?;

    Ok(Selection { video, audio })
}

fn exactly_one<'a>(
    representations: &'a [Representation],
    media_type: &'static str,
    wanted: String,
    matches: impl Fn(&Representation) -> bool,
) -> Result<&'a Representation> {
    let mut found = representations.iter().filter(|x| matches(x));

    match (found.next(), found.count()) {
        (Some(representation), 0) => Ok(representation),
        (None, _) => Err(Error::Selection {
            media_type,
            wanted,
            found: 0,
        }),
        (Some(_), more) => Err(Error::Selection {
            media_type,
            wanted,
            found: more + 1,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn representation(id: &str, mime_type: &str) -> Representation {
        Representation {
            id: id.to_owned(),
            mime_type: Some(mime_type.to_owned()),
            pssh: None,
            init_url: None,
            segments: vec![],
        }
    }

    #[test]
    fn matching_pair_is_selected() {
        let representations = vec![
            representation("2880000", "video/mp4"),
            representation("128000", "audio/mp4"),
        ];

        let selection = select(
            &representations,
            Resolution::Fhd1080,
            AudioBitrate::Kbps128,
        )
        .unwrap();

        assert_eq!(selection.video.id, "2880000");
        assert_eq!(selection.audio.id, "128000");
    }

    #[test]
    fn missing_resolution_is_a_selection_error() {
        let representations = vec![
            representation("1440000", "video/mp4"),
            representation("128000", "audio/mp4"),
        ];

        let result = select(
            &representations,
            Resolution::Fhd1080,
            AudioBitrate::Kbps128,
        );

        assert!(matches!(
            result,
            Err(Error::Selection {
                media_type: "video",
                found: 0,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_ids_are_a_selection_error() {
        let representations = vec![
            representation("2880000", "video/mp4"),
            representation("2880000", "video/mp4"),
            representation("128000", "audio/mp4"),
        ];

        let result = select(
            &representations,
            Resolution::Fhd1080,
            AudioBitrate::Kbps128,
        );

        assert!(matches!(
            result,
            Err(Error::Selection {
                media_type: "video",
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn video_ids_never_satisfy_the_audio_side() {
        // Same id on the wrong media type must not count as a match.
        let representations = vec![
            representation("2880000", "video/mp4"),
            representation("128000", "video/mp4"),
        ];

        let result = select(
            &representations,
            Resolution::Fhd1080,
            AudioBitrate::Kbps128,
        );

        assert!(matches!(
            result,
            Err(Error::Selection {
                media_type: "audio",
                ..
            })
        ));
    }
}
