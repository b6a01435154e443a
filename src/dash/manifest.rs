use super::template::Template;
use crate::error::{Error, Result};
use dash_mpd::MPD;
use log::warn;
use reqwest::Url;

/// One manifest declared encoding of one media type, flattened to the data
/// the rest of the pipeline needs: an optional init segment url and the
/// ordered media segment urls.
///
/// Segment order reconstructs playback order and must never be changed
/// downstream of parsing.
#[derive(Debug, Clone)]
pub struct Representation {
    pub id: String,
    pub mime_type: Option<String>,
    pub pssh: Option<String>,
    pub init_url: Option<Url>,
    pub segments: Vec<Url>,
}

impl Representation {
    pub fn is_video(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|x| x.starts_with("video"))
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|x| x.starts_with("audio"))
    }
}

/// Flattens a DASH manifest into one [`Representation`] per encoding.
///
/// Adaptation sets without a `SegmentTemplate` are skipped with a diagnostic,
/// manifests may legitimately carry non media sets. An adaptation set whose
/// template has no `SegmentTimeline` yields representations with empty
/// segment lists, again with a diagnostic. `startNumber` is part of the
/// format but unused, media urls are addressed by `$Time$`.
pub fn parse(manifest: &str, base_url: &Url) -> Result<Vec<Representation>> {
    let mpd =
        dash_mpd::parse(manifest).map_err(|x| Error::Parse(format!("not a dash manifest ({x})")))?;

    let mut representations = vec![];

    for period in &mpd.periods {
        for adaptation_set in &period.adaptations {
            let content_type = adaptation_set
                .contentType
                .as_deref()
                .or(adaptation_set.mimeType.as_deref())
                .unwrap_or("unknown");

            let Some(segment_template) = &adaptation_set.SegmentTemplate else {
                warn!("no SegmentTemplate found for {:?} adaptation set", content_type);
                continue;
            };

            let pssh = adaptation_set
                .ContentProtection
                .iter()
                .flat_map(|x| x.cenc_pssh.iter())
                .find_map(|x| x.content.clone());

            for representation in &adaptation_set.representations {
                let Some(rid) = &representation.id else {
                    return Err(Error::Parse(
                        "missing @id on representation node".to_owned(),
                    ));
                };

                let mut template = Template::new(rid);

                let init_url = match &segment_template.initialization {
                    Some(initialization) => Some(join(base_url, &template.resolve(initialization))?),
                    None => None,
                };

                let mut segments = vec![];

                if let Some(segment_timeline) = &segment_template.SegmentTimeline {
                    let Some(media) = &segment_template.media else {
                        return Err(Error::Parse(
                            "SegmentTimeline without a media attribute".to_owned(),
                        ));
                    };

                    // The running clock carries the start time of the segment
                    // being emitted and advances by @d after each emission. An
                    // explicit @t resets it, @r repeats the run @r more times.
                    let mut time = 0;

                    for s in &segment_timeline.segments {
                        if let Some(t) = s.t {
                            time = t;
                        }

                        for _ in 0..(s.r.unwrap_or(0) + 1) {
                            template.insert(Template::TIME, time.to_string());
                            segments.push(join(base_url, &template.resolve(media))?);
                            time += s.d;
                        }
                    }
                } else {
                    warn!("no SegmentTimeline found for representation {:?}", rid);
                }

                representations.push(Representation {
                    id: rid.to_owned(),
                    mime_type: representation
                        .mimeType
                        .clone()
                        .or(adaptation_set.mimeType.clone())
                        .or(representation.contentType.clone())
                        .or(adaptation_set.contentType.clone()),
                    pssh: pssh.clone(),
                    init_url,
                    segments,
                });
            }
        }
    }

    Ok(representations)
}

fn join(base_url: &Url, path: &str) -> Result<Url> {
    base_url
        .join(path)
        .map_err(|x| Error::Parse(format!("couldn't join {:?} onto manifest base url ({x})", path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" xmlns:cenc="urn:mpeg:cenc:2013" type="static" mediaPresentationDuration="PT13M4S">
  <Period>
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed">
        <cenc:pssh>AAAAOHBzc2gBAAAA7e+LqXnWSs6jyCfc1R0h7QAAAAA=</cenc:pssh>
      </ContentProtection>
      <SegmentTemplate initialization="dash/$RepresentationID$/init.mp4" media="dash/$RepresentationID$/$Time$.m4s" startNumber="7" timescale="90000">
        <SegmentTimeline>
          <S t="0" d="180000" r="2" />
          <S d="90000" />
          <S t="900000" d="45000" r="1" />
        </SegmentTimeline>
      </SegmentTemplate>
      <Representation id="2880000" mimeType="video/mp4" bandwidth="2880000" width="1920" height="1080" />
    </AdaptationSet>
    <AdaptationSet contentType="audio" mimeType="audio/mp4">
      <SegmentTemplate initialization="dash/$RepresentationID$/init.mp4" media="dash/$RepresentationID$/$Time$.m4s" timescale="48000">
        <SegmentTimeline>
          <S d="96000" r="1" />
        </SegmentTimeline>
      </SegmentTemplate>
      <Representation id="128000" mimeType="audio/mp4" bandwidth="128000" />
    </AdaptationSet>
    <AdaptationSet contentType="text" mimeType="application/ttml+xml">
      <Representation id="textstream" mimeType="application/ttml+xml" />
    </AdaptationSet>
  </Period>
</MPD>"#;

    fn base_url() -> Url {
        "https://cdn.example.com/m/item.ism/".parse::<Url>().unwrap()
    }

    fn times(representation: &Representation) -> Vec<String> {
        representation
            .segments
            .iter()
            .map(|x| {
                x.path()
                    .rsplit_once('/')
                    .unwrap()
                    .1
                    .trim_end_matches(".m4s")
                    .to_owned()
            })
            .collect()
    }

    #[test]
    fn timeline_runs_emit_repeat_plus_one_segments() {
        let representations = parse(MANIFEST, &base_url()).unwrap();
        let video = &representations[0];

        // 3 from the first run, 1 from the second, 2 from the third.
        assert_eq!(video.segments.len(), 6);
        assert_eq!(
            times(video),
            ["0", "180000", "360000", "540000", "900000", "945000"]
        );
    }

    #[test]
    fn clock_continues_across_runs_without_explicit_start() {
        let representations = parse(MANIFEST, &base_url()).unwrap();
        let audio = &representations[1];

        assert_eq!(times(audio), ["0", "96000"]);
    }

    #[test]
    fn start_number_does_not_leak_into_urls() {
        let representations = parse(MANIFEST, &base_url()).unwrap();

        for url in &representations[0].segments {
            assert!(!url.as_str().contains('7'), "unexpected url {}", url);
        }
    }

    #[test]
    fn init_url_substitutes_representation_id() {
        let representations = parse(MANIFEST, &base_url()).unwrap();

        assert_eq!(
            representations[0].init_url.as_ref().unwrap().as_str(),
            "https://cdn.example.com/m/item.ism/dash/2880000/init.mp4"
        );
    }

    #[test]
    fn pssh_is_propagated_from_the_adaptation_set() {
        let representations = parse(MANIFEST, &base_url()).unwrap();

        assert!(representations[0].pssh.is_some());
        assert!(representations[1].pssh.is_none());
    }

    #[test]
    fn adaptation_sets_without_segment_template_are_skipped() {
        let representations = parse(MANIFEST, &base_url()).unwrap();

        assert_eq!(representations.len(), 2);
        assert!(representations.iter().all(|x| x.id != "textstream"));
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        let result = parse("<MPD><Period>", &base_url());

        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
