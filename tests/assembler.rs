use darya::{
    assembler::assemble,
    error::Error,
    fetcher::{FetchResult, SegmentFetcher, SegmentTask},
    progress::Progress,
};
use reqwest::{Client, Url};
use std::{
    fs,
    path::Path,
    sync::{Arc, atomic::AtomicBool},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn write_segments(dir: &Path, bodies: &[&str]) -> Vec<FetchResult> {
    bodies
        .iter()
        .enumerate()
        .map(|(position, body)| {
            let path = dir.join(format!("{}.m4s", position));
            fs::write(&path, body).unwrap();

            FetchResult {
                position,
                outcome: Ok(path),
            }
        })
        .collect()
}

#[tokio::test]
async fn output_is_init_followed_by_segments_in_position_order() {
    let dir = tempfile::tempdir().unwrap();
    let init = dir.path().join("init.mp4");
    fs::write(&init, "INIT").unwrap();

    let results = write_segments(dir.path(), &["AAA", "BBB", "CCC"]);
    let output = dir.path().join("stream.mp4");

    let written = assemble(Some(&init), &results, &output).await.unwrap();

    assert_eq!(written, 13);
    assert_eq!(fs::read_to_string(&output).unwrap(), "INITAAABBBCCC");
}

#[tokio::test]
async fn a_gap_fails_and_creates_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut results = write_segments(dir.path(), &["AAA", "BBB", "CCC"]);

    results[1] = FetchResult {
        position: 1,
        outcome: Err(Error::Transport {
            position: 1,
            url: "https://cdn.example.com/seg/1.m4s".to_owned(),
            cause: "HTTP 404 Not Found".to_owned(),
        }),
    };

    let output = dir.path().join("stream.mp4");
    let result = assemble(None, &results, &output).await;

    assert!(matches!(
        result,
        Err(Error::IncompleteStream {
            position: 1,
            total: 3
        })
    ));
    assert!(!output.exists());
}

#[tokio::test]
async fn a_missing_position_fails_and_creates_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut results = write_segments(dir.path(), &["AAA", "BBB", "CCC"]);
    results.remove(1);

    let output = dir.path().join("stream.mp4");
    let result = assemble(None, &results, &output).await;

    assert!(matches!(result, Err(Error::IncompleteStream { .. })));
    assert!(!output.exists());
}

/// Completion order is forced backwards with staggered response delays, the
/// assembled bytes must still follow manifest order.
#[tokio::test]
async fn reverse_completion_order_still_assembles_forward() {
    let server = MockServer::start().await;

    for position in 0..4_u64 {
        Mock::given(method("GET"))
            .and(path(format!("/seg/{}.m4s", position)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(format!("S{position}"))
                    .set_delay(std::time::Duration::from_millis((3 - position) * 120)),
            )
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let tasks = (0..4)
        .map(|position| {
            let url = format!("{}/seg/{}.m4s", server.uri(), position)
                .parse::<Url>()
                .unwrap();
            SegmentTask::new(position, url, dir.path())
        })
        .collect::<Vec<_>>();

    let fetcher = SegmentFetcher::new(Client::new(), 4, 3, Arc::new(AtomicBool::new(false)));
    let results = fetcher.fetch(tasks, Progress::new("test", 4)).await;

    let output = dir.path().join("stream.mp4");
    assemble(None, &results, &output).await.unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), "S0S1S2S3");
}
