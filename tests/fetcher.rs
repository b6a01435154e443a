use darya::{
    fetcher::{SegmentFetcher, SegmentTask},
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

fn fetcher(concurrency: usize, retries: u8) -> SegmentFetcher {
    SegmentFetcher::new(
        Client::new(),
        concurrency,
        retries,
        Arc::new(AtomicBool::new(false)),
    )
}

fn tasks(server_uri: &str, directory: &Path, count: usize) -> Vec<SegmentTask> {
    (0..count)
        .map(|position| {
            let url = format!("{}/seg/{}.m4s", server_uri, position)
                .parse::<Url>()
                .unwrap();
            SegmentTask::new(position, url, directory)
        })
        .collect()
}

async fn mount_segments(server: &MockServer, count: usize) {
    for position in 0..count {
        Mock::given(method("GET"))
            .and(path(format!("/seg/{}.m4s", position)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("segment-{position}")))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn results_are_correlated_by_position_regardless_of_completion_order() {
    let server = MockServer::start().await;
    mount_segments(&server, 8).await;

    let dir = tempfile::tempdir().unwrap();
    let results = fetcher(4, 3)
        .fetch(
            tasks(&server.uri(), dir.path(), 8),
            Progress::new("test", 8),
        )
        .await;

    assert_eq!(results.len(), 8);

    for (position, result) in results.iter().enumerate() {
        assert_eq!(result.position, position);

        let path = result.outcome.as_ref().unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            format!("segment-{position}")
        );
    }
}

#[tokio::test]
async fn existing_files_are_reused_without_any_request() {
    let server = MockServer::start().await;

    // Any request against the server would be a resume violation.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();

    for position in 0..4 {
        fs::write(dir.path().join(format!("{}.m4s", position)), b"cached").unwrap();
    }

    let results = fetcher(2, 3)
        .fetch(
            tasks(&server.uri(), dir.path(), 4),
            Progress::new("test", 4),
        )
        .await;

    assert!(results.iter().all(|x| x.outcome.is_ok()));
}

#[tokio::test]
async fn transient_statuses_are_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/seg/0.m4s"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/seg/0.m4s"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("third-attempt"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let results = fetcher(1, 5)
        .fetch(
            tasks(&server.uri(), dir.path(), 1),
            Progress::new("test", 1),
        )
        .await;

    let path = results[0].outcome.as_ref().unwrap();
    assert_eq!(fs::read_to_string(path).unwrap(), "third-attempt");
    assert!(
        !dir.path().join("0.part").exists(),
        "partial file should not survive a successful retry"
    );
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    mount_segments(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/seg/2.m4s"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut tasks = tasks(&server.uri(), dir.path(), 2);
    tasks.push(SegmentTask::new(
        2,
        format!("{}/seg/2.m4s", server.uri()).parse::<Url>().unwrap(),
        dir.path(),
    ));

    let results = fetcher(1, 5)
        .fetch(tasks, Progress::new("test", 3))
        .await;

    assert!(results[0].outcome.is_ok());
    assert!(results[1].outcome.is_ok());
    assert!(results[2].outcome.is_err());
    assert!(!dir.path().join("2.m4s").exists());
}
