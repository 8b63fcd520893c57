//! HTTP adapters against a mock server

use crate::common::crawler_config;
use snapcrawl::config::SourceConfig;
use snapcrawl::crawler::{
    build_http_client, Coordinator, FetchResult, Fetcher, HttpFetcher, NoPause, RecordingDelay,
};
use snapcrawl::record::{EventType, Winner};
use snapcrawl::snapshot::{HttpListingSource, ListingSource, SnapshotBuilder, SnapshotError};
use snapcrawl::storage::FsCheckpointStore;
use snapcrawl::{Snapshot, WorkItem};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MATCH_PAGE: &str = r#"
    <html><head><title>Spirit vs. FaZe</title></head><body>
      <div class="team1-gradient"><div class="teamName">Spirit</div><div class="lost">0</div></div>
      <div class="time" data-unix="1734256800000">10:00</div>
      <div class="event text-ellipsis"><a href="/events/1/x">PGL Major Copenhagen 2024</a></div>
      <div class="team2-gradient"><div class="teamName">FaZe</div><div class="won">2</div></div>
      <div class="padding preformatted-text">Best of 3 (Online)</div>
    </body></html>
"#;

const LISTING_PAGE: &str = r#"
    <html><body>
      <div class="result-con"><a href="/matches/103/c-vs-d">row</a></div>
      <div class="result-con"><a href="/matches/102/e-vs-f">row</a></div>
      <div class="result-con"><a href="/matches/101/g-vs-h">row</a></div>
    </body></html>
"#;

fn source_config(base_url: &str) -> SourceConfig {
    SourceConfig {
        base_url: base_url.to_string(),
        listing_path: "/results".to_string(),
        item_path: "/matches/{id}/-".to_string(),
        page_size: 100,
        user_agent: "TestAgent/1.0".to_string(),
        request_timeout_secs: 5,
        season_length: 2,
        max_season: 8,
    }
}

fn item(id: u64, position: usize) -> WorkItem {
    WorkItem {
        id,
        position,
        url: None,
    }
}

async fn fetcher_for(server: &MockServer) -> HttpFetcher {
    let config = source_config(&server.uri());
    HttpFetcher::new(build_http_client(&config).unwrap(), &config).unwrap()
}

async fn mount_page(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_parses_match_page() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/matches/42/-",
        ResponseTemplate::new(200)
            .set_body_string(MATCH_PAGE)
            .insert_header("content-type", "text/html"),
    )
    .await;

    let result = fetcher_for(&server).await.fetch(&item(42, 5)).await;

    let FetchResult::Success(record) = result else {
        panic!("expected a record, got {:?}", result);
    };
    assert_eq!(record.match_id, 42);
    assert_eq!(record.season, 3);
    assert_eq!(record.team1.name, "Spirit");
    assert_eq!(record.team2.score, 2);
    assert_eq!(record.winner, Winner::Team2);
    assert_eq!(record.event_type, EventType::Online);
    assert_eq!(
        record.tournament.as_deref(),
        Some("PGL Major Copenhagen 2024")
    );
    assert_eq!(record.past_3_months.winner_past3, 50.0);
    assert!(record.metadata.source_url.ends_with("/matches/42/-"));
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    for (id, status) in [(1u64, 404u16), (2, 429), (3, 503), (4, 403), (5, 410)] {
        mount_page(
            &server,
            &format!("/matches/{}/-", id),
            ResponseTemplate::new(status),
        )
        .await;
    }
    let fetcher = fetcher_for(&server).await;

    let retryable = |r: &FetchResult| matches!(r, FetchResult::Failed { retryable: true, .. });
    let permanent = |r: &FetchResult| matches!(r, FetchResult::Failed { retryable: false, .. });

    assert!(permanent(&fetcher.fetch(&item(1, 0)).await));
    assert!(retryable(&fetcher.fetch(&item(2, 0)).await));
    assert!(retryable(&fetcher.fetch(&item(3, 0)).await));
    assert!(retryable(&fetcher.fetch(&item(4, 0)).await));
    assert!(permanent(&fetcher.fetch(&item(5, 0)).await));
}

#[tokio::test]
async fn test_challenge_page_is_retryable() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/matches/7/-",
        ResponseTemplate::new(200)
            .set_body_string("<html><head><title>Just a moment...</title></head></html>"),
    )
    .await;

    let result = fetcher_for(&server).await.fetch(&item(7, 0)).await;
    assert!(matches!(result, FetchResult::Failed { retryable: true, .. }));
}

#[tokio::test]
async fn test_forfeit_and_unparseable_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/matches/8/-",
        ResponseTemplate::new(200).set_body_string(
            r#"<div class="padding preformatted-text">Best of 3 (LAN) * G2 forfeit the match</div>"#,
        ),
    )
    .await;
    mount_page(
        &server,
        "/matches/9/-",
        ResponseTemplate::new(200).set_body_string("<html><body>maintenance</body></html>"),
    )
    .await;
    let fetcher = fetcher_for(&server).await;

    assert_eq!(
        fetcher.fetch(&item(8, 0)).await,
        FetchResult::Skipped {
            reason: "forfeit".to_string()
        }
    );
    assert!(matches!(
        fetcher.fetch(&item(9, 0)).await,
        FetchResult::Failed { retryable: false, .. }
    ));
}

#[tokio::test]
async fn test_redirect_to_another_match_is_skipped() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/matches/10/-",
        ResponseTemplate::new(302).insert_header("location", "/matches/11/-"),
    )
    .await;
    mount_page(
        &server,
        "/matches/11/-",
        ResponseTemplate::new(200).set_body_string(MATCH_PAGE),
    )
    .await;
    mount_page(
        &server,
        "/matches/12/-",
        ResponseTemplate::new(200).set_body_string(MATCH_PAGE),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = Arc::new(Snapshot::from_ids(&[10, 12]));

    let report = Coordinator::new(
        snapshot,
        Arc::new(fetcher_for(&server).await),
        store,
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
        &crawler_config(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.progress.items_completed, 1);
    assert_eq!(report.progress.items_skipped, 1);
    assert_eq!(report.progress.skipped_item_ids, vec![10]);
}

#[tokio::test]
async fn test_snapshot_built_from_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/results"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let config = source_config(&server.uri());
    let source = HttpListingSource::new(build_http_client(&config).unwrap(), &config).unwrap();
    let delay = Arc::new(RecordingDelay::default());
    let builder = SnapshotBuilder::new(
        Arc::new(source),
        delay.clone(),
        config.page_size,
        Duration::from_secs(2),
    );

    let snapshot = builder.build(10).await.unwrap();

    assert_eq!(snapshot.ids(), vec![103, 102, 101]);
    assert_eq!(snapshot.metadata.target_count, 10);
    assert_eq!(delay.recorded(), vec![Duration::from_secs(2)]);
    assert!(snapshot.items()[0]
        .url
        .as_deref()
        .is_some_and(|u| u.ends_with("/matches/103/c-vs-d")));
}

#[tokio::test]
async fn test_listing_error_aborts_build() {
    let server = MockServer::start().await;
    mount_page(&server, "/results", ResponseTemplate::new(503)).await;

    let config = source_config(&server.uri());
    let source = HttpListingSource::new(build_http_client(&config).unwrap(), &config).unwrap();

    assert!(source.fetch_page(0).await.is_err());
}

#[tokio::test]
async fn test_challenge_page_on_listing_fails_build() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/results"))
        .and(query_param("offset", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Just a moment...</title></head></html>"),
        )
        .mount(&server)
        .await;

    let config = source_config(&server.uri());
    let source = HttpListingSource::new(build_http_client(&config).unwrap(), &config).unwrap();
    let builder = SnapshotBuilder::new(
        Arc::new(source),
        Arc::new(RecordingDelay::default()),
        config.page_size,
        Duration::from_secs(2),
    );

    let result = builder.build(10).await;
    assert!(matches!(
        result,
        Err(SnapshotError::Source { offset: 100, ref message }) if message == "challenge page"
    ));
}

#[tokio::test]
async fn test_snapshot_stops_at_known_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let config = source_config(&server.uri());
    let source = HttpListingSource::new(build_http_client(&config).unwrap(), &config).unwrap();
    let delay = Arc::new(RecordingDelay::default());
    let snapshot = SnapshotBuilder::new(
        Arc::new(source),
        delay.clone(),
        config.page_size,
        Duration::from_secs(2),
    )
    .stop_at(Some(102))
    .build(10)
    .await
    .unwrap();

    assert_eq!(snapshot.ids(), vec![103]);
    assert!(delay.recorded().is_empty());
}
