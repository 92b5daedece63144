//! Transport-level fetcher tests against a local mock server
//!
//! These run with the permissive network policy because the default
//! policy (correctly) refuses to talk to loopback servers; the SSRF
//! guard itself is covered by unit tests that never open a socket.

use teammeet_ingest::{AllowlistPolicy, FetchOptions, FetchPolicy, SafeFetcher};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_fetcher() -> SafeFetcher {
    SafeFetcher::with_policy(AllowlistPolicy::Skip, FetchPolicy::permissive()).unwrap()
}

#[tokio::test]
async fn fetch_returns_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("User-Agent", "TeamMeet-ScheduleSync/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html"))
        .mount(&server)
        .await;

    let page = test_fetcher()
        .fetch(&format!("{}/page", server.uri()), &FetchOptions::verify())
        .await
        .unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.text, "<html>ok</html>");
    assert!(page.content_type().unwrap().contains("text/html"));
}

#[tokio::test]
async fn one_redirect_is_followed_and_final_url_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let page = test_fetcher()
        .fetch(&format!("{}/old", server.uri()), &FetchOptions::verify())
        .await
        .unwrap();

    assert_eq!(page.text, "moved");
    assert!(page.final_url.path().ends_with("/new"));
}

#[tokio::test]
async fn three_chained_redirects_exceed_the_cap() {
    let server = MockServer::start().await;
    for (from, to) in [("/r1", "/r2"), ("/r2", "/r3"), ("/r3", "/r4")] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", to))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/r4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("end"))
        .mount(&server)
        .await;

    let err = test_fetcher()
        .fetch(&format!("{}/r1", server.uri()), &FetchOptions::verify())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "too_many_redirects");
}

#[tokio::test]
async fn oversized_response_fails_with_size_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let opts = FetchOptions {
        max_bytes: Some(1024),
        ..FetchOptions::verify()
    };
    let err = test_fetcher()
        .fetch(&format!("{}/big", server.uri()), &opts)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "response_too_large");
}

#[tokio::test]
async fn http_error_status_fails_as_fetch_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = test_fetcher()
        .fetch(&format!("{}/missing", server.uri()), &FetchOptions::verify())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "fetch_failed");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn per_request_skip_bypasses_an_enforcing_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sample"))
        .respond_with(ResponseTemplate::new(200).set_body_string("sample"))
        .mount(&server)
        .await;

    // The override allows nothing, so an enforcing fetch is denied...
    let fetcher = SafeFetcher::with_policy(
        AllowlistPolicy::Override(teammeet_ingest::allowlist::OverrideRules::allowing(&[])),
        FetchPolicy::permissive(),
    )
    .unwrap();
    let url = format!("{}/sample", server.uri());
    let err = fetcher.fetch(&url, &FetchOptions::verify()).await.unwrap_err();
    assert_eq!(err.kind(), "allowlist_denied");

    // ...while a verification-style request skips the allowlist
    let page = fetcher
        .fetch(&url, &FetchOptions::verify().skip_allowlist())
        .await
        .unwrap();
    assert_eq!(page.text, "sample");
}

#[tokio::test]
async fn request_headers_can_be_overridden() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(header("Accept", "text/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let opts = FetchOptions::verify().with_header("Accept", "text/calendar");
    let page = test_fetcher()
        .fetch(&format!("{}/feed", server.uri()), &opts)
        .await
        .unwrap();

    assert_eq!(page.text, "ok");
}
