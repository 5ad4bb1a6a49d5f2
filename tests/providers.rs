use bytes::Bytes;
use url::Url;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ratevault::application::export::{RemoteError, RemoteStore};
use ratevault::application::history::HistoryProvider;
use ratevault::application::rates::{FetchError, RateProvider};
use ratevault::infra::history_api::YahooChartClient;
use ratevault::infra::rates_api::ExchangeRateApiClient;
use ratevault::infra::remote::DropboxRemote;

fn endpoint(server: &MockServer) -> Url {
    Url::parse(&server.uri()).expect("mock server url")
}

#[tokio::test]
async fn rate_client_parses_quotes_in_provider_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v6/test-key/latest/USD"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"result":"success","base_code":"USD","conversion_rates":{"ZAR":18.1,"RUB":90.5,"EUR":1.08}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = ExchangeRateApiClient::new(endpoint(&server), "test-key".to_string());
    let quote = client.latest("USD").await.expect("quote");

    assert_eq!(quote.base_currency, "USD");
    assert_eq!(
        quote.rates,
        vec![
            ("ZAR".to_string(), 18.1),
            ("RUB".to_string(), 90.5),
            ("EUR".to_string(), 1.08),
        ]
    );
}

#[tokio::test]
async fn rate_client_surfaces_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v6/bad-key/latest/USD"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let client = ExchangeRateApiClient::new(endpoint(&server), "bad-key".to_string());
    let result = client.latest("USD").await;

    match result {
        Err(FetchError::Rejected { status, detail }) => {
            assert_eq!(status, 403);
            assert!(detail.contains("invalid key"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_client_reports_transport_failures_as_unavailable() {
    // Nothing listens on this port.
    let client = ExchangeRateApiClient::new(
        Url::parse("http://127.0.0.1:9").expect("url"),
        "k0".to_string(),
    );
    let result = client.latest("USD").await;
    assert!(matches!(result, Err(FetchError::Unavailable { .. })));
}

#[tokio::test]
async fn rate_client_rejects_non_numeric_rate_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v6/test-key/latest/USD"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"conversion_rates":{"RUB":"ninety"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = ExchangeRateApiClient::new(endpoint(&server), "test-key".to_string());
    assert!(matches!(
        client.latest("USD").await,
        Err(FetchError::Unavailable { .. })
    ));
}

#[tokio::test]
async fn history_client_skips_null_closes_and_formats_dates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/RUB=X"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            // 2024-07-08 and 2024-07-09 midnight UTC, with a null market holiday between.
            r#"{"chart":{"result":[{"timestamp":[1720396800,1720440000,1720483200],"indicators":{"quote":[{"close":[90.1,null,90.5]}]}}],"error":null}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = YahooChartClient::new(endpoint(&server));
    let series = client.daily_closes("RUB=X", 7).await.expect("series");

    assert_eq!(series.rates, vec![90.1, 90.5]);
    assert_eq!(series.dates.len(), 2);
    assert_eq!(series.dates[0], "2024-07-08");
    assert!(series.dates[1].starts_with("2024-07-"));
}

#[tokio::test]
async fn history_client_treats_empty_chart_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/EURUSD=X"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"chart":{"result":null,"error":{"code":"Not Found"}}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = YahooChartClient::new(endpoint(&server));
    assert!(matches!(
        client.daily_closes("EURUSD=X", 7).await,
        Err(FetchError::Unavailable { .. })
    ));
}

#[tokio::test]
async fn dropbox_remote_uploads_with_token_and_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("Authorization", "Bearer token-1"))
        .and(header("Content-Type", "application/octet-stream"))
        .and(body_bytes(b"document bytes".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"name":"exchange_rates_20240709080503.pdf"}"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let remote = DropboxRemote::new(endpoint(&server), "token-1".to_string());
    remote
        .upload(
            "/exchange_rates_20240709080503.pdf",
            Bytes::from_static(b"document bytes"),
        )
        .await
        .expect("upload succeeds");
}

#[tokio::test]
async fn dropbox_remote_reports_rejected_uploads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired token"))
        .mount(&server)
        .await;

    let remote = DropboxRemote::new(endpoint(&server), "stale".to_string());
    let result = remote
        .upload("/exchange_rates.pdf", Bytes::from_static(b"x"))
        .await;

    match result {
        Err(RemoteError::Rejected { status, detail }) => {
            assert_eq!(status, 401);
            assert!(detail.contains("expired token"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}
