//! HTTP client for the historical price provider.

use async_trait::async_trait;
use serde::Deserialize;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use url::Url;

use crate::application::{
    history::{HistoryProvider, HistorySeries},
    rates::FetchError,
};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Client for a Yahoo Finance chart endpoint:
/// `GET /v8/finance/chart/<SYMBOL>?range=<N>d&interval=1d`.
pub struct YahooChartClient {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    chart: ChartNode,
}

#[derive(Debug, Deserialize)]
struct ChartNode {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl YahooChartClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    fn chart_url(&self, symbol: &str, days: u32) -> Result<Url, FetchError> {
        let mut url = self
            .endpoint
            .join(&format!("v8/finance/chart/{symbol}"))
            .map_err(|err| FetchError::unavailable(format!("invalid provider url: {err}")))?;
        url.query_pairs_mut()
            .append_pair("range", &format!("{days}d"))
            .append_pair("interval", "1d");
        Ok(url)
    }
}

#[async_trait]
impl HistoryProvider for YahooChartClient {
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<HistorySeries, FetchError> {
        let url = self.chart_url(symbol, days)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FetchError::rejected(status.as_u16(), detail));
        }

        let body: ChartBody = response
            .json()
            .await
            .map_err(|err| FetchError::unavailable(format!("undecodable chart body: {err}")))?;

        let result = body
            .chart
            .result
            .and_then(|mut results| (!results.is_empty()).then(|| results.remove(0)))
            .ok_or_else(|| FetchError::unavailable("chart response holds no result"))?;

        let closes = result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|quote| quote.close)
            .unwrap_or_default();

        let mut series = HistorySeries::default();
        for (timestamp, close) in result.timestamp.into_iter().zip(closes) {
            let Some(close) = close else {
                // Market holidays report a timestamp with a null close.
                continue;
            };
            let date = OffsetDateTime::from_unix_timestamp(timestamp)
                .map_err(|err| FetchError::unavailable(format!("bad chart timestamp: {err}")))?
                .date()
                .format(DATE_FORMAT)
                .map_err(|err| FetchError::unavailable(format!("bad chart timestamp: {err}")))?;
            series.dates.push(date);
            series.rates.push(close);
        }

        Ok(series)
    }
}
