//! HTTP client for the exchange-rate quote provider.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::application::rates::{FetchError, ProviderQuote, RateProvider};

/// Client for an exchangerate-api.com style endpoint:
/// `GET /v6/<key>/latest/<BASE>` returning a `conversion_rates` object.
pub struct ExchangeRateApiClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct LatestRatesBody {
    #[serde(default)]
    base_code: Option<String>,
    conversion_rates: serde_json::Map<String, serde_json::Value>,
}

impl ExchangeRateApiClient {
    pub fn new(endpoint: Url, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    fn latest_url(&self, base_currency: &str) -> Result<Url, FetchError> {
        self.endpoint
            .join(&format!("v6/{}/latest/{base_currency}", self.api_key))
            .map_err(|err| FetchError::unavailable(format!("invalid provider url: {err}")))
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApiClient {
    async fn latest(&self, base_currency: &str) -> Result<ProviderQuote, FetchError> {
        let url = self.latest_url(base_currency)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FetchError::rejected(status.as_u16(), truncate(&detail)));
        }

        let body: LatestRatesBody = response
            .json()
            .await
            .map_err(|err| FetchError::unavailable(format!("undecodable provider body: {err}")))?;

        let mut rates = Vec::with_capacity(body.conversion_rates.len());
        for (code, value) in body.conversion_rates {
            let rate = value.as_f64().ok_or_else(|| {
                FetchError::unavailable(format!("non-numeric rate for `{code}` in provider body"))
            })?;
            rates.push((code, rate));
        }

        Ok(ProviderQuote {
            base_currency: body.base_code.unwrap_or_else(|| base_currency.to_string()),
            rates,
        })
    }
}

fn truncate(detail: &str) -> String {
    const LIMIT: usize = 256;
    if detail.len() <= LIMIT {
        detail.to_string()
    } else {
        let mut end = LIMIT;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &detail[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_url_embeds_key_and_base() {
        let client = ExchangeRateApiClient::new(
            Url::parse("https://v6.exchangerate-api.com").expect("valid url"),
            "k0".to_string(),
        );
        let url = client.latest_url("USD").expect("url");
        assert_eq!(url.as_str(), "https://v6.exchangerate-api.com/v6/k0/latest/USD");
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let long = "x".repeat(1000);
        assert!(truncate(&long).len() < 300);
        assert_eq!(truncate("short"), "short");
    }
}
