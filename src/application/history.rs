//! Historical price lookup for the supported currencies.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::rates::FetchError;

/// The currencies we can chart, with the ticker symbol each one trades under.
const TICKER_SYMBOLS: &[(&str, &str)] = &[
    ("RUB", "RUB=X"),
    ("EUR", "EURUSD=X"),
    ("GBP", "GBPUSD=X"),
    ("CNY", "CNY=X"),
    ("JPY", "JPY=X"),
];

/// A daily closing-price series, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistorySeries {
    pub dates: Vec<String>,
    pub rates: Vec<f64>,
}

/// Upstream source of historical closing prices for a ticker symbol.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<HistorySeries, FetchError>;
}

#[derive(Debug, Error)]
pub enum HistoryLookupError {
    #[error("currency `{0}` has no known ticker symbol")]
    UnknownCurrency(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Resolves currencies to ticker symbols and queries the price provider.
pub struct HistoryService {
    provider: Arc<dyn HistoryProvider>,
}

impl HistoryService {
    pub fn new(provider: Arc<dyn HistoryProvider>) -> Self {
        Self { provider }
    }

    pub fn symbol_for(currency: &str) -> Option<&'static str> {
        TICKER_SYMBOLS
            .iter()
            .find(|(code, _)| *code == currency)
            .map(|(_, symbol)| *symbol)
    }

    pub async fn series(
        &self,
        currency: &str,
        days: u32,
    ) -> Result<HistorySeries, HistoryLookupError> {
        let symbol = Self::symbol_for(currency)
            .ok_or_else(|| HistoryLookupError::UnknownCurrency(currency.to_string()))?;
        let series = self.provider.daily_closes(symbol, days).await?;
        Ok(series)
    }
}
