//! Rate snapshot acquisition against the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::{error::DomainError, rates::RateSnapshot};

/// Raw quote as reported by a provider, before target filtering.
#[derive(Debug, Clone)]
pub struct ProviderQuote {
    pub base_currency: String,
    pub rates: Vec<(String, f64)>,
}

/// Failure classes for a single provider call. No retry is attempted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider unreachable: {detail}")]
    Unavailable { detail: String },
    #[error("provider rejected the request with status {status}")]
    Rejected { status: u16, detail: String },
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl FetchError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable {
            detail: detail.into(),
        }
    }

    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            detail: detail.into(),
        }
    }
}

/// Upstream source of latest exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn latest(&self, base_currency: &str) -> Result<ProviderQuote, FetchError>;
}

/// Fetches provider quotes and narrows them to the configured target set.
pub struct RateService {
    provider: Arc<dyn RateProvider>,
    base_currency: String,
    targets: Vec<String>,
}

impl RateService {
    pub fn new(provider: Arc<dyn RateProvider>, base_currency: String, targets: Vec<String>) -> Self {
        Self {
            provider,
            base_currency,
            targets,
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// One provider call, one snapshot. Currencies outside the target set are
    /// dropped; a snapshot is never built from partially invalid values.
    pub async fn snapshot(&self) -> Result<RateSnapshot, FetchError> {
        let quote = self.provider.latest(&self.base_currency).await?;
        let fetched_at = OffsetDateTime::now_utc();
        let snapshot =
            RateSnapshot::from_quotes(quote.base_currency, fetched_at, quote.rates, &self.targets)?;
        debug!(
            target = "ratevault::rates",
            base = snapshot.base_currency(),
            currencies = snapshot.len(),
            "built rate snapshot"
        );
        Ok(snapshot)
    }
}
