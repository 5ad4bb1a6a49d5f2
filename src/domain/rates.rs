//! Currency rate snapshots and the invariants they uphold.

use time::OffsetDateTime;

use super::error::DomainError;

/// One currency quoted against the snapshot's base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RateEntry {
    pub code: String,
    pub rate: f64,
}

/// An immutable point-in-time set of currency rates.
///
/// Entries are restricted to the configured target currencies and keep the
/// order in which the provider reported them; that order is also the display
/// order in every rendered document.
#[derive(Debug, Clone)]
pub struct RateSnapshot {
    base_currency: String,
    fetched_at: OffsetDateTime,
    entries: Vec<RateEntry>,
}

impl RateSnapshot {
    /// Build a snapshot from raw provider pairs.
    ///
    /// Pairs whose code is not in `targets` are dropped, never surfaced.
    /// Duplicate codes and non-finite or non-positive rates among the kept
    /// pairs are rejected.
    pub fn from_quotes<I>(
        base_currency: impl Into<String>,
        fetched_at: OffsetDateTime,
        quotes: I,
        targets: &[String],
    ) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut entries: Vec<RateEntry> = Vec::with_capacity(targets.len());
        for (code, rate) in quotes {
            if !targets.iter().any(|target| *target == code) {
                continue;
            }
            if entries.iter().any(|entry| entry.code == code) {
                return Err(DomainError::invariant(format!(
                    "duplicate rate for currency `{code}`"
                )));
            }
            if !rate.is_finite() || rate <= 0.0 {
                return Err(DomainError::validation(format!(
                    "rate for `{code}` must be a finite positive number, got {rate}"
                )));
            }
            entries.push(RateEntry { code, rate });
        }

        Ok(Self {
            base_currency: base_currency.into(),
            fetched_at,
            entries,
        })
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn fetched_at(&self) -> OffsetDateTime {
        self.fetched_at
    }

    pub fn entries(&self) -> &[RateEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Canonical decimal rendering of a rate, shared by every document format.
pub fn format_rate(rate: f64) -> String {
    format!("{rate}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<String> {
        ["RUB", "EUR", "GBP"]
            .iter()
            .map(|code| code.to_string())
            .collect()
    }

    #[test]
    fn drops_currencies_outside_the_target_set() {
        let snapshot = RateSnapshot::from_quotes(
            "USD",
            OffsetDateTime::UNIX_EPOCH,
            vec![
                ("RUB".to_string(), 90.5),
                ("CHF".to_string(), 0.88),
                ("EUR".to_string(), 1.08),
            ],
            &targets(),
        )
        .expect("valid snapshot");

        let codes: Vec<&str> = snapshot
            .entries()
            .iter()
            .map(|entry| entry.code.as_str())
            .collect();
        assert_eq!(codes, vec!["RUB", "EUR"]);
    }

    #[test]
    fn preserves_provider_order() {
        let snapshot = RateSnapshot::from_quotes(
            "USD",
            OffsetDateTime::UNIX_EPOCH,
            vec![
                ("GBP".to_string(), 0.79),
                ("RUB".to_string(), 90.5),
                ("EUR".to_string(), 1.08),
            ],
            &targets(),
        )
        .expect("valid snapshot");

        let codes: Vec<&str> = snapshot
            .entries()
            .iter()
            .map(|entry| entry.code.as_str())
            .collect();
        assert_eq!(codes, vec!["GBP", "RUB", "EUR"]);
    }

    #[test]
    fn rejects_duplicate_codes() {
        let result = RateSnapshot::from_quotes(
            "USD",
            OffsetDateTime::UNIX_EPOCH,
            vec![("EUR".to_string(), 1.08), ("EUR".to_string(), 1.09)],
            &targets(),
        );
        assert!(matches!(result, Err(DomainError::Invariant { .. })));
    }

    #[test]
    fn rejects_non_positive_and_non_finite_rates() {
        for bad in [0.0, -3.5, f64::NAN, f64::INFINITY] {
            let result = RateSnapshot::from_quotes(
                "USD",
                OffsetDateTime::UNIX_EPOCH,
                vec![("EUR".to_string(), bad)],
                &targets(),
            );
            assert!(matches!(result, Err(DomainError::Validation { .. })));
        }
    }

    #[test]
    fn empty_quotes_build_an_empty_snapshot() {
        let snapshot =
            RateSnapshot::from_quotes("USD", OffsetDateTime::UNIX_EPOCH, vec![], &targets())
                .expect("valid snapshot");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }

    #[test]
    fn format_rate_is_locale_free() {
        assert_eq!(format_rate(90.5), "90.5");
        assert_eq!(format_rate(1.08), "1.08");
        assert_eq!(format_rate(7.0), "7");
    }
}
