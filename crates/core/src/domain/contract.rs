use crate::domain::analysis::{AnalysisPayload, Criterion, CriterionKey, HistoricalPoint};
use crate::error::AnalysisError;
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider output before validation. Every field is taken as-is from the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAnalysis {
    pub symbol: String,
    pub current_price: String,
    #[serde(default)]
    pub historical_data: Vec<HistoricalPoint>,
    #[serde(default)]
    pub criteria: BTreeMap<String, Criterion>,
}

impl ProviderAnalysis {
    pub fn validate_and_into_payload(self) -> anyhow::Result<AnalysisPayload> {
        let symbol = self.symbol.trim().to_string();
        ensure!(!symbol.is_empty(), "symbol must be non-empty");

        let current_price = self.current_price.trim().to_string();
        ensure!(!current_price.is_empty(), "current_price must be non-empty");

        for point in &self.historical_data {
            ensure!(
                point.price.is_finite(),
                "historical price for {} is not a finite number",
                point.date
            );
        }

        let missing: Vec<&'static str> = CriterionKey::ALL
            .iter()
            .filter(|k| !self.criteria.contains_key(k.as_str()))
            .map(|k| k.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AnalysisError::Schema { missing }.into());
        }

        // Keys outside the fixed set are dropped.
        let criteria = CriterionKey::ALL
            .iter()
            .filter_map(|k| {
                self.criteria.get(k.as_str()).map(|c| {
                    (
                        k.as_str().to_string(),
                        Criterion {
                            value: c.value,
                            reason: c.reason.trim().to_string(),
                        },
                    )
                })
            })
            .collect();

        Ok(AnalysisPayload {
            symbol,
            current_price,
            historical_data: self
                .historical_data
                .into_iter()
                .map(|p| HistoricalPoint {
                    date: p.date.trim().to_string(),
                    price: p.price,
                })
                .collect(),
            criteria,
        })
    }
}
