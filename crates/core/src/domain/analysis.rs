use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One yes/no judgment about a security plus the provider's justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub value: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fundamental,
    Technical,
    Momentum,
}

/// The ten criteria every analysis must carry, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CriterionKey {
    RevGrowthPos,
    ValAttractive,
    HealthSafe,
    StoryClear,
    TrendUp,
    PriceAbvMa,
    VolSupport,
    IndicatorsGood,
    NewsSupport,
    ForeignBuy,
}

impl CriterionKey {
    pub const ALL: [CriterionKey; 10] = [
        CriterionKey::RevGrowthPos,
        CriterionKey::ValAttractive,
        CriterionKey::HealthSafe,
        CriterionKey::StoryClear,
        CriterionKey::TrendUp,
        CriterionKey::PriceAbvMa,
        CriterionKey::VolSupport,
        CriterionKey::IndicatorsGood,
        CriterionKey::NewsSupport,
        CriterionKey::ForeignBuy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RevGrowthPos => "rev_growth_pos",
            Self::ValAttractive => "val_attractive",
            Self::HealthSafe => "health_safe",
            Self::StoryClear => "story_clear",
            Self::TrendUp => "trend_up",
            Self::PriceAbvMa => "price_abv_ma",
            Self::VolSupport => "vol_support",
            Self::IndicatorsGood => "indicators_good",
            Self::NewsSupport => "news_support",
            Self::ForeignBuy => "foreign_buy",
        }
    }

    pub fn category(self) -> Category {
        match self {
            Self::RevGrowthPos | Self::ValAttractive | Self::HealthSafe | Self::StoryClear => {
                Category::Fundamental
            }
            Self::TrendUp | Self::PriceAbvMa | Self::VolSupport | Self::IndicatorsGood => {
                Category::Technical
            }
            Self::NewsSupport | Self::ForeignBuy => Category::Momentum,
        }
    }

    /// What the provider is asked to judge for this key.
    pub fn question(self) -> &'static str {
        match self {
            Self::RevGrowthPos => "YoY revenue/profit growth is positive",
            Self::ValAttractive => "P/E or P/B is lower than the industry average",
            Self::HealthSafe => "Low debt or positive operating cash flow",
            Self::StoryClear => "Clear growth story in the near future",
            Self::TrendUp => "Main price trend is UP",
            Self::PriceAbvMa => "Price is above MA20 and MA50",
            Self::VolSupport => "Volume increases on price increases",
            Self::IndicatorsGood => "RSI/MACD are positive",
            Self::NewsSupport => "Macro/industry news is supportive",
            Self::ForeignBuy => "Foreign investors or proprietary desks are net buying",
        }
    }
}

impl fmt::Display for CriterionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw assessment of one symbol as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub symbol: String,
    pub current_price: String,
    #[serde(default)]
    pub historical_data: Vec<HistoricalPoint>,
    pub criteria: BTreeMap<String, Criterion>,
}

impl AnalysisPayload {
    pub fn criterion(&self, key: CriterionKey) -> Option<&Criterion> {
        self.criteria.get(key.as_str())
    }

    pub fn missing_criteria(&self) -> Vec<&'static str> {
        CriterionKey::ALL
            .iter()
            .filter(|k| self.criterion(**k).is_none())
            .map(|k| k.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    #[serde(with = "rust_decimal::serde::float")]
    pub fa_score: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub ta_score: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub mom_score: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_score: Decimal,
    pub rating: String,
    pub action: String,
    pub reasons: Vec<String>,
}

/// Persisted snapshot of one scored analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAnalysis {
    pub id: String,
    pub symbol: String,
    pub date: String,
    pub result: ScoreResult,
    pub data: AnalysisPayload,
}
