//! Deterministic conversion of a criterion set into category scores and a rating.

use crate::domain::analysis::{AnalysisPayload, Category, CriterionKey, ScoreResult};
use crate::error::AnalysisError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const FA_CAP: Decimal = dec!(4);
pub const TA_CAP: Decimal = dec!(4);
pub const MOM_CAP: Decimal = dec!(2);

const NEUTRAL_FLOOR: Decimal = dec!(5.0);
const NEUTRAL_CEILING: Decimal = dec!(7.0);

struct Rule {
    key: CriterionKey,
    weight: Decimal,
    /// Pushed when the criterion is false. `None` means a silent miss.
    deduction: Option<&'static str>,
}

// Order here is the order of `ScoreResult::reasons`.
const RULES: [Rule; 10] = [
    Rule {
        key: CriterionKey::RevGrowthPos,
        weight: dec!(1),
        deduction: Some("FA: weak or flat revenue/profit growth"),
    },
    Rule {
        key: CriterionKey::ValAttractive,
        weight: dec!(1),
        deduction: Some("FA: valuation (P/E, P/B) above industry average"),
    },
    Rule {
        key: CriterionKey::HealthSafe,
        weight: dec!(1),
        deduction: Some("FA: high leverage or weak cash flow"),
    },
    Rule {
        key: CriterionKey::StoryClear,
        weight: dec!(1),
        deduction: None,
    },
    Rule {
        key: CriterionKey::TrendUp,
        weight: dec!(1.5),
        deduction: Some("TA: primary trend is not up"),
    },
    Rule {
        key: CriterionKey::PriceAbvMa,
        weight: dec!(1.0),
        deduction: Some("TA: price below key moving averages"),
    },
    Rule {
        key: CriterionKey::VolSupport,
        weight: dec!(1.0),
        deduction: Some("TA: volume not confirming the trend"),
    },
    Rule {
        key: CriterionKey::IndicatorsGood,
        weight: dec!(0.5),
        deduction: None,
    },
    Rule {
        key: CriterionKey::NewsSupport,
        weight: dec!(1.0),
        deduction: None,
    },
    Rule {
        key: CriterionKey::ForeignBuy,
        weight: dec!(1.0),
        deduction: Some("MOM: no institutional/foreign net buying"),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingBand {
    Weak,
    Neutral,
    Strong,
}

impl RatingBand {
    /// `5.0` and `7.0` are both neutral.
    pub fn from_total(total: Decimal) -> Self {
        if total < NEUTRAL_FLOOR {
            Self::Weak
        } else if total <= NEUTRAL_CEILING {
            Self::Neutral
        } else {
            Self::Strong
        }
    }

    pub fn rating(self) -> &'static str {
        match self {
            Self::Weak => "WEAK (high risk)",
            Self::Neutral => "NEUTRAL (watch)",
            Self::Strong => "STRONG (buy opportunity)",
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            Self::Weak => "Avoid / consider exiting",
            Self::Neutral => "Hold / keep watching",
            Self::Strong => "Accumulate / open new position",
        }
    }
}

/// Scores a provider payload. Missing criteria are rejected, never read as `false`.
pub fn score(payload: &AnalysisPayload) -> Result<ScoreResult, AnalysisError> {
    let missing = payload.missing_criteria();
    if !missing.is_empty() {
        return Err(AnalysisError::Schema { missing });
    }

    let mut fa = Decimal::ZERO;
    let mut ta = Decimal::ZERO;
    let mut mom = Decimal::ZERO;
    let mut reasons = Vec::new();

    for rule in &RULES {
        let passed = payload
            .criterion(rule.key)
            .map(|c| c.value)
            .ok_or_else(|| AnalysisError::Schema {
                missing: vec![rule.key.as_str()],
            })?;

        if passed {
            match rule.key.category() {
                Category::Fundamental => fa += rule.weight,
                Category::Technical => ta += rule.weight,
                Category::Momentum => mom += rule.weight,
            }
        } else if let Some(reason) = rule.deduction {
            reasons.push(reason.to_string());
        }
    }

    let fa = fa.min(FA_CAP).normalize();
    let ta = ta.min(TA_CAP).normalize();
    let mom = mom.min(MOM_CAP).normalize();
    let total = (fa + ta + mom).normalize();
    let band = RatingBand::from_total(total);

    Ok(ScoreResult {
        fa_score: fa,
        ta_score: ta,
        mom_score: mom,
        total_score: total,
        rating: band.rating().to_string(),
        action: band.action().to_string(),
        reasons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::Criterion;
    use std::collections::BTreeMap;

    fn payload_with(f: impl Fn(CriterionKey) -> bool) -> AnalysisPayload {
        let criteria: BTreeMap<String, Criterion> = CriterionKey::ALL
            .iter()
            .map(|k| {
                (
                    k.as_str().to_string(),
                    Criterion {
                        value: f(*k),
                        reason: format!("{k} explained"),
                    },
                )
            })
            .collect();

        AnalysisPayload {
            symbol: "HPG".to_string(),
            current_price: "27,500".to_string(),
            historical_data: Vec::new(),
            criteria,
        }
    }

    #[test]
    fn all_true_scores_maximum_without_reasons() {
        let result = score(&payload_with(|_| true)).unwrap();
        assert_eq!(result.fa_score, dec!(4));
        assert_eq!(result.ta_score, dec!(4));
        assert_eq!(result.mom_score, dec!(2));
        assert_eq!(result.total_score, dec!(10));
        assert!(result.reasons.is_empty());
        assert_eq!(result.rating, RatingBand::Strong.rating());
        assert_eq!(result.action, RatingBand::Strong.action());
    }

    #[test]
    fn all_false_scores_zero_with_ordered_reasons() {
        let result = score(&payload_with(|_| false)).unwrap();
        assert_eq!(result.fa_score, Decimal::ZERO);
        assert_eq!(result.ta_score, Decimal::ZERO);
        assert_eq!(result.mom_score, Decimal::ZERO);
        assert_eq!(result.total_score, Decimal::ZERO);
        assert_eq!(result.rating, RatingBand::Weak.rating());

        assert_eq!(result.reasons.len(), 7);
        let prefixes: Vec<&str> = result.reasons.iter().map(|r| &r[..3]).collect();
        assert_eq!(prefixes, ["FA:", "FA:", "FA:", "TA:", "TA:", "TA:", "MOM"]);
        assert_eq!(result.reasons[3], "TA: primary trend is not up");
    }

    #[test]
    fn silent_criteria_cost_points_but_add_no_reason() {
        let silent = [
            CriterionKey::StoryClear,
            CriterionKey::IndicatorsGood,
            CriterionKey::NewsSupport,
        ];
        let result = score(&payload_with(|k| !silent.contains(&k))).unwrap();
        assert_eq!(result.fa_score, dec!(3));
        assert_eq!(result.ta_score, dec!(3.5));
        assert_eq!(result.mom_score, dec!(1));
        assert_eq!(result.total_score, dec!(7.5));
        assert!(result.reasons.is_empty());
        assert_eq!(result.rating, RatingBand::Strong.rating());
    }

    #[test]
    fn technical_only_payload_lands_in_weak_band() {
        let result = score(&payload_with(|k| k.category() == Category::Technical)).unwrap();
        assert_eq!(result.total_score, dec!(4));
        assert_eq!(result.reasons.len(), 4);
        assert_eq!(result.action, RatingBand::Weak.action());
    }

    #[test]
    fn total_is_sum_of_categories_for_every_combination() {
        for mask in 0u16..(1 << 10) {
            let payload = payload_with(|k| {
                let idx = CriterionKey::ALL.iter().position(|x| *x == k).unwrap();
                mask & (1 << idx) != 0
            });
            let r = score(&payload).unwrap();
            assert!(r.fa_score >= Decimal::ZERO && r.fa_score <= FA_CAP);
            assert!(r.ta_score >= Decimal::ZERO && r.ta_score <= TA_CAP);
            assert!(r.mom_score >= Decimal::ZERO && r.mom_score <= MOM_CAP);
            assert_eq!(r.total_score, r.fa_score + r.ta_score + r.mom_score);
        }
    }

    #[test]
    fn band_edges_are_inclusive_for_neutral() {
        assert_eq!(RatingBand::from_total(dec!(4.99)), RatingBand::Weak);
        assert_eq!(RatingBand::from_total(dec!(5.0)), RatingBand::Neutral);
        assert_eq!(RatingBand::from_total(dec!(7.0)), RatingBand::Neutral);
        assert_eq!(RatingBand::from_total(dec!(7.01)), RatingBand::Strong);
    }

    #[test]
    fn rescoring_is_identical() {
        let payload = payload_with(|k| k.as_str().len() % 2 == 0);
        let a = score(&payload).unwrap();
        let b = score(&payload).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn missing_key_is_rejected() {
        for key in CriterionKey::ALL {
            let mut payload = payload_with(|_| true);
            payload.criteria.remove(key.as_str());
            assert_eq!(
                score(&payload),
                Err(AnalysisError::Schema {
                    missing: vec![key.as_str()]
                })
            );
        }
    }
}
