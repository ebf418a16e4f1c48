use crate::domain::analysis::{AnalysisPayload, ScoreResult};
use crate::scoring::RatingBand;
use rust_decimal::Decimal;
use serde::Serialize;

/// Colour tier for compact saved-list cards. Same edges as the rating bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Red,
    Yellow,
    Green,
}

pub fn score_tier(total: Decimal) -> ScoreTier {
    match RatingBand::from_total(total) {
        RatingBand::Weak => ScoreTier::Red,
        RatingBand::Neutral => ScoreTier::Yellow,
        RatingBand::Strong => ScoreTier::Green,
    }
}

/// Plain-text report suitable for clipboards and share sheets.
pub fn share_summary(payload: &AnalysisPayload, result: &ScoreResult) -> String {
    [
        format!("Scorecard report for {}", payload.symbol.to_uppercase()),
        format!("Score: {}/10 ({})", result.total_score, result.rating),
        format!("Price: {}", payload.current_price),
        format!("Action: {}", result.action),
        String::new(),
        "Check the full analysis in the app.".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[test]
    fn summary_contains_headline_fields() {
        let payload = AnalysisPayload {
            symbol: "fpt".to_string(),
            current_price: "118,000".to_string(),
            historical_data: Vec::new(),
            criteria: BTreeMap::new(),
        };
        let result = ScoreResult {
            fa_score: dec!(3),
            ta_score: dec!(2.5),
            mom_score: dec!(1),
            total_score: dec!(6.5),
            rating: RatingBand::Neutral.rating().to_string(),
            action: RatingBand::Neutral.action().to_string(),
            reasons: Vec::new(),
        };

        let text = share_summary(&payload, &result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Scorecard report for FPT");
        assert_eq!(lines[1], "Score: 6.5/10 (NEUTRAL (watch))");
        assert_eq!(lines[2], "Price: 118,000");
        assert_eq!(lines[3], "Action: Hold / keep watching");
    }

    #[test]
    fn tiers_follow_band_edges() {
        assert_eq!(score_tier(dec!(4.5)), ScoreTier::Red);
        assert_eq!(score_tier(dec!(5)), ScoreTier::Yellow);
        assert_eq!(score_tier(dec!(7)), ScoreTier::Yellow);
        assert_eq!(score_tier(dec!(8.5)), ScoreTier::Green);
    }
}
