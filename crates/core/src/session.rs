//! One user's analysis cycle: idle, loading, success or failed, plus the
//! saved-list overlay.

use crate::domain::analysis::{AnalysisPayload, SavedAnalysis, ScoreResult};
use crate::error::{bounded, AnalysisError, MAX_MESSAGE_CHARS};
use crate::provider::AnalysisProvider;
use crate::scoring;
use crate::share;
use crate::storage::SavedAnalysisStore;
use serde::Serialize;

const FALLBACK_ERROR: &str = "An unexpected error occurred while analyzing the stock.";

/// Identifies one submit. Only the newest token may complete the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading {
        token: RequestToken,
    },
    Success {
        payload: AnalysisPayload,
        result: ScoreResult,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Applied,
    /// The response belonged to a superseded request and was dropped.
    Discarded,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    symbol: String,
    phase: Phase,
    browsing_saved: bool,
    #[serde(skip)]
    last_token: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading { .. })
    }

    pub fn browsing_saved(&self) -> bool {
        self.browsing_saved
    }

    pub fn payload(&self) -> Option<&AnalysisPayload> {
        match &self.phase {
            Phase::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&ScoreResult> {
        match &self.phase {
            Phase::Success { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Starts a new request. A request already in flight is superseded and
    /// its response will be discarded.
    pub fn submit(&mut self, symbol: &str) -> Result<RequestToken, AnalysisError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(AnalysisError::Validation(
                "symbol must be non-empty".to_string(),
            ));
        }

        if let Phase::Loading { token } = self.phase {
            tracing::debug!(superseded = token.0, "new submit replaces in-flight request");
        }

        self.last_token += 1;
        let token = RequestToken(self.last_token);
        self.symbol = symbol.to_string();
        self.phase = Phase::Loading { token };
        self.browsing_saved = false;
        Ok(token)
    }

    pub fn provider_succeeded(
        &mut self,
        token: RequestToken,
        payload: AnalysisPayload,
    ) -> ResponseOutcome {
        if !self.is_current(token) {
            tracing::debug!(token = token.0, "discarding stale provider response");
            return ResponseOutcome::Discarded;
        }

        self.phase = match scoring::score(&payload) {
            Ok(result) => {
                tracing::info!(
                    symbol = %payload.symbol,
                    total = %result.total_score,
                    rating = %result.rating,
                    "analysis scored"
                );
                Phase::Success { payload, result }
            }
            Err(err) => {
                tracing::warn!(symbol = %self.symbol, error = %err, "provider payload rejected");
                Phase::Failed {
                    error: err.to_string(),
                }
            }
        };
        ResponseOutcome::Applied
    }

    pub fn provider_failed(&mut self, token: RequestToken, err: &anyhow::Error) -> ResponseOutcome {
        if !self.is_current(token) {
            tracing::debug!(token = token.0, "discarding stale provider failure");
            return ResponseOutcome::Discarded;
        }

        tracing::warn!(symbol = %self.symbol, error = %format!("{err:#}"), "analysis failed");
        let failure = match err.downcast_ref::<AnalysisError>() {
            Some(typed) => typed.clone(),
            None => {
                // Alternate form keeps the root cause behind any context layers.
                let message = bounded(&format!("{err:#}"), MAX_MESSAGE_CHARS);
                AnalysisError::Provider(if message.is_empty() {
                    FALLBACK_ERROR.to_string()
                } else {
                    message
                })
            }
        };
        self.phase = Phase::Failed {
            error: failure.to_string(),
        };
        ResponseOutcome::Applied
    }

    pub fn complete(
        &mut self,
        token: RequestToken,
        response: anyhow::Result<AnalysisPayload>,
    ) -> ResponseOutcome {
        match response {
            Ok(payload) => self.provider_succeeded(token, payload),
            Err(err) => self.provider_failed(token, &err),
        }
    }

    /// Submit, fetch and apply in one go for callers that own the session
    /// across the provider call.
    pub async fn run(
        &mut self,
        provider: &dyn AnalysisProvider,
        symbol: &str,
    ) -> Result<ResponseOutcome, AnalysisError> {
        let token = self.submit(symbol)?;
        let response = provider.fetch_analysis(&self.symbol).await;
        Ok(self.complete(token, response))
    }

    /// Snapshots the displayed analysis into `store`. Returns `None` outside
    /// of `Success`.
    pub async fn save(&self, store: &mut SavedAnalysisStore) -> Option<String> {
        match &self.phase {
            Phase::Success { payload, result } => Some(store.save(payload, result).await),
            _ => None,
        }
    }

    /// Shows a stored snapshot. Any request still in flight is abandoned.
    pub fn load_saved(&mut self, entry: &SavedAnalysis) {
        self.symbol = entry.symbol.clone();
        self.phase = Phase::Success {
            payload: entry.data.clone(),
            result: entry.result.clone(),
        };
        self.browsing_saved = false;
    }

    pub fn toggle_browsing_saved(&mut self) -> bool {
        self.browsing_saved = !self.browsing_saved;
        self.browsing_saved
    }

    /// Back to the start screen. The saved list is untouched.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    pub fn share_text(&self) -> Option<String> {
        match &self.phase {
            Phase::Success { payload, result } => Some(share::share_summary(payload, result)),
            _ => None,
        }
    }

    fn is_current(&self, token: RequestToken) -> bool {
        matches!(self.phase, Phase::Loading { token: current } if current == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{Criterion, CriterionKey};
    use crate::storage::MemoryKeyValueStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn payload(symbol: &str, value: bool) -> AnalysisPayload {
        AnalysisPayload {
            symbol: symbol.to_string(),
            current_price: "50,000".to_string(),
            historical_data: Vec::new(),
            criteria: CriterionKey::ALL
                .iter()
                .map(|k| {
                    (
                        k.as_str().to_string(),
                        Criterion {
                            value,
                            reason: "r".to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    struct FixedProvider {
        value: bool,
    }

    #[async_trait::async_trait]
    impl AnalysisProvider for FixedProvider {
        fn provider_name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_analysis(&self, symbol: &str) -> anyhow::Result<AnalysisPayload> {
            Ok(payload(symbol, self.value))
        }
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl AnalysisProvider for FailingProvider {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_analysis(&self, _symbol: &str) -> anyhow::Result<AnalysisPayload> {
            anyhow::bail!("API key is missing")
        }
    }

    #[test]
    fn empty_symbol_is_rejected_without_state_change() {
        let mut session = Session::new();
        session.toggle_browsing_saved();

        let err = session.submit("   ").unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(session.phase(), &Phase::Idle);
        assert!(session.browsing_saved());
    }

    #[test]
    fn submit_clears_previous_result_and_overlay() {
        let mut session = Session::new();
        let t1 = session.submit(" hpg ").unwrap();
        session.provider_succeeded(t1, payload("HPG", true));
        assert!(session.result().is_some());

        session.toggle_browsing_saved();
        session.submit("VCB").unwrap();
        assert!(session.is_loading());
        assert!(session.result().is_none());
        assert!(session.payload().is_none());
        assert!(!session.browsing_saved());
        assert_eq!(session.symbol(), "VCB");
    }

    #[test]
    fn success_scores_the_payload() {
        let mut session = Session::new();
        let token = session.submit("FPT").unwrap();
        assert_eq!(
            session.provider_succeeded(token, payload("FPT", true)),
            ResponseOutcome::Applied
        );
        assert_eq!(session.result().unwrap().total_score, dec!(10));
        assert!(session.error().is_none());
    }

    #[test]
    fn failure_stores_message_and_clears_data() {
        let mut session = Session::new();
        let token = session.submit("FPT").unwrap();
        let err = anyhow::anyhow!("quota exceeded");
        session.provider_failed(token, &err);
        assert_eq!(session.error(), Some("quota exceeded"));
        assert!(session.payload().is_none());
    }

    #[test]
    fn failure_message_keeps_root_cause_and_is_bounded() {
        let mut session = Session::new();
        let token = session.submit("FPT").unwrap();
        let err = anyhow::anyhow!("operation timed out").context("data provider request failed");
        session.provider_failed(token, &err);
        assert_eq!(
            session.error(),
            Some("data provider request failed: operation timed out")
        );

        let token = session.submit("FPT").unwrap();
        let body = "{".repeat(5000);
        let err = anyhow::anyhow!("expected value").context(format!("not a valid analysis: {body}"));
        session.provider_failed(token, &err);
        assert_eq!(
            session.error().unwrap().chars().count(),
            MAX_MESSAGE_CHARS + 1
        );
    }

    #[test]
    fn typed_provider_errors_keep_their_message() {
        let mut session = Session::new();
        let token = session.submit("FPT").unwrap();
        let err: anyhow::Error = AnalysisError::Schema {
            missing: vec!["news_support"],
        }
        .into();
        session.provider_failed(token, &err);
        assert_eq!(
            session.error(),
            Some("analysis payload is missing required criteria: news_support")
        );

        let token = session.submit("FPT").unwrap();
        session.provider_failed(token, &anyhow::anyhow!(" "));
        assert_eq!(session.error(), Some(FALLBACK_ERROR));
    }

    #[test]
    fn schema_violation_fails_the_cycle() {
        let mut session = Session::new();
        let token = session.submit("FPT").unwrap();
        let mut p = payload("FPT", true);
        p.criteria.remove("story_clear");
        session.provider_succeeded(token, p);
        assert_eq!(
            session.error(),
            Some("analysis payload is missing required criteria: story_clear")
        );
    }

    #[test]
    fn stale_responses_are_discarded() {
        let mut session = Session::new();
        let first = session.submit("AAA").unwrap();
        let second = session.submit("BBB").unwrap();
        assert!(second > first);

        assert_eq!(
            session.provider_succeeded(first, payload("AAA", true)),
            ResponseOutcome::Discarded
        );
        assert!(session.is_loading());

        assert_eq!(
            session.provider_succeeded(second, payload("BBB", false)),
            ResponseOutcome::Applied
        );
        assert_eq!(session.payload().unwrap().symbol, "BBB");

        // A late duplicate for the applied token changes nothing either.
        let err = anyhow::anyhow!("late");
        assert_eq!(
            session.provider_failed(second, &err),
            ResponseOutcome::Discarded
        );
        assert!(session.error().is_none());
    }

    #[test]
    fn reset_abandons_pending_request() {
        let mut session = Session::new();
        let token = session.submit("AAA").unwrap();
        session.reset();
        assert_eq!(
            session.provider_succeeded(token, payload("AAA", true)),
            ResponseOutcome::Discarded
        );
        assert_eq!(session.phase(), &Phase::Idle);
    }

    #[tokio::test]
    async fn run_drives_a_full_cycle() {
        let mut session = Session::new();
        let outcome = session
            .run(&FixedProvider { value: false }, "mwg")
            .await
            .unwrap();
        assert_eq!(outcome, ResponseOutcome::Applied);
        assert_eq!(session.result().unwrap().reasons.len(), 7);

        session.run(&FailingProvider, "mwg").await.unwrap();
        assert_eq!(session.error(), Some("API key is missing"));

        assert!(session.run(&FailingProvider, "").await.is_err());
        assert_eq!(session.error(), Some("API key is missing"));
    }

    #[tokio::test]
    async fn save_and_load_saved_round_trip_through_the_store() {
        let mut store = SavedAnalysisStore::open(Arc::new(MemoryKeyValueStore::new())).await;
        let mut session = Session::new();
        assert!(session.save(&mut store).await.is_none());

        session
            .run(&FixedProvider { value: true }, "HPG")
            .await
            .unwrap();
        let before = session.phase().clone();
        let id = session.save(&mut store).await.unwrap();
        assert_eq!(session.phase(), &before);
        assert_eq!(store.list()[0].id, id);

        session.run(&FailingProvider, "VCB").await.unwrap();
        session.toggle_browsing_saved();
        let entry = store.load(&id).unwrap().clone();
        session.load_saved(&entry);

        assert_eq!(session.symbol(), "HPG");
        assert_eq!(session.result().unwrap().total_score, dec!(10));
        assert!(!session.browsing_saved());
    }

    #[tokio::test]
    async fn share_text_only_in_success() {
        let mut session = Session::new();
        assert!(session.share_text().is_none());
        session
            .run(&FixedProvider { value: true }, "vnm")
            .await
            .unwrap();
        let text = session.share_text().unwrap();
        assert!(text.contains("VNM"));
        assert!(text.contains("Score: 10/10"));
    }
}
