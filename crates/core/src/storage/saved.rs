use crate::domain::analysis::{AnalysisPayload, SavedAnalysis, ScoreResult};
use crate::error::AnalysisError;
use crate::storage::kv::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const SAVED_ANALYSES_KEY: &str = "saved_analyses";

const DISPLAY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Most-recent-first collection of saved analyses, mirrored to a single
/// key of the backing store after every mutation.
pub struct SavedAnalysisStore {
    kv: Arc<dyn KeyValueStore>,
    entries: Vec<SavedAnalysis>,
}

impl std::fmt::Debug for SavedAnalysisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedAnalysisStore")
            .field("backend", &self.kv.backend_name())
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl SavedAnalysisStore {
    /// Loads the persisted collection. Unreadable or corrupt data yields an
    /// empty store.
    pub async fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        let entries = match kv.get(SAVED_ANALYSES_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<SavedAnalysis>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        backend = kv.backend_name(),
                        error = %e,
                        "saved analyses are not valid JSON; starting with an empty store"
                    );
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                let err = AnalysisError::Persistence(format!("{e:#}"));
                tracing::warn!(
                    backend = kv.backend_name(),
                    error = %err,
                    "failed to read saved analyses; starting with an empty store"
                );
                Vec::new()
            }
        };

        tracing::debug!(count = entries.len(), "saved analyses loaded");
        Self { kv, entries }
    }

    pub async fn save(&mut self, payload: &AnalysisPayload, result: &ScoreResult) -> String {
        self.save_at(payload, result, Utc::now()).await
    }

    pub async fn save_at(
        &mut self,
        payload: &AnalysisPayload,
        result: &ScoreResult,
        captured_at: DateTime<Utc>,
    ) -> String {
        let id = self.fresh_id();
        self.entries.insert(
            0,
            SavedAnalysis {
                id: id.clone(),
                symbol: payload.symbol.clone(),
                date: captured_at.format(DISPLAY_DATE_FORMAT).to_string(),
                result: result.clone(),
                data: payload.clone(),
            },
        );
        self.persist().await;
        tracing::info!(%id, symbol = %payload.symbol, "analysis saved");
        id
    }

    pub fn list(&self) -> &[SavedAnalysis] {
        &self.entries
    }

    pub fn load(&self, id: &str) -> Option<&SavedAnalysis> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Returns whether an entry was removed. Unknown ids are a no-op.
    pub async fn delete(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            tracing::debug!(%id, "delete of unknown saved analysis ignored");
            return false;
        }
        self.persist().await;
        tracing::info!(%id, "saved analysis deleted");
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // v7 ids embed the capture time and sort by it.
    fn fresh_id(&self) -> String {
        loop {
            let id = uuid::Uuid::now_v7().to_string();
            if self.load(&id).is_none() {
                return id;
            }
        }
    }

    async fn persist(&self) {
        if let Err(err) = self.try_persist().await {
            tracing::error!(
                backend = self.kv.backend_name(),
                error = %err,
                "failed to persist saved analyses"
            );
        }
    }

    async fn try_persist(&self) -> Result<(), AnalysisError> {
        let raw = serde_json::to_string(&self.entries)
            .map_err(|e| AnalysisError::Persistence(e.to_string()))?;
        self.kv
            .set(SAVED_ANALYSES_KEY, raw)
            .await
            .map_err(|e| AnalysisError::Persistence(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{Criterion, CriterionKey};
    use crate::scoring::score;
    use crate::storage::kv::MemoryKeyValueStore;
    use chrono::TimeZone;

    fn payload(symbol: &str) -> AnalysisPayload {
        AnalysisPayload {
            symbol: symbol.to_string(),
            current_price: "100".to_string(),
            historical_data: Vec::new(),
            criteria: CriterionKey::ALL
                .iter()
                .map(|k| {
                    (
                        k.as_str().to_string(),
                        Criterion {
                            value: true,
                            reason: "ok".to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    async fn save_symbol(store: &mut SavedAnalysisStore, symbol: &str) -> String {
        let p = payload(symbol);
        let r = score(&p).unwrap();
        store.save(&p, &r).await
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl KeyValueStore for FailingStore {
        fn backend_name(&self) -> &'static str {
            "failing"
        }

        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("disk unavailable")
        }

        async fn set(&self, _key: &str, _value: String) -> anyhow::Result<()> {
            anyhow::bail!("disk unavailable")
        }
    }

    #[tokio::test]
    async fn save_prepends_and_persists() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let mut store = SavedAnalysisStore::open(kv.clone()).await;

        let first = save_symbol(&mut store, "HPG").await;
        let second = save_symbol(&mut store, "VCB").await;
        assert_ne!(first, second);

        let symbols: Vec<&str> = store.list().iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, ["VCB", "HPG"]);

        let reopened = SavedAnalysisStore::open(kv).await;
        assert_eq!(reopened.list(), store.list());
    }

    #[tokio::test]
    async fn delete_removes_only_the_target_and_keeps_order() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let mut store = SavedAnalysisStore::open(kv.clone()).await;
        let a = save_symbol(&mut store, "AAA").await;
        let b = save_symbol(&mut store, "BBB").await;
        let c = save_symbol(&mut store, "CCC").await;

        assert!(store.delete(&b).await);
        let ids: Vec<&str> = store.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, [c.as_str(), a.as_str()]);

        let reopened = SavedAnalysisStore::open(kv).await;
        assert_eq!(reopened.len(), 2);
        assert!(reopened.load(&b).is_none());
    }

    #[tokio::test]
    async fn delete_unknown_id_is_noop() {
        let mut store = SavedAnalysisStore::open(Arc::new(MemoryKeyValueStore::new())).await;
        save_symbol(&mut store, "FPT").await;
        assert!(!store.delete("missing").await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn load_returns_snapshot_by_id() {
        let mut store = SavedAnalysisStore::open(Arc::new(MemoryKeyValueStore::new())).await;
        let p = payload("MWG");
        let r = score(&p).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        let id = store.save_at(&p, &r, at).await;

        let entry = store.load(&id).unwrap();
        assert_eq!(entry.symbol, "MWG");
        assert_eq!(entry.date, "2026-10-19");
        assert_eq!(entry.result, r);
        assert_eq!(entry.data, p);
        assert!(store.load("nope").is_none());
    }

    #[tokio::test]
    async fn corrupt_data_opens_as_empty() {
        let kv = Arc::new(MemoryKeyValueStore::with_entry(SAVED_ANALYSES_KEY, "{not json"));
        let store = SavedAnalysisStore::open(kv).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn storage_failures_do_not_surface() {
        let mut store = SavedAnalysisStore::open(Arc::new(FailingStore)).await;
        assert!(store.is_empty());

        let id = save_symbol(&mut store, "SSI").await;
        assert_eq!(store.load(&id).map(|e| e.symbol.as_str()), Some("SSI"));
        assert!(store.delete(&id).await);
    }
}
