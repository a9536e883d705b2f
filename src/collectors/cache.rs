//! Per-cycle collector cache, keyed by `(symbol, area)`.
//!
//! Single-flight: concurrent callers of the same missing key share one
//! loader invocation. The orchestrator clears the cache between cycles so
//! day-over-day drift is never served.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use super::AreaReport;
use crate::domain::AnalysisArea;

type Key = (String, AnalysisArea);

#[derive(Default)]
pub struct CycleCache {
    entries: Mutex<HashMap<Key, Arc<OnceCell<AreaReport>>>>,
}

impl CycleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cached report or run `loader` exactly once for this key.
    pub async fn get_or_load<F, Fut>(
        &self,
        symbol: &str,
        area: AnalysisArea,
        loader: F,
    ) -> AreaReport
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AreaReport>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry((symbol.to_string(), area))
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(loader).await.clone()
    }

    /// Drop everything. Called between cycles.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn report(symbol: &str) -> AreaReport {
        AreaReport {
            area: AnalysisArea::News,
            symbol: symbol.to_string(),
            summary: "fresh".into(),
            score_hint: None,
            degraded: false,
            generated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn loader_runs_once_per_key() {
        let cache = CycleCache::new();
        let loads = AtomicU32::new(0);

        for _ in 0..3 {
            cache
                .get_or_load("BTC", AnalysisArea::News, || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    async { report("BTC") }
                })
                .await;
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache
            .get_or_load("ETH", AnalysisArea::News, || {
                loads.fetch_add(1, Ordering::SeqCst);
                async { report("ETH") }
            })
            .await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let cache = Arc::new(CycleCache::new());
        let loads = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("BTC", AnalysisArea::Technical, || {
                        let loads = loads.clone();
                        async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            report("BTC")
                        }
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_evicts_between_cycles() {
        let cache = CycleCache::new();
        cache
            .get_or_load("BTC", AnalysisArea::News, || async { report("BTC") })
            .await;
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);

        let loads = AtomicU32::new(0);
        cache
            .get_or_load("BTC", AnalysisArea::News, || {
                loads.fetch_add(1, Ordering::SeqCst);
                async { report("BTC") }
            })
            .await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
