use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::{MarketDataError, MarketSnapshotProvider};
use crate::catalog::Etf;
use crate::core::PriceSeries;

pub struct TimeoutProvider<P> {
    inner: P,
    timeout: Duration,
}

impl<P> TimeoutProvider<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<P: MarketSnapshotProvider> MarketSnapshotProvider for TimeoutProvider<P> {
    async fn fetch_one_year_daily_closes(&self, etf: Etf) -> Result<PriceSeries, MarketDataError> {
        match tokio::time::timeout(self.timeout, self.inner.fetch_one_year_daily_closes(etf)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(%etf, timeout = ?self.timeout, "market data fetch timed out");
                Err(MarketDataError::Timeout {
                    ticker: etf,
                    after: self.timeout,
                })
            }
        }
    }
}

/// Keeps the last successful series per ticker for `ttl`. Failures are never cached.
pub struct CachedProvider<P> {
    inner: P,
    ttl: Duration,
    entries: DashMap<Etf, (Instant, PriceSeries)>,
}

impl<P> CachedProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    fn fresh(&self, etf: Etf) -> Option<PriceSeries> {
        let entry = self.entries.get(&etf)?;
        let (fetched_at, series) = entry.value();
        (fetched_at.elapsed() < self.ttl).then(|| series.clone())
    }
}

#[async_trait]
impl<P: MarketSnapshotProvider> MarketSnapshotProvider for CachedProvider<P> {
    async fn fetch_one_year_daily_closes(&self, etf: Etf) -> Result<PriceSeries, MarketDataError> {
        if let Some(series) = self.fresh(etf) {
            debug!(%etf, "serving daily closes from cache");
            return Ok(series);
        }

        let series = self.inner.fetch_one_year_daily_closes(etf).await?;
        self.entries.insert(etf, (Instant::now(), series.clone()));
        Ok(series)
    }
}
