//! Market snapshot providers.
//!
//! The planner only ever needs one thing from a market data source: a
//! trailing year of daily closes for a catalog ticker. Providers compose:
//! - [`ChartApiProvider`]: HTTP chart endpoint
//! - [`TimeoutProvider`]: bounds any provider by a deadline
//! - [`CachedProvider`]: per-ticker TTL cache in front of any provider
//! - [`StaticProvider`]: fixed in-memory series

mod cache;
mod chart;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::Etf;
use crate::config::MarketConfig;
use crate::core::PriceSeries;

pub use cache::{CachedProvider, TimeoutProvider};
pub use chart::{ChartApiProvider, series_from_chart_json};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketDataError {
    #[error("market data unavailable for {ticker}: {reason}")]
    Unavailable { ticker: Etf, reason: String },

    #[error("market data unavailable for {ticker}: no response within {after:?}")]
    Timeout { ticker: Etf, after: Duration },
}

impl MarketDataError {
    pub fn unavailable(ticker: Etf, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            ticker,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait MarketSnapshotProvider: Send + Sync {
    async fn fetch_one_year_daily_closes(&self, etf: Etf) -> Result<PriceSeries, MarketDataError>;
}

#[async_trait]
impl<P: MarketSnapshotProvider + ?Sized> MarketSnapshotProvider for Arc<P> {
    async fn fetch_one_year_daily_closes(&self, etf: Etf) -> Result<PriceSeries, MarketDataError> {
        (**self).fetch_one_year_daily_closes(etf).await
    }
}

/// Serves fixed series; tickers without a series are reported unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    series: HashMap<Etf, PriceSeries>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, etf: Etf, series: PriceSeries) -> Self {
        self.series.insert(etf, series);
        self
    }
}

#[async_trait]
impl MarketSnapshotProvider for StaticProvider {
    async fn fetch_one_year_daily_closes(&self, etf: Etf) -> Result<PriceSeries, MarketDataError> {
        self.series
            .get(&etf)
            .cloned()
            .ok_or_else(|| MarketDataError::unavailable(etf, "no series loaded"))
    }
}

/// Chart API client behind a timeout and, when the TTL is non-zero, a cache.
pub fn build_provider(
    config: &MarketConfig,
) -> Result<Arc<dyn MarketSnapshotProvider>, reqwest::Error> {
    let chart = ChartApiProvider::new(&config.base_url, &config.user_agent)?;
    let bounded = TimeoutProvider::new(chart, config.timeout());
    if config.cache_ttl_secs == 0 {
        return Ok(Arc::new(bounded));
    }
    Ok(Arc::new(CachedProvider::new(bounded, config.cache_ttl())))
}
