use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{MarketDataError, MarketSnapshotProvider};
use crate::catalog::Etf;
use crate::core::{PricePoint, PriceSeries};

/// Client for a Yahoo-style `/v8/finance/chart/{ticker}` endpoint.
#[derive(Debug, Clone)]
pub struct ChartApiProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartApiProvider {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, etf: Etf) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1y&interval=1d",
            self.base_url,
            etf.ticker()
        )
    }
}

#[async_trait]
impl MarketSnapshotProvider for ChartApiProvider {
    async fn fetch_one_year_daily_closes(&self, etf: Etf) -> Result<PriceSeries, MarketDataError> {
        let url = self.chart_url(etf);
        debug!(%etf, %url, "fetching daily closes");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketDataError::unavailable(etf, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::unavailable(etf, e.to_string()))?;
        if !status.is_success() {
            warn!(%etf, %status, "chart request failed");
            return Err(MarketDataError::unavailable(
                etf,
                format!("chart endpoint returned {status}"),
            ));
        }

        let series = series_from_chart_json(etf, &body)?;
        debug!(%etf, closes = series.len(), "fetched daily closes");
        Ok(series)
    }
}

/// Parses a chart response body. Days with a missing close are skipped.
pub fn series_from_chart_json(etf: Etf, body: &str) -> Result<PriceSeries, MarketDataError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| MarketDataError::unavailable(etf, format!("invalid chart payload: {e}")))?;

    if let Some(err) = envelope.chart.error {
        return Err(MarketDataError::unavailable(
            etf,
            format!("{}: {}", err.code, err.description),
        ));
    }

    let result = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| MarketDataError::unavailable(etf, "chart payload has no result"))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();
    if closes.len() != result.timestamp.len() {
        return Err(MarketDataError::unavailable(
            etf,
            format!(
                "timestamp/close length mismatch: {} timestamps, {} closes",
                result.timestamp.len(),
                closes.len()
            ),
        ));
    }

    let mut points = Vec::with_capacity(result.timestamp.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(close) = close else {
            continue;
        };
        let Some(moment) = DateTime::from_timestamp(*ts, 0) else {
            return Err(MarketDataError::unavailable(
                etf,
                format!("invalid timestamp {ts}"),
            ));
        };
        points.push(PricePoint {
            date: moment.date_naive(),
            close,
        });
    }

    PriceSeries::new(points).map_err(|e| MarketDataError::unavailable(etf, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = r#"{
      "chart": {
        "result": [{
          "meta": {"symbol": "SPY", "currency": "USD"},
          "timestamp": [1704205800, 1704292200, 1704378600, 1704465000],
          "indicators": {
            "quote": [{
              "open": [472.1, 470.4, 469.0, 468.2],
              "close": [472.65, null, 467.92, 467.92]
            }]
          }
        }],
        "error": null
      }
    }"#;

    #[test]
    fn parses_closes_and_skips_missing_days() {
        let series = series_from_chart_json(Etf::Spy, SAMPLE).expect("valid payload");
        assert_eq!(series.len(), 3);
        assert_eq!(
            series.first().map(|p| p.date),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(series.last().map(|p| p.close), Some(467.92));
    }

    #[test]
    fn surfaces_api_error_as_unavailable() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = series_from_chart_json(Etf::Arkk, body).expect_err("api error");
        match err {
            MarketDataError::Unavailable { ticker, reason } => {
                assert_eq!(ticker, Etf::Arkk);
                assert!(reason.contains("delisted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage_payload() {
        let err = series_from_chart_json(Etf::Spy, "<html>busy</html>").expect_err("not json");
        assert!(err.to_string().contains("invalid chart payload"));
    }

    #[test]
    fn rejects_non_positive_close() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704205800],"indicators":{"quote":[{"close":[-1.0]}]}}],"error":null}}"#;
        assert!(series_from_chart_json(Etf::Spy, body).is_err());
    }

    #[test]
    fn rejects_mismatched_timestamp_and_close_arrays() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704205800,1704292200,1704378600],"indicators":{"quote":[{"close":[472.65,470.1]}]}}],"error":null}}"#;
        let err = series_from_chart_json(Etf::Qqq, body).expect_err("lengths differ");
        assert!(err.to_string().contains("length mismatch"));
    }

    #[tokio::test]
    async fn builds_chart_url_for_ticker() {
        let provider =
            ChartApiProvider::new("http://localhost:9/", "test-agent").expect("client builds");
        assert_eq!(
            provider.chart_url(Etf::Schd),
            "http://localhost:9/v8/finance/chart/SCHD?range=1y&interval=1d"
        );
    }
}
