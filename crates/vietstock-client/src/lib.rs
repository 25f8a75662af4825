mod rate_limit;
mod retry;

pub use rate_limit::TokenBucket;
pub use retry::{RetryPolicy, RetryTransport};

use std::time::Duration;

use analysis_core::{
    AnalysisError, Exchange, Interval, MarketDataGateway, MarketDataQuery, PriceBar, StockData,
    StockListing,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Rate-limited gateway to the Vietstock market-data API.
///
/// Every request first takes a token from the bucket, then goes through the
/// 429-retrying transport. Other gateway implementations conform to the
/// same [`MarketDataGateway`] contract.
pub struct VietstockClient {
    base_url: String,
    client: Client,
    transport: RetryTransport,
    limiter: TokenBucket,
}

impl VietstockClient {
    pub fn new(base_url: impl Into<String>, requests_per_minute: usize, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport: RetryTransport::new(client.clone(), RetryPolicy::default()),
            limiter: TokenBucket::new(requests_per_minute),
            client,
        }
    }

    /// Override the default 429 retry schedule.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport = RetryTransport::new(self.client.clone(), policy);
        self
    }

    async fn send(
        &self,
        ctx: &CancellationToken,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AnalysisError> {
        let request = builder
            .build()
            .map_err(|e| AnalysisError::Fetch(e.to_string()))?;

        self.limiter.acquire(ctx).await?;
        let response = self.transport.execute(ctx, request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Fetch(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn fetch_chart(
        &self,
        ctx: &CancellationToken,
        query: &MarketDataQuery,
    ) -> Result<StockData, AnalysisError> {
        let from = query.start_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        // The vendor's `to` bound is exclusive; push it one day past the end.
        let to = (query.end_date + chrono::Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let body = serde_json::json!({
            "timeFrame": vendor_timeframe(query.interval),
            "symbols": [query.symbol.as_str()],
            "from": from,
            "to": to,
        });

        let response = self
            .send(
                ctx,
                self.client
                    .post(format!("{}/chart/OHLCChart/gap", self.base_url))
                    .json(&body),
            )
            .await?;

        let entries: Vec<OhlcChartEntry> = response
            .json()
            .await
            .map_err(|e| AnalysisError::Fetch(e.to_string()))?;

        Ok(normalize_chart_response(query.symbol.as_str(), &entries))
    }

    async fn fetch_listings(
        &self,
        ctx: &CancellationToken,
        exchange: Exchange,
    ) -> Result<Vec<StockListing>, AnalysisError> {
        let response = self
            .send(
                ctx,
                self.client
                    .get(format!("{}/price/symbols/getByGroup", self.base_url))
                    .query(&[("group", exchange.as_str())]),
            )
            .await?;

        let entries: Vec<SymbolGroupEntry> = response
            .json()
            .await
            .map_err(|e| AnalysisError::Fetch(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|e| StockListing {
                symbol: e.symbol,
                exchange,
            })
            .collect())
    }
}

#[async_trait]
impl MarketDataGateway for VietstockClient {
    async fn fetch_stock_data(
        &self,
        ctx: &CancellationToken,
        query: &MarketDataQuery,
    ) -> Result<StockData, AnalysisError> {
        self.fetch_chart(ctx, query).await
    }

    async fn list_all_stocks(
        &self,
        ctx: &CancellationToken,
        exchange: Exchange,
    ) -> Result<Vec<StockListing>, AnalysisError> {
        self.fetch_listings(ctx, exchange).await
    }
}

fn vendor_timeframe(interval: Interval) -> &'static str {
    match interval {
        Interval::Min1 => "ONE_MINUTE",
        Interval::Min5 => "FIVE_MINUTES",
        Interval::Min15 => "FIFTEEN_MINUTES",
        Interval::Min30 => "THIRTY_MINUTES",
        Interval::Hour1 => "ONE_HOUR",
        Interval::Hour4 => "FOUR_HOURS",
        Interval::Day1 => "ONE_DAY",
        Interval::Week1 => "ONE_WEEK",
        Interval::Month1 => "ONE_MONTH",
    }
}

/// Flatten the vendor's column-array chart payload into validated bars.
/// Mismatched column lengths or a missing symbol yield an empty history,
/// never an error.
fn normalize_chart_response(symbol: &str, entries: &[OhlcChartEntry]) -> StockData {
    let entry = entries
        .iter()
        .find(|e| e.symbol.eq_ignore_ascii_case(symbol))
        .or_else(|| entries.first());

    let Some(entry) = entry else {
        return StockData {
            symbol: symbol.to_string(),
            price_history: Vec::new(),
        };
    };

    let n = entry.t.len();
    let columns = [
        entry.o.len(),
        entry.h.len(),
        entry.l.len(),
        entry.c.len(),
        entry.v.len(),
    ];
    if columns.iter().any(|&len| len != n) {
        tracing::warn!(
            symbol,
            "vendor chart columns have mismatched lengths, dropping history"
        );
        return StockData {
            symbol: symbol.to_string(),
            price_history: Vec::new(),
        };
    }

    let mut price_history = Vec::with_capacity(n);
    for i in 0..n {
        let Ok(epoch) = entry.t[i].parse::<i64>() else {
            tracing::warn!(symbol, raw = %entry.t[i], "unparseable vendor timestamp, skipping bar");
            continue;
        };
        let Some(timestamp) = DateTime::from_timestamp(epoch, 0) else {
            tracing::warn!(symbol, epoch, "vendor timestamp out of range, skipping bar");
            continue;
        };

        match PriceBar::new(
            timestamp.date_naive(),
            entry.o[i],
            entry.h[i],
            entry.l[i],
            entry.c[i],
            entry.v[i],
        ) {
            Ok(bar) => price_history.push(bar),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "invalid vendor bar, skipping");
            }
        }
    }

    StockData {
        symbol: symbol.to_string(),
        price_history,
    }
}

#[derive(Debug, Deserialize)]
struct OhlcChartEntry {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<i64>,
    #[serde(default)]
    t: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SymbolGroupEntry {
    symbol: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_timeframe_covers_every_interval() {
        assert_eq!(vendor_timeframe(Interval::Day1), "ONE_DAY");
        assert_eq!(vendor_timeframe(Interval::Min30), "THIRTY_MINUTES");
        assert_eq!(vendor_timeframe(Interval::Week1), "ONE_WEEK");
    }

    #[test]
    fn chart_response_normalizes_to_utc_dates() {
        let raw = r#"[{
            "symbol": "VNM",
            "o": [70.1, 70.9],
            "h": [71.0, 71.5],
            "l": [69.8, 70.2],
            "c": [70.8, 71.2],
            "v": [1200000, 1350000],
            "t": ["1699920000", "1700006400"]
        }]"#;
        let entries: Vec<OhlcChartEntry> = serde_json::from_str(raw).unwrap();
        let data = normalize_chart_response("VNM", &entries);

        assert_eq!(data.price_history.len(), 2);
        assert_eq!(data.price_history[0].date.to_string(), "2023-11-14");
        assert_eq!(data.price_history[1].date.to_string(), "2023-11-15");
        assert_eq!(data.price_history[0].close, 70.8);
        assert_eq!(data.price_history[1].volume, 1_350_000);
    }

    #[test]
    fn mismatched_columns_drop_the_whole_history() {
        let raw = r#"[{
            "symbol": "VNM",
            "o": [70.1],
            "h": [71.0, 71.5],
            "l": [69.8],
            "c": [70.8],
            "v": [1200000],
            "t": ["1699920000"]
        }]"#;
        let entries: Vec<OhlcChartEntry> = serde_json::from_str(raw).unwrap();
        let data = normalize_chart_response("VNM", &entries);
        assert!(data.price_history.is_empty());
    }

    #[test]
    fn empty_vendor_array_is_empty_history_not_an_error() {
        let data = normalize_chart_response("VNM", &[]);
        assert_eq!(data.symbol, "VNM");
        assert!(data.price_history.is_empty());
    }

    #[test]
    fn invalid_bars_are_skipped_individually() {
        // Second bar has high below low and must be dropped alone.
        let raw = r#"[{
            "symbol": "VNM",
            "o": [70.1, 70.9],
            "h": [71.0, 60.0],
            "l": [69.8, 70.2],
            "c": [70.8, 65.0],
            "v": [1200000, 1350000],
            "t": ["1699920000", "1700006400"]
        }]"#;
        let entries: Vec<OhlcChartEntry> = serde_json::from_str(raw).unwrap();
        let data = normalize_chart_response("VNM", &entries);
        assert_eq!(data.price_history.len(), 1);
        assert_eq!(data.price_history[0].date.to_string(), "2023-11-14");
    }

    #[test]
    fn unparseable_timestamps_are_skipped() {
        let raw = r#"[{
            "symbol": "VNM",
            "o": [70.1, 70.9],
            "h": [71.0, 71.5],
            "l": [69.8, 70.2],
            "c": [70.8, 71.2],
            "v": [1200000, 1350000],
            "t": ["not-a-number", "1700006400"]
        }]"#;
        let entries: Vec<OhlcChartEntry> = serde_json::from_str(raw).unwrap();
        let data = normalize_chart_response("VNM", &entries);
        assert_eq!(data.price_history.len(), 1);
        assert_eq!(data.price_history[0].date.to_string(), "2023-11-15");
    }
}
