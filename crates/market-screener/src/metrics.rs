use analysis_core::{Exchange, PeriodReturns, PriceBar, StockMetrics};

/// Trading-day lengths of the five ranking windows.
pub const TRADING_DAYS_1M: usize = 21;
pub const TRADING_DAYS_3M: usize = 63;
pub const TRADING_DAYS_6M: usize = 126;
pub const TRADING_DAYS_9M: usize = 189;
pub const TRADING_DAYS_12M: usize = 252;

pub const VOLUME_SMA_PERIOD: usize = 20;

/// A stock with fewer bars than this is skipped entirely.
pub const MIN_DATA_POINTS: usize = 21;

/// Per-stock screener metrics from an oldest-to-newest daily series.
///
/// Returns None when the series is too short to rank at all. A window's
/// ratio is 0.0 when the series does not cover it; the ranker later maps
/// that to percentile 0.
pub fn compute_stock_metrics(
    symbol: &str,
    exchange: Exchange,
    bars: &[PriceBar],
) -> Option<StockMetrics> {
    let n = bars.len();
    if n < MIN_DATA_POINTS {
        return None;
    }

    let latest_close = bars[n - 1].close;
    let ratio = |window: usize| -> f64 {
        if n < window {
            return 0.0;
        }
        let base = bars[n - window].close;
        if base <= 0.0 {
            return 0.0;
        }
        round4(latest_close / base)
    };

    let period_returns = PeriodReturns {
        p1: ratio(TRADING_DAYS_1M),
        p3: ratio(TRADING_DAYS_3M),
        p6: ratio(TRADING_DAYS_6M),
        p9: ratio(TRADING_DAYS_9M),
        p12: ratio(TRADING_DAYS_12M),
    };

    // Mean volume of the 20 bars strictly preceding the latest one; short
    // series fall back to everything available.
    let volume_sma20 = if n > VOLUME_SMA_PERIOD {
        mean_volume(&bars[n - 1 - VOLUME_SMA_PERIOD..n - 1])
    } else {
        mean_volume(bars)
    };

    Some(StockMetrics {
        symbol: symbol.to_string(),
        exchange,
        period_returns,
        current_volume: bars[n - 1].volume,
        volume_sma20,
        rs_1m: 0,
        rs_3m: 0,
        rs_6m: 0,
        rs_9m: 0,
        rs_52w: 0,
    })
}

fn mean_volume(bars: &[PriceBar]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    bars.iter().map(|b| b.volume as f64).sum::<f64>() / bars.len() as f64
}

#[inline]
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars(closes: &[f64], volume: i64) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                PriceBar::new(
                    start + chrono::Duration::days(i as i64),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    volume,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn short_series_is_skipped() {
        let series = bars(&vec![10.0; 20], 1000);
        assert!(compute_stock_metrics("VNM", Exchange::Hose, &series).is_none());
    }

    #[test]
    fn one_month_ratio_uses_window_endpoints() {
        let mut closes = vec![10.0; 21];
        closes[20] = 12.5;
        let series = bars(&closes, 1000);
        let metrics = compute_stock_metrics("VNM", Exchange::Hose, &series).unwrap();
        // close[n-1] / close[n-21] = 12.5 / 10.0
        assert_eq!(metrics.period_returns.p1, 1.25);
        // Longer windows lack data.
        assert_eq!(metrics.period_returns.p3, 0.0);
        assert_eq!(metrics.period_returns.p12, 0.0);
    }

    #[test]
    fn ratios_round_to_four_decimals() {
        let mut closes = vec![3.0; 21];
        closes[20] = 1.0;
        let series = bars(&closes, 1000);
        let metrics = compute_stock_metrics("VNM", Exchange::Hose, &series).unwrap();
        assert_eq!(metrics.period_returns.p1, 0.3333);
    }

    #[test]
    fn volume_sma_excludes_latest_bar() {
        let mut series = bars(&vec![10.0; 25], 1_000);
        // A volume spike on the latest bar must not drag the SMA.
        series.last_mut().unwrap().volume = 9_000_000;
        let metrics = compute_stock_metrics("VNM", Exchange::Hose, &series).unwrap();
        assert_eq!(metrics.current_volume, 9_000_000);
        assert_eq!(metrics.volume_sma20, 1_000.0);
    }

    #[test]
    fn full_year_series_fills_all_windows() {
        let closes: Vec<f64> = (0..252).map(|i| 10.0 + i as f64 * 0.01).collect();
        let series = bars(&closes, 1000);
        let metrics = compute_stock_metrics("VNM", Exchange::Hose, &series).unwrap();
        assert!(metrics.period_returns.p1 > 0.0);
        assert!(metrics.period_returns.p3 > 0.0);
        assert!(metrics.period_returns.p6 > 0.0);
        assert!(metrics.period_returns.p9 > 0.0);
        assert!(metrics.period_returns.p12 > 0.0);
        // A monotone uptrend ranks longer windows above shorter ones.
        assert!(metrics.period_returns.p12 > metrics.period_returns.p1);
    }
}
