use analysis_core::{PriceBar, PriceDataWithRsi};

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Wilder-smoothed RSI over a bar series.
///
/// The output has the same length as the input; entries before index
/// `period` carry RSI 0.0 (undefined zone). Returns an empty vec when the
/// series is shorter than `period + 1` bars.
pub fn rsi_series(bars: &[PriceBar], period: usize) -> Vec<PriceDataWithRsi> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(bars.len() - 1);
    let mut losses = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let change = bars[i].close - bars[i - 1].close;
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let rsi = if i < period {
            0.0
        } else {
            if i > period {
                // Wilder smoothing; deltas are offset one from bar indices.
                avg_gain = (avg_gain * (period - 1) as f64 + gains[i - 1]) / period as f64;
                avg_loss = (avg_loss * (period - 1) as f64 + losses[i - 1]) / period as f64;
            }
            let value = if avg_loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            };
            finite_or(value, 50.0)
        };

        result.push(PriceDataWithRsi {
            index: i,
            date: bar.date,
            close: bar.close,
            rsi,
        });
    }

    result
}
