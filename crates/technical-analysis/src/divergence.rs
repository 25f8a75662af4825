use analysis_core::{AnalysisError, DivergenceConfig, DivergenceType, PivotKind, PriceDataWithRsi};

use crate::pivots::find_pivots;

/// Outcome of a divergence scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub found: bool,
    pub divergence_type: DivergenceType,
    pub description: String,
}

impl Detection {
    fn none() -> Self {
        Self {
            found: false,
            divergence_type: DivergenceType::None,
            description: String::new(),
        }
    }
}

/// Pivot-pair divergence detector.
///
/// A pure value built per request from a validated config, so every scan is
/// deterministic and test-isolated. One detector handles both polarities:
/// bearish scans pivot highs, bullish scans pivot lows.
#[derive(Debug, Clone)]
pub struct DivergenceDetector {
    config: DivergenceConfig,
}

impl DivergenceDetector {
    pub fn new(config: DivergenceConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DivergenceConfig {
        &self.config
    }

    /// Scan pivot pairs for a divergence of the given polarity. The scan
    /// walks pivots newest-first and returns on the first pair whose index
    /// distance lies in [range_min, range_max] and whose price/RSI extrema
    /// disagree.
    pub fn detect(&self, polarity: DivergenceType, data: &[PriceDataWithRsi]) -> Detection {
        let pivot_kind = match polarity {
            DivergenceType::Bearish => PivotKind::High,
            DivergenceType::Bullish => PivotKind::Low,
            DivergenceType::None => return Detection::none(),
        };

        let mut pivots = find_pivots(
            data,
            pivot_kind,
            self.config.lookback_left,
            self.config.lookback_right,
        );
        pivots.sort_by(|a, b| b.index.cmp(&a.index));

        for pair in pivots.windows(2) {
            let (current, previous) = (&pair[0], &pair[1]);
            let distance = current.index - previous.index;
            if distance < self.config.range_min || distance > self.config.range_max {
                continue;
            }

            let triggered = match polarity {
                DivergenceType::Bullish => {
                    current.price < previous.price && current.rsi > previous.rsi
                }
                DivergenceType::Bearish => {
                    current.price > previous.price && current.rsi < previous.rsi
                }
                DivergenceType::None => false,
            };

            if triggered {
                return Detection {
                    found: true,
                    divergence_type: polarity,
                    description: format!(
                        "{} divergence: Price {:.2} -> {:.2}, RSI {:.2} -> {:.2}, Date {} -> {}",
                        polarity.label(),
                        previous.price,
                        current.price,
                        previous.rsi,
                        current.rsi,
                        previous.date,
                        current.date,
                    ),
                };
            }
        }

        Detection::none()
    }

    /// Probe the series tail for a bearish divergence still forming: price
    /// above the most recent confirmed pivot high while RSI sits below it.
    /// Returns the early-signal description when the probe triggers.
    pub fn detect_forming_bearish(&self, data: &[PriceDataWithRsi]) -> Option<String> {
        let pivots = find_pivots(
            data,
            PivotKind::High,
            self.config.lookback_left,
            self.config.lookback_right,
        );
        let pivot = pivots.iter().max_by_key(|p| p.index)?;
        let current = data.iter().rev().find(|d| d.rsi != 0.0)?;

        if current.close > pivot.price && current.rsi < pivot.rsi {
            Some(format!(
                "Forming bearish divergence: Price {:.2} -> {:.2}, RSI {:.2} -> {:.2}, Date {} -> {}",
                pivot.price, current.close, pivot.rsi, current.rsi, pivot.date, current.date,
            ))
        } else {
            None
        }
    }
}
