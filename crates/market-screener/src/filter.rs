use analysis_core::{
    AnalysisError, Exchange, FilterCondition, ScreenerFilterRequest, StockMetrics,
    StockMetricsSnapshot,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Fields a screener condition may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterField {
    Rs1M,
    Rs3M,
    Rs6M,
    Rs9M,
    Rs52W,
    VolumeVsSma,
    CurrentVolume,
    VolumeSma20,
}

impl FilterField {
    fn parse(raw: &str) -> Result<Self, AnalysisError> {
        match raw {
            "rs_1m" => Ok(FilterField::Rs1M),
            "rs_3m" => Ok(FilterField::Rs3M),
            "rs_6m" => Ok(FilterField::Rs6M),
            "rs_9m" => Ok(FilterField::Rs9M),
            "rs_52w" => Ok(FilterField::Rs52W),
            "volume_vs_sma" => Ok(FilterField::VolumeVsSma),
            "current_volume" => Ok(FilterField::CurrentVolume),
            "volume_sma20" => Ok(FilterField::VolumeSma20),
            other => Err(AnalysisError::Validation(format!(
                "unknown filter field '{other}'"
            ))),
        }
    }

    fn value_of(&self, stock: &StockMetrics) -> f64 {
        match self {
            FilterField::Rs1M => stock.rs_1m as f64,
            FilterField::Rs3M => stock.rs_3m as f64,
            FilterField::Rs6M => stock.rs_6m as f64,
            FilterField::Rs9M => stock.rs_9m as f64,
            FilterField::Rs52W => stock.rs_52w as f64,
            FilterField::VolumeVsSma => volume_vs_sma(stock),
            FilterField::CurrentVolume => stock.current_volume as f64,
            FilterField::VolumeSma20 => stock.volume_sma20,
        }
    }
}

/// Percentage distance of the latest volume from its 20-day SMA.
pub fn volume_vs_sma(stock: &StockMetrics) -> f64 {
    if stock.volume_sma20 > 0.0 {
        100.0 * (stock.current_volume as f64 - stock.volume_sma20) / stock.volume_sma20
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Gte,
    Lte,
    Gt,
    Lt,
    Eq,
}

impl FilterOperator {
    fn parse(raw: &str) -> Result<Self, AnalysisError> {
        match raw {
            ">=" => Ok(FilterOperator::Gte),
            "<=" => Ok(FilterOperator::Lte),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            "=" => Ok(FilterOperator::Eq),
            other => Err(AnalysisError::Validation(format!(
                "unknown filter operator '{other}'"
            ))),
        }
    }

    fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            FilterOperator::Gte => left >= right,
            FilterOperator::Lte => left <= right,
            FilterOperator::Gt => left > right,
            FilterOperator::Lt => left < right,
            FilterOperator::Eq => left == right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterLogic {
    And,
    Or,
}

impl FilterLogic {
    fn parse(raw: &str) -> Result<Self, AnalysisError> {
        match raw.to_lowercase().as_str() {
            "and" => Ok(FilterLogic::And),
            "or" => Ok(FilterLogic::Or),
            other => Err(AnalysisError::Validation(format!(
                "filter logic must be 'and' or 'or', got '{other}'"
            ))),
        }
    }
}

struct CompiledCondition {
    field: FilterField,
    op: FilterOperator,
    value: f64,
}

impl CompiledCondition {
    fn compile(condition: &FilterCondition) -> Result<Self, AnalysisError> {
        Ok(Self {
            field: FilterField::parse(&condition.field)?,
            op: FilterOperator::parse(&condition.op)?,
            value: condition.value,
        })
    }

    fn matches(&self, stock: &StockMetrics) -> bool {
        self.op.holds(self.field.value_of(stock), self.value)
    }
}

/// What `POST /stocks/filter` returns.
#[derive(Debug, Clone, Serialize)]
pub struct FilterResponse {
    pub total_stocks_analyzed: usize,
    pub stocks_matching: usize,
    pub calculated_at: DateTime<Utc>,
    pub stocks: Vec<StockMetrics>,
}

/// Evaluate a compound predicate against one snapshot. The exchange
/// allow-list applies before the predicate logic; the result preserves the
/// snapshot's sort order.
pub fn evaluate_filter(
    snapshot: &StockMetricsSnapshot,
    request: &ScreenerFilterRequest,
) -> Result<FilterResponse, AnalysisError> {
    let logic = FilterLogic::parse(&request.logic)?;
    let conditions = request
        .filters
        .iter()
        .map(CompiledCondition::compile)
        .collect::<Result<Vec<_>, _>>()?;
    let exchanges = request
        .exchanges
        .as_ref()
        .map(|raw| raw.iter().map(|e| Exchange::parse(e)).collect::<Result<Vec<_>, _>>())
        .transpose()?;

    let stocks: Vec<StockMetrics> = snapshot
        .stocks
        .iter()
        .filter(|stock| {
            if let Some(ref allowed) = exchanges {
                if !allowed.contains(&stock.exchange) {
                    return false;
                }
            }
            match logic {
                FilterLogic::And => conditions.iter().all(|c| c.matches(stock)),
                FilterLogic::Or => {
                    conditions.is_empty() || conditions.iter().any(|c| c.matches(stock))
                }
            }
        })
        .cloned()
        .collect();

    Ok(FilterResponse {
        total_stocks_analyzed: snapshot.stocks.len(),
        stocks_matching: stocks.len(),
        calculated_at: snapshot.calculated_at,
        stocks,
    })
}
