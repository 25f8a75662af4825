use analysis_core::{Pivot, PivotKind, PriceDataWithRsi};

/// Find confirmed RSI pivots of the given kind.
///
/// A bar is a pivot high when every bar in the `left` window before it and
/// every bar in the (possibly edge-truncated) `right` window after it has a
/// strictly lower RSI; pivot lows are symmetric. Equal neighbors disqualify
/// the candidate. The left window must be complete; the right window may be
/// cut short at the end of the series.
pub fn find_pivots(
    data: &[PriceDataWithRsi],
    kind: PivotKind,
    left: usize,
    right: usize,
) -> Vec<Pivot> {
    let n = data.len();
    if n < left + right + 1 {
        return vec![];
    }

    let mut pivots = Vec::new();
    for i in left..n {
        let candidate = data[i].rsi;

        let left_ok = data[i - left..i].iter().all(|d| beats(kind, candidate, d.rsi));
        if !left_ok {
            continue;
        }

        let right_end = (i + right).min(n - 1);
        let right_ok = data[i + 1..=right_end]
            .iter()
            .all(|d| beats(kind, candidate, d.rsi));
        if !right_ok {
            continue;
        }

        pivots.push(Pivot {
            index: data[i].index,
            date: data[i].date,
            price: data[i].close,
            rsi: candidate,
            kind,
        });
    }

    pivots
}

#[inline]
fn beats(kind: PivotKind, candidate: f64, neighbor: f64) -> bool {
    match kind {
        PivotKind::High => neighbor < candidate,
        PivotKind::Low => neighbor > candidate,
    }
}
