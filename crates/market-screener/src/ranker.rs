use analysis_core::StockMetrics;

/// Assign cross-sectional RS percentiles and sort the population.
///
/// For each window independently, stocks with a non-zero ratio are ranked
/// by ratio descending (stable, so input order breaks ties) and mapped to
/// `99 - round(rank * 98 / (total - 1))`, clamped to [1, 99]; a lone ranked
/// stock gets 99 and no-data stocks get 0. The returned population is
/// ordered by RS52W descending, then RS1M descending.
pub fn rank_all(mut stocks: Vec<StockMetrics>) -> Vec<StockMetrics> {
    rank_field(&mut stocks, |m| m.period_returns.p1, |m, p| m.rs_1m = p);
    rank_field(&mut stocks, |m| m.period_returns.p3, |m, p| m.rs_3m = p);
    rank_field(&mut stocks, |m| m.period_returns.p6, |m, p| m.rs_6m = p);
    rank_field(&mut stocks, |m| m.period_returns.p9, |m, p| m.rs_9m = p);
    rank_field(&mut stocks, |m| m.period_returns.p12, |m, p| m.rs_52w = p);

    stocks.sort_by(|a, b| b.rs_52w.cmp(&a.rs_52w).then(b.rs_1m.cmp(&a.rs_1m)));
    stocks
}

fn rank_field(
    stocks: &mut [StockMetrics],
    ratio_of: fn(&StockMetrics) -> f64,
    assign: fn(&mut StockMetrics, i64),
) {
    let mut ranked: Vec<(usize, f64)> = stocks
        .iter()
        .enumerate()
        .filter(|(_, m)| ratio_of(m) != 0.0)
        .map(|(i, m)| (i, ratio_of(m)))
        .collect();

    // Stable sort keeps input order on equal ratios.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let total = ranked.len();
    for (rank, (index, _)) in ranked.into_iter().enumerate() {
        let percentile = if total > 1 {
            let offset = (rank as f64 * 98.0 / (total - 1) as f64).round_ties_even() as i64;
            (99 - offset).clamp(1, 99)
        } else {
            99
        };
        assign(&mut stocks[index], percentile);
    }
    // Stocks with ratio 0.0 keep their initialized percentile of 0.
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Exchange, PeriodReturns};

    fn stock(symbol: &str, p1: f64, p12: f64) -> StockMetrics {
        StockMetrics {
            symbol: symbol.to_string(),
            exchange: Exchange::Hose,
            period_returns: PeriodReturns {
                p1,
                p3: 0.0,
                p6: 0.0,
                p9: 0.0,
                p12,
            },
            current_volume: 1000,
            volume_sma20: 900.0,
            rs_1m: 0,
            rs_3m: 0,
            rs_6m: 0,
            rs_9m: 0,
            rs_52w: 0,
        }
    }

    #[test]
    fn five_stock_percentiles_are_exact() {
        let stocks = vec![
            stock("AA", 1.0, 2.0),
            stock("BB", 1.0, 1.5),
            stock("CC", 1.0, 1.0),
            stock("DD", 1.0, 0.8),
            stock("EE", 1.0, 0.5),
        ];
        let ranked = rank_all(stocks);
        let rs: Vec<i64> = ranked.iter().map(|m| m.rs_52w).collect();
        assert_eq!(rs, vec![99, 75, 50, 25, 1]);
    }

    #[test]
    fn no_data_stocks_get_zero() {
        let stocks = vec![stock("AA", 1.2, 1.5), stock("BB", 1.1, 0.0)];
        let ranked = rank_all(stocks);
        let bb = ranked.iter().find(|m| m.symbol == "BB").unwrap();
        assert_eq!(bb.rs_52w, 0);
        assert!(bb.rs_1m >= 1);
    }

    #[test]
    fn single_ranked_stock_gets_99() {
        let ranked = rank_all(vec![stock("AA", 1.3, 1.3)]);
        assert_eq!(ranked[0].rs_52w, 99);
        assert_eq!(ranked[0].rs_1m, 99);
    }

    #[test]
    fn percentiles_are_monotone_in_ratio() {
        let stocks: Vec<StockMetrics> = (0..40)
            .map(|i| stock(&format!("S{i:02}"), 1.0, 0.5 + i as f64 * 0.05))
            .collect();
        let ranked = rank_all(stocks);
        for pair in ranked.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.period_returns.p12 >= b.period_returns.p12);
            assert!(a.rs_52w >= b.rs_52w);
        }
        for m in &ranked {
            assert!((1..=99).contains(&m.rs_52w));
        }
    }

    #[test]
    fn ties_break_by_input_order_and_stay_adjacent() {
        let stocks = vec![
            stock("AA", 1.0, 1.5),
            stock("BB", 1.0, 1.5),
            stock("CC", 1.0, 1.0),
        ];
        let ranked = rank_all(stocks);
        // Tied stocks keep their relative input order in the ranking.
        assert_eq!(ranked[0].symbol, "AA");
        assert_eq!(ranked[1].symbol, "BB");
        assert!(ranked[0].rs_52w >= ranked[1].rs_52w);
        assert!(ranked[0].rs_52w - ranked[1].rs_52w <= 49);
    }

    #[test]
    fn output_sorted_by_rs52w_then_rs1m() {
        let stocks = vec![
            stock("AA", 1.1, 0.0),
            stock("BB", 1.9, 0.0),
            stock("CC", 1.5, 2.5),
        ];
        let ranked = rank_all(stocks);
        assert_eq!(ranked[0].symbol, "CC");
        // AA and BB tie on RS52W (no data); BB's higher RS1M puts it first.
        assert_eq!(ranked[1].symbol, "BB");
        assert_eq!(ranked[2].symbol, "AA");
    }
}
