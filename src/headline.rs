//! Headline numbers for a period and their comparison with the previous one.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::combine::AggregatedSeries;
use crate::comparison::{metric_comparison, ComparisonPeriods, MetricComparison};
use crate::transform::affluence;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HeadlineMetrics {
    pub total_in: u64,
    pub total_out: u64,
    /// Entries per 100 passers-by over the whole period (entry rate).
    pub affluence: f64,
    pub returning_rate: Option<f64>,
    /// Mean of buckets that report a positive duration.
    pub visit_duration: Option<f64>,
    pub peak: Option<Peak>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    pub timestamp: DateTime<Utc>,
    pub count_in: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineComparison {
    pub periods: ComparisonPeriods,
    pub current: HeadlineMetrics,
    pub previous: HeadlineMetrics,
    pub count_in: MetricComparison,
    pub count_out: MetricComparison,
    pub affluence: MetricComparison,
    pub returning_rate: MetricComparison,
    pub visit_duration: MetricComparison,
}

pub fn summarize(series: &AggregatedSeries) -> HeadlineMetrics {
    let total_in: u64 = series.count_in.iter().sum();
    let total_out: u64 = series.count_out.iter().sum();
    let outside: f64 = series.outside_traffic.iter().sum();

    let durations: Vec<f64> = series
        .visit_duration
        .iter()
        .copied()
        .filter(|d| *d > 0.0)
        .collect();
    let visit_duration =
        (!durations.is_empty()).then(|| durations.iter().sum::<f64>() / durations.len() as f64);

    // first maximum wins on ties
    let peak = series
        .count_in
        .iter()
        .enumerate()
        .fold(None::<(usize, u64)>, |best, (i, &c)| match best {
            Some((_, b)) if b >= c => best,
            _ => Some((i, c)),
        })
        .map(|(i, c)| Peak {
            timestamp: series.timestamps[i],
            count_in: c,
        });

    HeadlineMetrics {
        total_in,
        total_out,
        affluence: affluence(total_in as f64, outside),
        returning_rate: series.weighted_returning(),
        visit_duration,
        peak,
    }
}

pub fn compare_headlines(
    periods: ComparisonPeriods,
    current: HeadlineMetrics,
    previous: HeadlineMetrics,
) -> HeadlineComparison {
    HeadlineComparison {
        periods,
        count_in: metric_comparison(current.total_in as f64, previous.total_in as f64),
        count_out: metric_comparison(current.total_out as f64, previous.total_out as f64),
        affluence: metric_comparison(current.affluence, previous.affluence),
        returning_rate: metric_comparison(
            current.returning_rate.unwrap_or(0.0),
            previous.returning_rate.unwrap_or(0.0),
        ),
        visit_duration: metric_comparison(
            current.visit_duration.unwrap_or(0.0),
            previous.visit_duration.unwrap_or(0.0),
        ),
        current,
        previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::{comparison_periods, Trend};
    use crate::model::TimeWindow;
    use chrono::TimeZone;

    fn series() -> AggregatedSeries {
        let ts: Vec<_> = (0..3)
            .map(|h| Utc.with_ymd_and_hms(2024, 8, 1, 9 + h, 0, 0).unwrap())
            .collect();
        AggregatedSeries {
            location_count: 1,
            labels: vec![String::new(); 3],
            timestamps: ts,
            count_in: vec![10, 40, 40],
            count_out: vec![5, 30, 50],
            returning_rate: vec![20.0, 10.0, 0.0],
            returning_valid: vec![true, true, false],
            returning_customers: vec![2.0, 4.0, 0.0],
            visit_duration: vec![0.0, 12.0, 18.0],
            outside_traffic: vec![100.0, 200.0, 100.0],
            affluence: vec![10.0, 20.0, 40.0],
        }
    }

    #[test]
    fn summarize_totals() {
        let h = summarize(&series());
        assert_eq!(h.total_in, 90);
        assert_eq!(h.total_out, 85);
        assert!((h.affluence - 22.5).abs() < 1e-9);
        assert_eq!(h.visit_duration, Some(15.0));
        // (20*10 + 10*40) / 50
        assert!((h.returning_rate.unwrap() - 12.0).abs() < 1e-9);
        let peak = h.peak.unwrap();
        assert_eq!(peak.count_in, 40);
        assert_eq!(peak.timestamp, Utc.with_ymd_and_hms(2024, 8, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn empty_series_summarizes_to_zero() {
        let h = summarize(&AggregatedSeries::default());
        assert_eq!(h, HeadlineMetrics::default());
    }

    #[test]
    fn comparison_against_empty_previous() {
        let start = Utc.with_ymd_and_hms(2024, 8, 8, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 8, 15, 0, 0, 0).unwrap();
        let periods = comparison_periods(TimeWindow::new(start, end));
        let c = compare_headlines(periods, summarize(&series()), HeadlineMetrics::default());
        assert_eq!(c.count_in.trend, Trend::Up);
        assert_eq!(c.count_in.delta_percentage, 100.0);
    }
}
