//! Sparse weekly series
//!
//! Two partitions keyed by ISO week: "actual" (booked utilization of past
//! weeks) and "forecast" (planned utilization of coming weeks). Missing
//! points stay missing; they are never read as zero.

use serde::{Deserialize, Serialize};
use staffsync_common::time::WeekKey;
use std::collections::BTreeMap;

/// One point of a series on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub iso_year: i32,
    pub iso_week: u32,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SeriesDoc {
    #[serde(default)]
    actual: Vec<SeriesPoint>,
    #[serde(default)]
    forecast: Vec<SeriesPoint>,
}

/// Mean of the available points in a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: Option<f64>,
    /// Points that contributed to the mean
    pub count: usize,
}

/// Actual and forecast partitions of one entity's weekly series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SeriesDoc", into = "SeriesDoc")]
pub struct WeeklySeries {
    actual: BTreeMap<WeekKey, f64>,
    forecast: BTreeMap<WeekKey, f64>,
}

impl WeeklySeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actual(mut self, week: WeekKey, value: f64) -> Self {
        self.insert_actual(week, value);
        self
    }

    pub fn with_forecast(mut self, week: WeekKey, value: f64) -> Self {
        self.insert_forecast(week, value);
        self
    }

    /// Record an actual point; non-finite values count as missing
    pub fn insert_actual(&mut self, week: WeekKey, value: f64) {
        insert_point(&mut self.actual, week, value);
    }

    /// Record a forecast point; non-finite values count as missing
    pub fn insert_forecast(&mut self, week: WeekKey, value: f64) {
        insert_point(&mut self.forecast, week, value);
    }

    pub fn actual(&self, week: WeekKey) -> Option<f64> {
        self.actual.get(&week).copied()
    }

    pub fn forecast(&self, week: WeekKey) -> Option<f64> {
        self.forecast.get(&week).copied()
    }

    /// Stats of the actual partition over `weeks`
    pub fn actual_stats(&self, weeks: &[WeekKey]) -> WindowStats {
        window_stats(&self.actual, weeks)
    }

    /// Stats of the forecast partition over `weeks`
    pub fn forecast_stats(&self, weeks: &[WeekKey]) -> WindowStats {
        window_stats(&self.forecast, weeks)
    }
}

fn insert_point(partition: &mut BTreeMap<WeekKey, f64>, week: WeekKey, value: f64) {
    if value.is_finite() {
        partition.insert(week, value);
    } else {
        partition.remove(&week);
    }
}

fn window_stats(partition: &BTreeMap<WeekKey, f64>, weeks: &[WeekKey]) -> WindowStats {
    let values: Vec<f64> = weeks.iter().filter_map(|w| partition.get(w).copied()).collect();
    let count = values.len();
    let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
    WindowStats { mean, count }
}

impl From<SeriesDoc> for WeeklySeries {
    fn from(doc: SeriesDoc) -> Self {
        let mut series = WeeklySeries::new();
        for p in doc.actual {
            if let Some(week) = WeekKey::new(p.iso_year, p.iso_week) {
                series.insert_actual(week, p.value);
            }
        }
        for p in doc.forecast {
            if let Some(week) = WeekKey::new(p.iso_year, p.iso_week) {
                series.insert_forecast(week, p.value);
            }
        }
        series
    }
}

impl From<WeeklySeries> for SeriesDoc {
    fn from(series: WeeklySeries) -> Self {
        let points = |m: BTreeMap<WeekKey, f64>| {
            m.into_iter()
                .map(|(w, value)| SeriesPoint {
                    iso_year: w.iso_year,
                    iso_week: w.iso_week,
                    value,
                })
                .collect()
        };
        SeriesDoc {
            actual: points(series.actual),
            forecast: points(series.forecast),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wk(y: i32, w: u32) -> WeekKey {
        WeekKey::new(y, w).unwrap()
    }

    #[test]
    fn test_missing_points_are_excluded_from_mean() {
        let series = WeeklySeries::new()
            .with_forecast(wk(2026, 10), 20.0)
            .with_forecast(wk(2026, 12), 10.0);
        let window = wk(2026, 9).leading(8);

        let stats = series.forecast_stats(&window);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(15.0));
    }

    #[test]
    fn test_empty_window_has_no_mean() {
        let series = WeeklySeries::new().with_actual(wk(2026, 1), 90.0);
        let stats = series.forecast_stats(&wk(2026, 1).leading(8));
        assert_eq!(stats, WindowStats { mean: None, count: 0 });
    }

    #[test]
    fn test_points_outside_window_ignored() {
        let series = WeeklySeries::new()
            .with_actual(wk(2026, 5), 100.0)
            .with_actual(wk(2026, 8), 60.0);
        let stats = series.actual_stats(&wk(2026, 9).trailing(4));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, Some(60.0));
    }

    #[test]
    fn test_non_finite_value_counts_as_missing() {
        let mut series = WeeklySeries::new().with_forecast(wk(2026, 3), 10.0);
        series.insert_forecast(wk(2026, 3), f64::NAN);
        assert_eq!(series.forecast(wk(2026, 3)), None);
    }

    #[test]
    fn test_deserialize_from_point_lists() {
        let json = r#"{
            "actual": [{"isoYear": 2026, "isoWeek": 4, "value": 80}],
            "forecast": [{"isoYear": 2026, "isoWeek": 6, "value": 20.5}]
        }"#;
        let series: WeeklySeries = serde_json::from_str(json).unwrap();
        assert_eq!(series.actual(wk(2026, 4)), Some(80.0));
        assert_eq!(series.forecast(wk(2026, 6)), Some(20.5));
    }
}
